//! Neo4j-backed graph view
//!
//! All Cypher is static text with `$` parameters. Relation types travel as a
//! property on a single `RELATED` edge label, never as an interpolated label.

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, query};
use tracing::{debug, info};

use super::store::{ConceptNode, GraphStore, ProjectionBatch, RelationEdge};
use crate::config::GraphConfig;
use crate::error::{Error, Result};

const CONCEPT_ID_CONSTRAINT: &str =
    "CREATE CONSTRAINT concept_id_unique IF NOT EXISTS FOR (c:Concept) REQUIRE c.concept_id IS UNIQUE";

const MERGE_CONCEPT: &str = "MERGE (c:Concept {concept_id: $id})
     SET c.name = $name,
         c.description_ko = $description,
         c.real_world_examples_ko = $examples";

const MERGE_COLLECTED: &str = "MERGE (u:User {user_id: $user_id})
     WITH u
     MATCH (c:Concept {concept_id: $concept_id})
     MERGE (u)-[:COLLECTED]->(c)";

const MERGE_RELATION: &str = "MERGE (a:Concept {concept_id: $from_id})
     MERGE (b:Concept {concept_id: $to_id})
     MERGE (a)-[r:RELATED]->(b)
     SET r.relation_type = $relation_type,
         r.strength = $strength";

fn graph_err(e: neo4rs::Error) -> Error {
    Error::GraphStoreError(e.to_string())
}

/// Graph store backed by a Neo4j connection pool
///
/// Constructed once at startup and shared behind `Arc<dyn GraphStore>`.
pub struct Neo4jGraphStore {
    graph: Graph,
    uri: String,
}

impl std::fmt::Debug for Neo4jGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jGraphStore")
            .field("uri", &self.uri)
            .finish()
    }
}

impl Neo4jGraphStore {
    /// Connect and make sure the `concept_id` uniqueness constraint exists.
    pub async fn connect(config: &GraphConfig, password: &str) -> Result<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .build()
            .map_err(graph_err)?;

        let graph = Graph::connect(neo4j_config).await.map_err(graph_err)?;
        graph
            .run(query(CONCEPT_ID_CONSTRAINT))
            .await
            .map_err(graph_err)?;

        info!(uri = %config.uri, database = %config.database, "Connected to Neo4j graph store");

        Ok(Self {
            graph,
            uri: config.uri.clone(),
        })
    }
}

fn concept_query(node: &ConceptNode) -> neo4rs::Query {
    query(MERGE_CONCEPT)
        .param("id", node.id)
        .param("name", node.name.as_str())
        .param("description", node.description.as_str())
        .param("examples", node.examples.clone())
}

fn collected_query(user_id: i64, concept_id: i64) -> neo4rs::Query {
    query(MERGE_COLLECTED)
        .param("user_id", user_id)
        .param("concept_id", concept_id)
}

fn relation_query(edge: &RelationEdge) -> neo4rs::Query {
    query(MERGE_RELATION)
        .param("from_id", edge.from_id)
        .param("to_id", edge.to_id)
        .param("relation_type", edge.relation_type.as_str())
        .param("strength", edge.strength)
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn apply(&self, batch: &ProjectionBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut txn = self.graph.start_txn().await.map_err(graph_err)?;

        for node in &batch.concepts {
            txn.run(concept_query(node)).await.map_err(graph_err)?;
            if let Some(user_id) = batch.user_id {
                txn.run(collected_query(user_id, node.id))
                    .await
                    .map_err(graph_err)?;
            }
        }

        for edge in &batch.relations {
            txn.run(relation_query(edge)).await.map_err(graph_err)?;
        }

        txn.commit().await.map_err(graph_err)?;

        debug!(
            concepts = batch.concepts.len(),
            relations = batch.relations.len(),
            user_id = ?batch.user_id,
            "Applied graph projection batch"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.graph.run(query("RETURN 1")).await.map_err(graph_err)
    }

    fn backend_name(&self) -> &'static str {
        "neo4j"
    }
}
