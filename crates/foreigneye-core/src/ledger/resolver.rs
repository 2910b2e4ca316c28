//! Concept resolution
//!
//! Maps a candidate name to a durable concept id. Uniqueness lives in the
//! `concepts.name_key` unique index: creation is an
//! `INSERT .. ON CONFLICT DO NOTHING` followed by a re-read, so two writers
//! racing on "GPU" and "gpu" both end up with the row that won.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::domain::{PLACEHOLDER_DESCRIPTION, concept_key};
use crate::error::{Error, Result};
use crate::graph::{ConceptNode, GraphStore, ProjectionBatch, mirror};

/// Outcome of resolving one name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConcept {
    pub id: i64,
    /// Stored spelling, which may differ in case from the requested one
    pub name: String,
    /// True when this call inserted the row
    pub created: bool,
}

impl ResolvedConcept {
    /// Graph node for a freshly created concept
    pub fn placeholder_node(&self) -> ConceptNode {
        ConceptNode {
            id: self.id,
            name: self.name.clone(),
            description: PLACEHOLDER_DESCRIPTION.to_string(),
            examples: Vec::new(),
        }
    }
}

/// Resolve a name on an open connection or transaction.
///
/// Does not touch the graph view; callers mirror created concepts once
/// their transaction commits.
pub async fn resolve_concept(conn: &mut SqliteConnection, name: &str) -> Result<ResolvedConcept> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Concept name must not be empty".to_string(),
        ));
    }
    let key = concept_key(name);

    let inserted: Option<(i64,)> = sqlx::query_as(
        "INSERT INTO concepts (name, name_key, description_ko, real_world_examples_ko, created_at)
         VALUES (?, ?, ?, '[]', ?)
         ON CONFLICT(name_key) DO NOTHING
         RETURNING id",
    )
    .bind(name)
    .bind(&key)
    .bind(PLACEHOLDER_DESCRIPTION)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((id,)) = inserted {
        info!(concept_id = id, concept = %name, "Created concept");
        return Ok(ResolvedConcept {
            id,
            name: name.to_string(),
            created: true,
        });
    }

    let (id, stored_name): (i64, String) =
        sqlx::query_as("SELECT id, name FROM concepts WHERE name_key = ?")
            .bind(&key)
            .fetch_one(&mut *conn)
            .await?;

    debug!(concept_id = id, concept = %stored_name, "Reused existing concept");
    Ok(ResolvedConcept {
        id,
        name: stored_name,
        created: false,
    })
}

/// Standalone resolver that mirrors new concepts into the graph view
#[derive(Clone)]
pub struct ConceptResolver {
    pool: SqlitePool,
    graph: Arc<dyn GraphStore>,
}

impl ConceptResolver {
    pub fn new(pool: SqlitePool, graph: Arc<dyn GraphStore>) -> Self {
        Self { pool, graph }
    }

    /// Resolve `name` in its own autocommit statement pair.
    ///
    /// A failed graph mirror is logged and does not fail the call.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedConcept> {
        let mut conn = self.pool.acquire().await?;
        let resolved = resolve_concept(&mut conn, name).await?;
        drop(conn);

        if resolved.created {
            mirror(
                self.graph.as_ref(),
                &ProjectionBatch::concepts(vec![resolved.placeholder_node()]),
            )
            .await;
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraphStore;
    use crate::storage::Database;

    async fn setup() -> (Database, Arc<InMemoryGraphStore>, ConceptResolver) {
        let db = Database::in_memory().await.expect("Failed to create database");
        let graph = Arc::new(InMemoryGraphStore::new());
        let resolver = ConceptResolver::new(db.pool().clone(), graph.clone());
        (db, graph, resolver)
    }

    #[tokio::test]
    async fn test_resolve_creates_then_reuses() {
        let (_db, _graph, resolver) = setup().await;

        let first = resolver.resolve("GPU").await.unwrap();
        assert!(first.created);

        let second = resolver.resolve("GPU").await.unwrap();
        assert!(!second.created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_resolve_is_case_insensitive() {
        let (db, _graph, resolver) = setup().await;

        let upper = resolver.resolve("GPU").await.unwrap();
        let lower = resolver.resolve("  gpu ").await.unwrap();

        assert_eq!(upper.id, lower.id);
        assert_eq!(lower.name, "GPU");

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM concepts")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_resolve_rejects_blank_names() {
        let (_db, _graph, resolver) = setup().await;

        let err = resolver.resolve("   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_new_concept_gets_placeholder_and_is_mirrored() {
        let (db, graph, resolver) = setup().await;

        let resolved = resolver.resolve("CUDA").await.unwrap();

        let (description, examples): (String, String) = sqlx::query_as(
            "SELECT description_ko, real_world_examples_ko FROM concepts WHERE id = ?",
        )
        .bind(resolved.id)
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(description, PLACEHOLDER_DESCRIPTION);
        assert_eq!(examples, "[]");

        let node = graph.concept(resolved.id).await.unwrap();
        assert_eq!(node.name, "CUDA");
    }

    #[tokio::test]
    async fn test_graph_failure_does_not_fail_resolution() {
        let (_db, graph, resolver) = setup().await;
        graph.set_failing(true);

        let resolved = resolver.resolve("TPU").await.unwrap();
        assert!(resolved.created);
        assert!(graph.concepts().await.is_empty());
    }
}
