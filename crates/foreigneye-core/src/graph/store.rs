//! Graph store trait and projection payloads
//!
//! The graph view holds no state of its own. Every write is a batch of
//! merge-by-key upserts derived from store-of-record rows, so applying the
//! same batch twice leaves the view unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Concept, ConceptRelation, RelationType};
use crate::error::Result;

/// A concept node keyed by its store-of-record id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub examples: Vec<String>,
}

impl From<&Concept> for ConceptNode {
    fn from(concept: &Concept) -> Self {
        Self {
            id: concept.id,
            name: concept.name.clone(),
            description: concept.description_ko.clone(),
            examples: concept.real_world_examples_ko.clone(),
        }
    }
}

/// A directed edge keyed by its `(from_id, to_id)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub from_id: i64,
    pub to_id: i64,
    pub relation_type: RelationType,
    pub strength: i64,
}

impl From<&ConceptRelation> for RelationEdge {
    fn from(relation: &ConceptRelation) -> Self {
        Self {
            from_id: relation.from_concept_id,
            to_id: relation.to_concept_id,
            relation_type: relation.relation_type,
            strength: relation.strength,
        }
    }
}

/// One transactional unit of graph upserts
///
/// When `user_id` is set, every concept in the batch is also linked to the
/// user with a `COLLECTED` edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionBatch {
    pub user_id: Option<i64>,
    pub concepts: Vec<ConceptNode>,
    pub relations: Vec<RelationEdge>,
}

impl ProjectionBatch {
    pub fn concepts(concepts: Vec<ConceptNode>) -> Self {
        Self {
            concepts,
            ..Default::default()
        }
    }

    pub fn relation(edge: RelationEdge) -> Self {
        Self {
            relations: vec![edge],
            ..Default::default()
        }
    }

    pub fn for_user(user_id: i64, concepts: Vec<ConceptNode>, relations: Vec<RelationEdge>) -> Self {
        Self {
            user_id: Some(user_id),
            concepts,
            relations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.concepts.is_empty() && self.relations.is_empty()
    }
}

/// Write side of the derived graph view
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Apply the batch atomically. Must be idempotent.
    async fn apply(&self, batch: &ProjectionBatch) -> Result<()>;

    async fn health_check(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

/// Graph store used when the graph view is switched off
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGraphStore;

#[async_trait]
impl GraphStore for DisabledGraphStore {
    async fn apply(&self, _batch: &ProjectionBatch) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }
}
