//! Graph view synchronization
//!
//! Re-derives a user's slice of the graph view from the store of record and
//! upserts it in one batch. Append-only: concepts a user no longer collects
//! are left in place.

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info};

use super::store::{ConceptNode, GraphStore, ProjectionBatch, RelationEdge};
use crate::error::{Error, Result};
use crate::ledger::queries::{collected_concepts, induced_relations};

/// What one sync pushed into the graph view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub user_id: i64,
    pub concepts: usize,
    pub relations: usize,
}

#[derive(Clone)]
pub struct GraphSynchronizer {
    pool: SqlitePool,
    graph: Arc<dyn GraphStore>,
}

impl GraphSynchronizer {
    pub fn new(pool: SqlitePool, graph: Arc<dyn GraphStore>) -> Self {
        Self { pool, graph }
    }

    /// Build the projection batch for a user without applying it
    pub async fn projection_for(&self, user_id: i64) -> Result<ProjectionBatch> {
        let concepts = collected_concepts(&self.pool, user_id).await?;
        let relations = induced_relations(&self.pool, user_id).await?;

        Ok(ProjectionBatch::for_user(
            user_id,
            concepts.iter().map(ConceptNode::from).collect(),
            relations.iter().map(RelationEdge::from).collect(),
        ))
    }

    /// Upsert the user's collected concepts and the relations between them.
    ///
    /// Safe to repeat. Graph-store failures surface as
    /// [`Error::ViewSyncFailed`] so the job queue can retry them.
    pub async fn sync_user(&self, user_id: i64) -> Result<SyncReport> {
        let batch = self.projection_for(user_id).await?;

        let report = SyncReport {
            user_id,
            concepts: batch.concepts.len(),
            relations: batch.relations.len(),
        };

        if batch.concepts.is_empty() {
            info!(user_id, "User has no collections; nothing to sync");
            return Ok(report);
        }

        self.graph.apply(&batch).await.map_err(|e| {
            error!(user_id, backend = self.graph.backend_name(), error = %e, "Graph view sync failed");
            Error::ViewSyncFailed(format!("user {}: {}", user_id, e))
        })?;

        info!(
            user_id,
            concepts = report.concepts,
            relations = report.relations,
            "Graph view synced"
        );
        Ok(report)
    }
}
