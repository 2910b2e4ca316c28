//! Derived graph view
//!
//! The relational store is the only origin of truth. This module projects it
//! into a traversal-friendly graph through idempotent merge-by-key batches:
//!
//! - `store`: the [`GraphStore`] trait and batch payloads
//! - `neo4j`: Neo4j implementation over `neo4rs`
//! - `memory`: in-process implementation
//! - `sync`: per-user re-derivation of the view

mod memory;
mod neo4j;
mod store;
pub mod sync;

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{GraphBackend, GraphConfig};
use crate::error::{Error, Result};

pub use memory::InMemoryGraphStore;
pub use neo4j::Neo4jGraphStore;
pub use store::{ConceptNode, DisabledGraphStore, GraphStore, ProjectionBatch, RelationEdge};
pub use sync::{GraphSynchronizer, SyncReport};

/// Open the configured graph store.
///
/// Called once at startup; the handle is then passed to every component
/// that writes the view.
pub async fn connect(config: &GraphConfig) -> Result<Arc<dyn GraphStore>> {
    match config.backend {
        GraphBackend::Neo4j => {
            let password = config
                .resolved_password()
                .map_err(|e| Error::ConfigError(e.to_string()))?
                .ok_or_else(|| {
                    Error::ConfigError("NEO4J_PASSWORD is not set".to_string())
                })?;
            let store = Neo4jGraphStore::connect(config, &password).await?;
            Ok(Arc::new(store))
        }
        GraphBackend::Memory => {
            info!("Using in-memory graph store");
            Ok(Arc::new(InMemoryGraphStore::new()))
        }
        GraphBackend::Disabled => Ok(Arc::new(DisabledGraphStore)),
    }
}

/// Best-effort write used right after a store-of-record commit.
///
/// Failures are logged and reported as `false`; they never propagate.
pub async fn mirror(graph: &dyn GraphStore, batch: &ProjectionBatch) -> bool {
    match graph.apply(batch).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                backend = graph.backend_name(),
                concepts = batch.concepts.len(),
                relations = batch.relations.len(),
                error = %e,
                "Graph mirror failed; store of record unaffected"
            );
            false
        }
    }
}
