//! ForeignEye Core Library
//!
//! This crate provides the core functionality for ForeignEye, including:
//! - Storage (SQLite store of record with versioned migrations)
//! - LLM integration (OpenRouter API) and concept extraction
//! - Ledger writes (articles, concept resolution, relations)
//! - Graph view projection (Neo4j or in-memory)
//! - Read paths (knowledge map, search, relative concepts, collections)
//! - Durable background jobs and the ingestion pipeline

pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod ledger;
pub mod llm;
pub mod pipeline;
pub mod query;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::graph::{GraphStore, GraphSynchronizer};
    pub use crate::jobs::{JobQueue, Task, WorkerPool};
    pub use crate::ledger::LedgerWriter;
    pub use crate::storage::Database;
}
