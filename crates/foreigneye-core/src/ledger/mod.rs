//! Store-of-record writes and shared reads
//!
//! - `resolver`: name → concept id, race-safe under concurrent writers
//! - `writer`: article/link transactions and relation loading
//! - `queries`: lookups reused by the graph synchronizer and read paths

pub mod queries;
pub mod resolver;
pub mod writer;

pub use resolver::{ConceptResolver, ResolvedConcept, resolve_concept};
pub use writer::{LedgerWriter, LoadOutcome, RelationLoadReport};
