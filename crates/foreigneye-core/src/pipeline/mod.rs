//! Ingestion pipeline
//!
//! Sources deliver raw articles, the analyzer turns them into concepts and
//! relations, and the ledger writer persists the result.

mod analyzer;
mod ingest;
mod source;

pub use analyzer::{AnalyzerSettings, ConceptAnalyzer, LlmConceptAnalyzer};
pub use ingest::{IngestionPipeline, IngestionReport, RelationPassReport};
pub use source::{ArticleSource, GNewsSource, SourceArticle, StaticSource};
