//! Domain model
//!
//! - **entity**: rows of the store of record (articles, concepts, relations, collections)
//! - **relationship**: the relation type set and candidate relation validation
//! - **extraction**: parsing of model output into article analyses and relations

pub mod entity;
pub mod extraction;
pub mod relationship;

pub use entity::{
    Article, ArticleMeta, Collection, Concept, ConceptRelation, DEFAULT_STRENGTH,
    PLACEHOLDER_DESCRIPTION, User, concept_key,
};
pub use extraction::{ArticleAnalysis, clean_concept_names, parse_json_object, relations_from_response};
pub use relationship::{CandidateRelation, RelationType, validate_relations};
