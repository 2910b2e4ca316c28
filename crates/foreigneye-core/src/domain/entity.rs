//! Store-of-record entities
//!
//! Rows are read through small `*Row` structs and converted with
//! `into_entity`, keeping JSON and enum decoding out of SQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::relationship::RelationType;

/// Description given to a concept created on first mention
pub const PLACEHOLDER_DESCRIPTION: &str =
    "(Placeholder) Check how this concept is used in the article.";

/// Strength assigned to every newly discovered relation
pub const DEFAULT_STRENGTH: i64 = 5;

/// Canonical uniqueness key for a concept name
///
/// Two names with the same key are the same concept.
pub fn concept_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Source metadata for an article about to be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMeta {
    pub title: String,
    pub url: String,
}

impl ArticleMeta {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// A stored news article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub title_ko: String,
    pub original_url: String,
    pub summary_ko: String,
    pub created_at: DateTime<Utc>,
}

/// A deduplicated domain concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: i64,
    pub name: String,
    pub description_ko: String,
    pub real_world_examples_ko: Vec<String>,
}

#[derive(Debug, FromRow)]
pub(crate) struct ConceptRow {
    pub id: i64,
    pub name: String,
    pub description_ko: String,
    pub real_world_examples_ko: String,
}

impl ConceptRow {
    pub fn into_entity(self) -> Concept {
        Concept {
            id: self.id,
            name: self.name,
            description_ko: self.description_ko,
            real_world_examples_ko: serde_json::from_str(&self.real_world_examples_ko)
                .unwrap_or_default(),
        }
    }
}

/// A directed, typed, weighted edge between two concepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRelation {
    pub id: i64,
    pub from_concept_id: i64,
    pub to_concept_id: i64,
    pub relation_type: RelationType,
    pub strength: i64,
}

#[derive(Debug, FromRow)]
pub(crate) struct RelationRow {
    pub id: i64,
    pub from_concept_id: i64,
    pub to_concept_id: i64,
    pub relation_type: String,
    pub strength: i64,
}

impl RelationRow {
    /// `None` only if the row predates the type CHECK constraint.
    pub fn into_entity(self) -> Option<ConceptRelation> {
        Some(ConceptRelation {
            id: self.id,
            from_concept_id: self.from_concept_id,
            to_concept_id: self.to_concept_id,
            relation_type: RelationType::parse(&self.relation_type)?,
            strength: self.strength,
        })
    }
}

/// A user's explicit interest in a concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Collection {
    pub user_id: i64,
    pub concept_id: i64,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
}
