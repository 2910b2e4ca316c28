//! Relation types and candidate relation validation
//!
//! Candidates come straight from model output, so validation works on raw
//! `serde_json::Value` items and never trusts their shape.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entity::concept_key;

/// The fixed set of relation types a concept edge may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// Source is a specific kind of target
    IsATypeOf,
    /// Source is applied within target
    UsedIn,
    /// Generic semantic relation
    RelatedTo,
    /// Source makes target possible
    Enables,
    /// Source is a component of target
    PartOf,
}

impl RelationType {
    /// Stored form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsATypeOf => "IS_A_TYPE_OF",
            Self::UsedIn => "USED_IN",
            Self::RelatedTo => "RELATED_TO",
            Self::Enables => "ENABLES",
            Self::PartOf => "PART_OF",
        }
    }

    /// Parse the stored form. Anything else is not a relation type.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "IS_A_TYPE_OF" => Some(Self::IsATypeOf),
            "USED_IN" => Some(Self::UsedIn),
            "RELATED_TO" => Some(Self::RelatedTo),
            "ENABLES" => Some(Self::Enables),
            "PART_OF" => Some(Self::PartOf),
            _ => None,
        }
    }

    pub fn all() -> &'static [RelationType] {
        &[
            Self::IsATypeOf,
            Self::UsedIn,
            Self::RelatedTo,
            Self::Enables,
            Self::PartOf,
        ]
    }

    /// Human-readable edge label, e.g. "Is A Type Of"
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated relation between two concept names, not yet resolved to ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRelation {
    pub from: String,
    pub to: String,
    pub relation_type: RelationType,
}

impl CandidateRelation {
    pub fn new(from: impl Into<String>, to: impl Into<String>, relation_type: RelationType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation_type,
        }
    }
}

fn text_field<'a>(item: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Filter raw candidate relations down to the persistable ones.
///
/// Drops items that are not objects, miss `from`/`to`/`relation_type`, carry
/// an unknown type, or point a concept at itself. A repeated `(from, to)`
/// pair keeps its first occurrence. Names compare case-insensitively.
pub fn validate_relations(raw: &[serde_json::Value]) -> Vec<CandidateRelation> {
    let mut seen = HashSet::new();
    let mut valid = Vec::new();

    for item in raw {
        let (Some(from), Some(to), Some(kind)) = (
            text_field(item, "from"),
            text_field(item, "to"),
            text_field(item, "relation_type"),
        ) else {
            debug!(item = %item, "Skipping relation with missing fields");
            continue;
        };

        let Some(relation_type) = RelationType::parse(kind) else {
            debug!(relation_type = %kind, "Skipping invalid relation type");
            continue;
        };

        let (from_key, to_key) = (concept_key(from), concept_key(to));
        if from_key == to_key {
            debug!(concept = %from, "Skipping self-loop");
            continue;
        }

        if !seen.insert((from_key, to_key)) {
            debug!(from = %from, to = %to, "Skipping repeated pair");
            continue;
        }

        valid.push(CandidateRelation::new(from, to, relation_type));
    }

    valid
}
