//! Relative concepts for an article
//!
//! Outgoing neighbours of the article's concepts, one entry per neighbour,
//! strongest first and capped so a high-degree hub cannot flood the list.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::domain::RelationType;
use crate::error::{Error, Result};

/// Maximum relatives returned per article
pub const RELATIVE_LIMIT: usize = 10;

/// Rows fetched before dedup, as a multiple of the limit
const OVERFETCH_FACTOR: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelativeConcept {
    pub concept_id: i64,
    pub name: String,
    pub relation_type: RelationType,
    pub strength: i64,
}

#[derive(Debug, FromRow)]
struct RelativeRow {
    concept_id: i64,
    name: String,
    relation_type: String,
    strength: i64,
}

/// Keep the strongest relation per target, strongest first, at most `limit`.
///
/// Ties on strength keep the earlier row and sort by concept id.
pub fn select_relatives(candidates: Vec<RelativeConcept>, limit: usize) -> Vec<RelativeConcept> {
    let mut best: HashMap<i64, RelativeConcept> = HashMap::new();
    for candidate in candidates {
        match best.get(&candidate.concept_id) {
            Some(existing) if existing.strength >= candidate.strength => {}
            _ => {
                best.insert(candidate.concept_id, candidate);
            }
        }
    }

    let mut relatives: Vec<RelativeConcept> = best.into_values().collect();
    relatives.sort_by(|a, b| {
        b.strength
            .cmp(&a.strength)
            .then_with(|| a.concept_id.cmp(&b.concept_id))
    });
    relatives.truncate(limit);
    relatives
}

#[derive(Clone)]
pub struct RelativeSelector {
    pool: SqlitePool,
    limit: usize,
}

impl RelativeSelector {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            limit: RELATIVE_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Relatives of a stored article; unknown ids are an error.
    pub async fn relatives(&self, article_id: i64) -> Result<Vec<RelativeConcept>> {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(Error::ArticleNotFound(article_id.to_string()));
        }

        self.relatives_unchecked(article_id).await
    }

    pub(crate) async fn relatives_unchecked(&self, article_id: i64) -> Result<Vec<RelativeConcept>> {
        let rows: Vec<RelativeRow> = sqlx::query_as(
            "SELECT c.id AS concept_id, c.name, r.relation_type, r.strength
             FROM concept_relations r
             JOIN article_concepts ac ON ac.concept_id = r.from_concept_id
             JOIN concepts c ON c.id = r.to_concept_id
             WHERE ac.article_id = ?
             ORDER BY r.strength DESC, r.id
             LIMIT ?",
        )
        .bind(article_id)
        .bind((self.limit * OVERFETCH_FACTOR) as i64)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .into_iter()
            .filter_map(|row| {
                Some(RelativeConcept {
                    relation_type: RelationType::parse(&row.relation_type)?,
                    concept_id: row.concept_id,
                    name: row.name,
                    strength: row.strength,
                })
            })
            .collect();

        Ok(select_relatives(candidates, self.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn relative(concept_id: i64, strength: i64) -> RelativeConcept {
        RelativeConcept {
            concept_id,
            name: format!("C{}", concept_id),
            relation_type: RelationType::RelatedTo,
            strength,
        }
    }

    #[test]
    fn test_keeps_strongest_per_target() {
        let selected = select_relatives(vec![relative(2, 3), relative(2, 9), relative(3, 5)], 10);
        assert_eq!(selected, vec![relative(2, 9), relative(3, 5)]);
    }

    #[test]
    fn test_bound_applies_after_dedup() {
        // One hub repeated many times must not crowd out the rest.
        let mut candidates: Vec<_> = (0..20).map(|_| relative(99, 10)).collect();
        candidates.extend((1..=15).map(|id| relative(id, 5)));

        let selected = select_relatives(candidates, RELATIVE_LIMIT);
        assert_eq!(selected.len(), RELATIVE_LIMIT);
        assert_eq!(selected[0].concept_id, 99);
        assert_eq!(selected.iter().filter(|r| r.concept_id == 99).count(), 1);
        assert!(selected.windows(2).all(|w| w[0].strength >= w[1].strength));
    }

    #[tokio::test]
    async fn test_unknown_article() {
        let db = Database::in_memory().await.unwrap();
        let err = RelativeSelector::new(db.pool().clone())
            .relatives(404)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ArticleNotFound(_)));
    }

    #[tokio::test]
    async fn test_relatives_from_store() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();
        for (id, name) in [(1, "GPU"), (2, "CUDA"), (3, "LLM"), (4, "TPU")] {
            sqlx::query(
                "INSERT INTO concepts (id, name, name_key, created_at) VALUES (?, ?, ?, '2024-01-01T00:00:00Z')",
            )
            .bind(id)
            .bind(name)
            .bind(name.to_lowercase())
            .execute(pool)
            .await
            .unwrap();
        }
        sqlx::query(
            "INSERT INTO articles (id, title, original_url, created_at) VALUES (1, 'A', 'https://example.com/a', '2024-01-01T00:00:00Z')",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO article_concepts (article_id, concept_id) VALUES (1, 1), (1, 2)")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO concept_relations (from_concept_id, to_concept_id, relation_type, strength, created_at) VALUES
             (1, 3, 'ENABLES', 7, '2024-01-01T00:00:00Z'),
             (2, 3, 'USED_IN', 9, '2024-01-01T00:00:00Z'),
             (2, 1, 'USED_IN', 5, '2024-01-01T00:00:00Z'),
             (4, 3, 'RELATED_TO', 10, '2024-01-01T00:00:00Z')",
        )
        .execute(pool)
        .await
        .unwrap();

        let relatives = RelativeSelector::new(pool.clone()).relatives(1).await.unwrap();
        assert_eq!(
            relatives,
            vec![
                RelativeConcept {
                    concept_id: 3,
                    name: "LLM".to_string(),
                    relation_type: RelationType::UsedIn,
                    strength: 9,
                },
                RelativeConcept {
                    concept_id: 1,
                    name: "GPU".to_string(),
                    relation_type: RelationType::UsedIn,
                    strength: 5,
                },
            ]
        );
    }
}
