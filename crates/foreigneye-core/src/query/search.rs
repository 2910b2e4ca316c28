//! Article search by concept name

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::relatives::{RelativeConcept, RelativeSelector};
use crate::domain::{Article, concept_key};
use crate::error::Result;

/// A concept linked to an article, as shown in result lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ConceptPreview {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleSearchResult {
    #[serde(flatten)]
    pub article: Article,
    pub concepts: Vec<ConceptPreview>,
    pub relative_concepts: Vec<RelativeConcept>,
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[derive(Clone)]
pub struct SearchService {
    pool: SqlitePool,
    relatives: RelativeSelector,
}

impl SearchService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            relatives: RelativeSelector::new(pool.clone()),
            pool,
        }
    }

    /// Articles linked to the named concept, newest first.
    ///
    /// Unknown or blank names match nothing.
    pub async fn articles_by_concept(&self, name: &str) -> Result<Vec<ArticleSearchResult>> {
        self.articles_by_concepts(&[name.to_string()]).await
    }

    /// Articles linked to every named concept, newest first.
    ///
    /// Names are matched case-insensitively; if any name is unknown the
    /// intersection is empty.
    pub async fn articles_by_concepts(&self, names: &[String]) -> Result<Vec<ArticleSearchResult>> {
        let mut keys: Vec<String> = Vec::new();
        for name in names {
            let key = concept_key(name);
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let lookup = format!(
            "SELECT id FROM concepts WHERE name_key IN ({})",
            placeholders(keys.len())
        );
        let mut query = sqlx::query_as::<_, (i64,)>(&lookup);
        for key in &keys {
            query = query.bind(key);
        }
        let concept_ids: Vec<i64> = query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(id,)| id)
            .collect();

        if concept_ids.len() != keys.len() {
            return Ok(Vec::new());
        }

        let search = format!(
            "SELECT a.id, a.title, a.title_ko, a.original_url, a.summary_ko, a.created_at
             FROM articles a
             WHERE a.id IN (
                 SELECT article_id FROM article_concepts
                 WHERE concept_id IN ({})
                 GROUP BY article_id
                 HAVING COUNT(DISTINCT concept_id) = ?
             )
             ORDER BY a.created_at DESC, a.id DESC",
            placeholders(concept_ids.len())
        );
        let mut query = sqlx::query_as::<_, Article>(&search);
        for id in &concept_ids {
            query = query.bind(id);
        }
        let articles = query
            .bind(concept_ids.len() as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut results = Vec::with_capacity(articles.len());
        for article in articles {
            results.push(self.decorate(article).await?);
        }
        Ok(results)
    }

    async fn decorate(&self, article: Article) -> Result<ArticleSearchResult> {
        let concepts: Vec<ConceptPreview> = sqlx::query_as(
            "SELECT c.id, c.name
             FROM concepts c
             JOIN article_concepts ac ON ac.concept_id = c.id
             WHERE ac.article_id = ?
             ORDER BY c.id",
        )
        .bind(article.id)
        .fetch_all(&self.pool)
        .await?;

        let relative_concepts = self.relatives.relatives_unchecked(article.id).await?;

        Ok(ArticleSearchResult {
            article,
            concepts,
            relative_concepts,
        })
    }
}
