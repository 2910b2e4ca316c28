//! Ledger writer: the store-of-record transaction boundary
//!
//! An article, its concepts and its links land in one transaction. Relations
//! are loaded item by item so one bad candidate never sinks a batch.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::queries::{article_id_by_url, find_concept_id};
use super::resolver::{ResolvedConcept, resolve_concept};
use crate::domain::{
    Article, ArticleAnalysis, ArticleMeta, CandidateRelation, ConceptRelation, DEFAULT_STRENGTH,
};
use crate::error::{Error, Result};
use crate::graph::{GraphStore, ProjectionBatch, RelationEdge, mirror};

/// Result of [`LedgerWriter::load_article`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    Created {
        article: Article,
        concepts: Vec<ResolvedConcept>,
    },
    /// The URL is already stored; nothing was written
    Duplicate { existing_id: i64 },
}

impl LoadOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    pub fn article(&self) -> Option<&Article> {
        match self {
            Self::Created { article, .. } => Some(article),
            Self::Duplicate { .. } => None,
        }
    }
}

/// Aggregate counts from [`LedgerWriter::load_relations`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelationLoadReport {
    pub saved: usize,
    pub skipped_duplicate: usize,
    pub skipped_unresolved: usize,
    /// Endpoints resolved to the same concept
    pub skipped_invalid: usize,
    pub failed: usize,
    pub mirror_failures: usize,
}

impl RelationLoadReport {
    pub fn total(&self) -> usize {
        self.saved
            + self.skipped_duplicate
            + self.skipped_unresolved
            + self.skipped_invalid
            + self.failed
    }

    pub fn merge(&mut self, other: &RelationLoadReport) {
        self.saved += other.saved;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_unresolved += other.skipped_unresolved;
        self.skipped_invalid += other.skipped_invalid;
        self.failed += other.failed;
        self.mirror_failures += other.mirror_failures;
    }
}

enum RelationOutcome {
    Saved(ConceptRelation),
    Duplicate,
    Unresolved,
    SelfLoop,
}

#[derive(Clone)]
pub struct LedgerWriter {
    pool: SqlitePool,
    graph: Arc<dyn GraphStore>,
}

impl LedgerWriter {
    pub fn new(pool: SqlitePool, graph: Arc<dyn GraphStore>) -> Self {
        Self { pool, graph }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store an analysed article with its concept links.
    ///
    /// A URL that is already stored yields [`LoadOutcome::Duplicate`]. Any
    /// failure after the article insert rolls the whole unit back. Newly
    /// created concepts are mirrored into the graph view after commit.
    pub async fn load_article(
        &self,
        meta: &ArticleMeta,
        analysis: &ArticleAnalysis,
    ) -> Result<LoadOutcome> {
        let url = meta.url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("Article URL must not be empty".to_string()));
        }

        let outcome = self
            .write_article(url, meta, analysis)
            .await
            .map_err(|e| match e {
                Error::DatabaseError(db) => Error::StoreWriteFailed(db.to_string()),
                other => other,
            })?;

        if let LoadOutcome::Created { article, concepts } = &outcome {
            info!(
                article_id = article.id,
                concepts = concepts.len(),
                "Stored article"
            );

            let created: Vec<_> = concepts
                .iter()
                .filter(|c| c.created)
                .map(ResolvedConcept::placeholder_node)
                .collect();
            if !created.is_empty() {
                mirror(self.graph.as_ref(), &ProjectionBatch::concepts(created)).await;
            }
        }

        Ok(outcome)
    }

    async fn write_article(
        &self,
        url: &str,
        meta: &ArticleMeta,
        analysis: &ArticleAnalysis,
    ) -> Result<LoadOutcome> {
        let mut tx = self.pool.begin().await?;

        // Insert first so the transaction takes the write lock up front.
        let article: Option<Article> = sqlx::query_as(
            "INSERT INTO articles (title, title_ko, original_url, summary_ko, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(original_url) DO NOTHING
             RETURNING id, title, title_ko, original_url, summary_ko, created_at",
        )
        .bind(meta.title.trim())
        .bind(&analysis.title_ko)
        .bind(url)
        .bind(&analysis.summary_ko)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(article) = article else {
            tx.rollback().await?;
            let existing_id = article_id_by_url(&self.pool, url)
                .await?
                .ok_or_else(|| Error::ArticleNotFound(url.to_string()))?;
            debug!(article_id = existing_id, url = %url, "Article already stored");
            return Ok(LoadOutcome::Duplicate { existing_id });
        };

        let mut concepts: Vec<ResolvedConcept> = Vec::new();
        for name in &analysis.concept_names {
            if name.trim().is_empty() {
                continue;
            }

            let resolved = resolve_concept(&mut tx, name).await?;

            sqlx::query(
                "INSERT INTO article_concepts (article_id, concept_id) VALUES (?, ?)
                 ON CONFLICT(article_id, concept_id) DO NOTHING",
            )
            .bind(article.id)
            .bind(resolved.id)
            .execute(&mut *tx)
            .await?;

            if !concepts.iter().any(|c| c.id == resolved.id) {
                concepts.push(resolved);
            }
        }

        tx.commit().await?;

        Ok(LoadOutcome::Created { article, concepts })
    }

    /// Persist candidate relations with the default strength.
    ///
    /// Lookups read committed state on every item. An existing `(from, to)`
    /// pair is left untouched whatever its type. Saved edges are mirrored
    /// into the graph view best-effort.
    pub async fn load_relations(&self, relations: &[CandidateRelation]) -> RelationLoadReport {
        let mut report = RelationLoadReport::default();

        for candidate in relations {
            match self.load_relation(candidate).await {
                Ok(RelationOutcome::Saved(relation)) => {
                    report.saved += 1;
                    let edge = RelationEdge::from(&relation);
                    if !mirror(self.graph.as_ref(), &ProjectionBatch::relation(edge)).await {
                        report.mirror_failures += 1;
                    }
                }
                Ok(RelationOutcome::Duplicate) => {
                    debug!(from = %candidate.from, to = %candidate.to, "Relation already stored");
                    report.skipped_duplicate += 1;
                }
                Ok(RelationOutcome::Unresolved) => {
                    debug!(from = %candidate.from, to = %candidate.to, "Relation endpoint not found");
                    report.skipped_unresolved += 1;
                }
                Ok(RelationOutcome::SelfLoop) => {
                    debug!(from = %candidate.from, to = %candidate.to, "Relation endpoints are the same concept");
                    report.skipped_invalid += 1;
                }
                Err(e) => {
                    warn!(from = %candidate.from, to = %candidate.to, error = %e, "Failed to store relation");
                    report.failed += 1;
                }
            }
        }

        info!(
            saved = report.saved,
            duplicates = report.skipped_duplicate,
            unresolved = report.skipped_unresolved,
            invalid = report.skipped_invalid,
            failed = report.failed,
            "Relation loading complete"
        );
        report
    }

    async fn load_relation(&self, candidate: &CandidateRelation) -> Result<RelationOutcome> {
        let mut conn = self.pool.acquire().await?;

        let (Some(from_id), Some(to_id)) = (
            find_concept_id(&mut conn, &candidate.from).await?,
            find_concept_id(&mut conn, &candidate.to).await?,
        ) else {
            return Ok(RelationOutcome::Unresolved);
        };

        if from_id == to_id {
            return Ok(RelationOutcome::SelfLoop);
        }

        let inserted: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO concept_relations (from_concept_id, to_concept_id, relation_type, strength, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(from_concept_id, to_concept_id) DO NOTHING
             RETURNING id",
        )
        .bind(from_id)
        .bind(to_id)
        .bind(candidate.relation_type.as_str())
        .bind(DEFAULT_STRENGTH)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(match inserted {
            Some((id,)) => RelationOutcome::Saved(ConceptRelation {
                id,
                from_concept_id: from_id,
                to_concept_id: to_id,
                relation_type: candidate.relation_type,
                strength: DEFAULT_STRENGTH,
            }),
            None => RelationOutcome::Duplicate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RelationType;
    use crate::graph::InMemoryGraphStore;
    use crate::storage::Database;

    async fn setup() -> (Database, Arc<InMemoryGraphStore>, LedgerWriter) {
        let db = Database::in_memory().await.expect("Failed to create database");
        let graph = Arc::new(InMemoryGraphStore::new());
        let writer = LedgerWriter::new(db.pool().clone(), graph.clone());
        (db, graph, writer)
    }

    fn analysis(names: &[&str]) -> ArticleAnalysis {
        ArticleAnalysis {
            title_ko: "제목".to_string(),
            summary_ko: "요약".to_string(),
            concept_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    async fn count(db: &Database, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db.pool())
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn test_load_article_creates_links() {
        let (db, graph, writer) = setup().await;
        let meta = ArticleMeta::new("GPUs everywhere", "https://example.com/gpu");

        let outcome = writer
            .load_article(&meta, &analysis(&["GPU", "CUDA"]))
            .await
            .unwrap();

        let article = outcome.article().unwrap();
        assert_eq!(article.original_url, "https://example.com/gpu");
        assert_eq!(article.title_ko, "제목");
        assert_eq!(count(&db, "article_concepts").await, 2);
        assert_eq!(graph.concepts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_load_article_twice_is_duplicate() {
        let (db, _graph, writer) = setup().await;
        let meta = ArticleMeta::new("GPUs everywhere", "https://example.com/gpu");

        let first = writer.load_article(&meta, &analysis(&["GPU"])).await.unwrap();
        let second = writer.load_article(&meta, &analysis(&["GPU", "TPU"])).await.unwrap();

        assert!(second.is_duplicate());
        assert_eq!(
            second,
            LoadOutcome::Duplicate {
                existing_id: first.article().unwrap().id
            }
        );
        assert_eq!(count(&db, "articles").await, 1);
        assert_eq!(count(&db, "article_concepts").await, 1);
        assert_eq!(count(&db, "concepts").await, 1);
    }

    #[tokio::test]
    async fn test_load_article_links_case_variants_once() {
        let (db, _graph, writer) = setup().await;
        let meta = ArticleMeta::new("t", "https://example.com/a");

        let outcome = writer
            .load_article(&meta, &analysis(&["GPU", "gpu"]))
            .await
            .unwrap();

        match outcome {
            LoadOutcome::Created { concepts, .. } => assert_eq!(concepts.len(), 1),
            LoadOutcome::Duplicate { .. } => panic!("expected a new article"),
        }
        assert_eq!(count(&db, "article_concepts").await, 1);
    }

    #[tokio::test]
    async fn test_load_article_rejects_empty_url() {
        let (db, _graph, writer) = setup().await;

        let err = writer
            .load_article(&ArticleMeta::new("t", "  "), &analysis(&["GPU"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(count(&db, "articles").await, 0);
    }

    #[tokio::test]
    async fn test_failed_link_rolls_back_article() {
        let (db, _graph, writer) = setup().await;

        sqlx::query(
            "CREATE TRIGGER reject_links BEFORE INSERT ON article_concepts
             BEGIN SELECT RAISE(ABORT, 'link rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = writer
            .load_article(
                &ArticleMeta::new("t", "https://example.com/rollback"),
                &analysis(&["GPU"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StoreWriteFailed(_)));
        assert_eq!(count(&db, "articles").await, 0);
        assert_eq!(count(&db, "concepts").await, 0);
    }

    #[tokio::test]
    async fn test_graph_failure_keeps_article() {
        let (db, graph, writer) = setup().await;
        graph.set_failing(true);

        let outcome = writer
            .load_article(
                &ArticleMeta::new("t", "https://example.com/graph-down"),
                &analysis(&["GPU"]),
            )
            .await
            .unwrap();

        assert!(!outcome.is_duplicate());
        assert_eq!(count(&db, "articles").await, 1);
    }

    #[tokio::test]
    async fn test_load_relations_suppresses_duplicates() {
        let (db, graph, writer) = setup().await;
        writer
            .load_article(&ArticleMeta::new("t", "https://example.com/ab"), &analysis(&["A", "B"]))
            .await
            .unwrap();

        let batch = vec![
            CandidateRelation::new("A", "B", RelationType::UsedIn),
            CandidateRelation::new("A", "B", RelationType::UsedIn),
        ];

        let first = writer.load_relations(&batch).await;
        assert_eq!(first.saved, 1);
        assert_eq!(first.skipped_duplicate, 1);

        let second = writer.load_relations(&batch).await;
        assert_eq!(second.saved, 0);
        assert_eq!(second.skipped_duplicate, 2);

        assert_eq!(count(&db, "concept_relations").await, 1);
        assert_eq!(graph.relations().await.len(), 1);
        assert_eq!(graph.relations().await[0].strength, DEFAULT_STRENGTH);
    }

    #[tokio::test]
    async fn test_load_relations_counts_unresolved_and_self_loops() {
        let (_db, _graph, writer) = setup().await;
        writer
            .load_article(&ArticleMeta::new("t", "https://example.com/x"), &analysis(&["GPU"]))
            .await
            .unwrap();

        let report = writer
            .load_relations(&[
                CandidateRelation::new("GPU", "Quantum", RelationType::RelatedTo),
                CandidateRelation::new("GPU", "gpu", RelationType::RelatedTo),
                CandidateRelation::new("gpu", "b", RelationType::PartOf),
            ])
            .await;

        assert_eq!(report.saved, 0);
        assert_eq!(report.skipped_unresolved, 2);
        assert_eq!(report.skipped_invalid, 1);
        assert_eq!(report.total(), 3);
    }

    #[tokio::test]
    async fn test_reverse_direction_is_a_distinct_relation() {
        let (_db, _graph, writer) = setup().await;
        writer
            .load_article(&ArticleMeta::new("t", "https://example.com/ab"), &analysis(&["A", "B"]))
            .await
            .unwrap();

        let report = writer
            .load_relations(&[
                CandidateRelation::new("A", "B", RelationType::PartOf),
                CandidateRelation::new("b", "a", RelationType::Enables),
            ])
            .await;

        assert_eq!(report.saved, 2);
    }

    #[tokio::test]
    async fn test_relation_mirror_failure_is_counted_not_fatal() {
        let (db, graph, writer) = setup().await;
        writer
            .load_article(&ArticleMeta::new("t", "https://example.com/ab"), &analysis(&["A", "B"]))
            .await
            .unwrap();
        graph.set_failing(true);

        let report = writer
            .load_relations(&[CandidateRelation::new("A", "B", RelationType::UsedIn)])
            .await;

        assert_eq!(report.saved, 1);
        assert_eq!(report.mirror_failures, 1);
        assert_eq!(count(&db, "concept_relations").await, 1);
    }
}
