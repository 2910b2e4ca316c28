//! Ingestion runs: fetch, analyse, load
//!
//! Each article is its own unit of failure. An extraction timeout or a
//! rolled-back store write is counted and the run moves on to the next
//! article.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::analyzer::ConceptAnalyzer;
use super::source::{ArticleSource, SourceArticle};
use crate::domain::ArticleMeta;
use crate::error::Result;
use crate::ledger::queries::{all_concept_names, article_id_by_url};
use crate::ledger::{LedgerWriter, LoadOutcome, RelationLoadReport};

/// Counts from one [`IngestionPipeline::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub fetched: usize,
    pub created: usize,
    pub duplicates: usize,
    pub extraction_failures: usize,
    pub store_failures: usize,
    pub relations_saved: usize,
    /// Ids of articles created by this run
    pub article_ids: Vec<i64>,
}

/// Counts from one [`IngestionPipeline::run_relations`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelationPassReport {
    pub total_concepts: usize,
    pub candidates: usize,
    pub analysis_failed: bool,
    pub relations: RelationLoadReport,
}

enum ArticleResult {
    Created { article_id: i64, relations_saved: usize },
    Duplicate,
    ExtractionFailed,
    StoreFailed,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    source: Arc<dyn ArticleSource>,
    analyzer: Arc<dyn ConceptAnalyzer>,
    writer: LedgerWriter,
}

impl IngestionPipeline {
    pub fn new(
        source: Arc<dyn ArticleSource>,
        analyzer: Arc<dyn ConceptAnalyzer>,
        writer: LedgerWriter,
    ) -> Self {
        Self {
            source,
            analyzer,
            writer,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Ingest up to `max_articles` articles from the source.
    ///
    /// Only a failed fetch aborts the run.
    pub async fn run(&self, max_articles: usize) -> Result<IngestionReport> {
        let articles = self.source.fetch(max_articles).await?;
        info!(
            source = self.source.name(),
            fetched = articles.len(),
            "Starting ingestion run"
        );

        let mut report = IngestionReport {
            fetched: articles.len(),
            ..Default::default()
        };

        for article in &articles {
            match self.ingest_one(article).await {
                ArticleResult::Created {
                    article_id,
                    relations_saved,
                } => {
                    report.created += 1;
                    report.relations_saved += relations_saved;
                    report.article_ids.push(article_id);
                }
                ArticleResult::Duplicate => report.duplicates += 1,
                ArticleResult::ExtractionFailed => report.extraction_failures += 1,
                ArticleResult::StoreFailed => report.store_failures += 1,
            }
        }

        info!(
            fetched = report.fetched,
            created = report.created,
            duplicates = report.duplicates,
            extraction_failures = report.extraction_failures,
            store_failures = report.store_failures,
            relations_saved = report.relations_saved,
            "Ingestion run complete"
        );
        Ok(report)
    }

    async fn ingest_one(&self, source: &SourceArticle) -> ArticleResult {
        let url = source.url.trim();

        // Skip known URLs before paying for analysis.
        match article_id_by_url(self.writer.pool(), url).await {
            Ok(Some(existing_id)) => {
                debug!(article_id = existing_id, url = %url, "Article already ingested");
                return ArticleResult::Duplicate;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to check for existing article");
                return ArticleResult::StoreFailed;
            }
        }

        let analysis = match self.analyzer.analyze_article(&source.text).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(url = %url, error = %e, "Article analysis failed");
                return ArticleResult::ExtractionFailed;
            }
        };

        let meta = ArticleMeta::new(&source.title, url);
        let (article_id, names) = match self.writer.load_article(&meta, &analysis).await {
            Ok(LoadOutcome::Created { article, concepts }) => (
                article.id,
                concepts.into_iter().map(|c| c.name).collect::<Vec<_>>(),
            ),
            Ok(LoadOutcome::Duplicate { existing_id }) => {
                debug!(article_id = existing_id, "Article stored concurrently");
                return ArticleResult::Duplicate;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to store article");
                return ArticleResult::StoreFailed;
            }
        };

        info!(article_id, concepts = names.len(), "Article ingested");

        let relations_saved = if names.len() < 2 {
            0
        } else {
            match self.analyzer.analyze_relations(&names).await {
                Ok(candidates) => self.writer.load_relations(&candidates).await.saved,
                Err(e) => {
                    warn!(article_id, error = %e, "Relation analysis failed");
                    0
                }
            }
        };

        ArticleResult::Created {
            article_id,
            relations_saved,
        }
    }

    /// Discover relations across every stored concept.
    pub async fn run_relations(&self) -> Result<RelationPassReport> {
        let names = all_concept_names(self.writer.pool()).await?;
        let mut report = RelationPassReport {
            total_concepts: names.len(),
            ..Default::default()
        };

        if names.len() < 2 {
            info!(concepts = names.len(), "Not enough concepts for relation analysis");
            return Ok(report);
        }

        let candidates = match self.analyzer.analyze_relations(&names).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(concepts = names.len(), error = %e, "Relation analysis failed");
                report.analysis_failed = true;
                return Ok(report);
            }
        };

        report.candidates = candidates.len();
        report.relations = self.writer.load_relations(&candidates).await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArticleAnalysis, CandidateRelation, RelationType};
    use crate::error::Error;
    use crate::graph::InMemoryGraphStore;
    use crate::pipeline::StaticSource;
    use crate::storage::Database;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Analyzer keyed on text prefixes; "FAIL" articles raise extraction errors
    struct StubAnalyzer {
        article_calls: AtomicUsize,
    }

    #[async_trait]
    impl ConceptAnalyzer for StubAnalyzer {
        async fn analyze_article(&self, text: &str) -> Result<ArticleAnalysis> {
            self.article_calls.fetch_add(1, Ordering::SeqCst);
            if text.starts_with("FAIL") {
                return Err(Error::ExtractionFailed("timeout".to_string()));
            }
            Ok(ArticleAnalysis {
                title_ko: "제목".to_string(),
                summary_ko: "요약".to_string(),
                concept_names: vec!["GPU".to_string(), "CUDA".to_string()],
            })
        }

        async fn analyze_relations(&self, names: &[String]) -> Result<Vec<CandidateRelation>> {
            assert!(names.len() >= 2);
            Ok(vec![CandidateRelation::new("CUDA", "GPU", RelationType::UsedIn)])
        }
    }

    fn article(url: &str, text: &str) -> SourceArticle {
        SourceArticle {
            title: format!("Title for {}", url),
            url: url.to_string(),
            text: text.to_string(),
            published_at: None,
        }
    }

    async fn pipeline(articles: Vec<SourceArticle>) -> (IngestionPipeline, Arc<StubAnalyzer>, Database) {
        let db = Database::in_memory().await.unwrap();
        let writer = LedgerWriter::new(db.pool().clone(), Arc::new(InMemoryGraphStore::new()));
        let analyzer = Arc::new(StubAnalyzer {
            article_calls: AtomicUsize::new(0),
        });
        let pipeline = IngestionPipeline::new(
            Arc::new(StaticSource::new(articles)),
            analyzer.clone(),
            writer,
        );
        (pipeline, analyzer, db)
    }

    #[tokio::test]
    async fn test_failed_extraction_does_not_stop_run() {
        let (pipeline, _, _db) = pipeline(vec![
            article("https://example.com/1", "FAIL this one"),
            article("https://example.com/2", "fine"),
        ])
        .await;

        let report = pipeline.run(5).await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.extraction_failures, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.relations_saved, 1);
    }

    #[tokio::test]
    async fn test_rerun_skips_known_urls_without_analysis() {
        let (pipeline, analyzer, _db) = pipeline(vec![article("https://example.com/1", "fine")]).await;

        pipeline.run(5).await.unwrap();
        let second = pipeline.run(5).await.unwrap();

        assert_eq!(second.created, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(analyzer.article_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_relation_pass_over_all_concepts() {
        let (pipeline, _, _db) = pipeline(vec![article("https://example.com/1", "fine")]).await;
        pipeline.run(1).await.unwrap();

        let report = pipeline.run_relations().await.unwrap();
        assert_eq!(report.total_concepts, 2);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.relations.saved, 0);
        assert_eq!(report.relations.skipped_duplicate, 1);
    }

    #[tokio::test]
    async fn test_relation_pass_with_empty_store() {
        let (pipeline, _, _db) = pipeline(vec![]).await;
        let report = pipeline.run_relations().await.unwrap();
        assert_eq!(report, RelationPassReport::default());
    }
}
