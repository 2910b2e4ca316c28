//! Dispatches claimed tasks to the services that do the work

use async_trait::async_trait;
use serde_json::json;

use super::task::{Task, TaskHandler};
use crate::error::{Error, Result};
use crate::graph::GraphSynchronizer;
use crate::pipeline::IngestionPipeline;

#[derive(Clone)]
pub struct TaskRunner {
    synchronizer: GraphSynchronizer,
    pipeline: Option<IngestionPipeline>,
}

impl TaskRunner {
    pub fn new(synchronizer: GraphSynchronizer) -> Self {
        Self {
            synchronizer,
            pipeline: None,
        }
    }

    /// Without a pipeline, ingestion tasks fail with a configuration error.
    pub fn with_pipeline(mut self, pipeline: IngestionPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

#[async_trait]
impl TaskHandler for TaskRunner {
    async fn handle(&self, task: &Task) -> Result<serde_json::Value> {
        match task {
            Task::RunIngestion { max_articles } => {
                let pipeline = self.pipeline.as_ref().ok_or_else(|| {
                    Error::ConfigError(
                        "Ingestion is not configured for this worker (missing API keys?)".to_string(),
                    )
                })?;
                let report = pipeline.run(*max_articles).await?;
                Ok(json!(report))
            }
            Task::SyncUserGraph { user_id } => {
                let report = self.synchronizer.sync_user(*user_id).await?;
                Ok(json!(report))
            }
        }
    }
}
