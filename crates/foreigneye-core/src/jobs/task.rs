//! Background task definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A unit of background work. Delivery is at-least-once, so every handler
/// must tolerate running the same task twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Fetch, analyse and store up to `max_articles` new articles
    RunIngestion { max_articles: usize },
    /// Re-derive one user's slice of the graph view
    SyncUserGraph { user_id: i64 },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunIngestion { .. } => "run_ingestion",
            Self::SyncUserGraph { .. } => "sync_user_graph",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RunIngestion { max_articles } => write!(f, "run_ingestion(max_articles={})", max_articles),
            Self::SyncUserGraph { user_id } => write!(f, "sync_user_graph(user_id={})", user_id),
        }
    }
}

/// Executes claimed tasks on behalf of the worker pool
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task; the returned JSON is logged as the job result.
    async fn handle(&self, task: &Task) -> Result<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_json_shape() {
        let task = Task::SyncUserGraph { user_id: 3 };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "sync_user_graph", "user_id": 3}));

        let parsed: Task = serde_json::from_str(r#"{"kind": "run_ingestion", "max_articles": 3}"#).unwrap();
        assert_eq!(parsed, Task::RunIngestion { max_articles: 3 });
        assert_eq!(parsed.kind(), "run_ingestion");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(serde_json::from_str::<Task>(r#"{"kind": "reindex"}"#).is_err());
    }
}
