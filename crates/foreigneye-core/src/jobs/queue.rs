//! Durable task queue on the `jobs` table
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that string
//! comparison in SQL matches time order.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, error, info, warn};

use super::task::Task;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};

/// Upper bound on a single retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// A claimed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: i64,
    pub task: Task,
    /// Attempts including the current one
    pub attempts: u32,
    pub max_attempts: u32,
}

/// Row view used by `foreigneye jobs`
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct JobRecord {
    pub id: i64,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub run_after: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub done: i64,
    pub dead: i64,
}

#[derive(Debug, FromRow)]
struct ClaimedRow {
    id: i64,
    payload: String,
    attempts: i64,
    max_attempts: i64,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    max_attempts: u32,
    backoff_base: Duration,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self::from_config(pool, &WorkerConfig::default())
    }

    pub fn from_config(pool: SqlitePool, config: &WorkerConfig) -> Self {
        Self {
            pool,
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_secs(config.backoff_base_secs),
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Add a task; it becomes claimable immediately.
    pub async fn enqueue(&self, task: &Task) -> Result<i64> {
        let payload = serde_json::to_string(task)
            .map_err(|e| Error::Other(format!("Failed to encode task: {}", e)))?;
        let now = timestamp(Utc::now());

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO jobs (kind, payload, status, attempts, max_attempts, run_after, created_at, updated_at)
             VALUES (?, ?, 'pending', 0, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(task.kind())
        .bind(&payload)
        .bind(self.max_attempts as i64)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        info!(job_id = id, task = %task, "Enqueued task");
        Ok(id)
    }

    /// Atomically move the oldest due job to `running` and return it.
    ///
    /// Jobs with an undecodable payload are marked dead and skipped.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        loop {
            let now = timestamp(Utc::now());
            let claimed: Option<ClaimedRow> = sqlx::query_as(
                "UPDATE jobs
                 SET status = 'running', attempts = attempts + 1, updated_at = ?
                 WHERE id = (
                     SELECT id FROM jobs
                     WHERE status = 'pending' AND run_after <= ?
                     ORDER BY run_after, id
                     LIMIT 1
                 )
                 RETURNING id, payload, attempts, max_attempts",
            )
            .bind(&now)
            .bind(&now)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = claimed else {
                return Ok(None);
            };

            match serde_json::from_str::<Task>(&row.payload) {
                Ok(task) => {
                    debug!(job_id = row.id, attempt = row.attempts, "Claimed job");
                    return Ok(Some(Job {
                        id: row.id,
                        task,
                        attempts: row.attempts as u32,
                        max_attempts: row.max_attempts as u32,
                    }));
                }
                Err(e) => {
                    error!(job_id = row.id, error = %e, "Undecodable job payload");
                    self.mark(row.id, JobStatus::Dead, Some(&e.to_string()))
                        .await?;
                }
            }
        }
    }

    pub async fn complete(&self, job_id: i64) -> Result<()> {
        self.mark(job_id, JobStatus::Done, None).await
    }

    /// Record a failed attempt.
    ///
    /// The job is rescheduled with exponential backoff, or marked dead once
    /// it has used all of its attempts. Returns the new status.
    pub async fn fail(&self, job: &Job, error: &str) -> Result<JobStatus> {
        if job.attempts >= job.max_attempts {
            warn!(job_id = job.id, attempts = job.attempts, error = %error, "Job exhausted its attempts");
            self.mark(job.id, JobStatus::Dead, Some(error)).await?;
            return Ok(JobStatus::Dead);
        }

        let delay = self.backoff_for(job.attempts);
        let run_after = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));

        sqlx::query(
            "UPDATE jobs SET status = 'pending', last_error = ?, run_after = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(timestamp(run_after))
        .bind(timestamp(Utc::now()))
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        warn!(
            job_id = job.id,
            attempt = job.attempts,
            retry_in_secs = delay.as_secs(),
            error = %error,
            "Job failed, scheduled retry"
        );
        Ok(JobStatus::Pending)
    }

    /// Delay before the next attempt after `attempts` failures
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// Put jobs left `running` by a dead worker process back in line.
    pub async fn requeue_running(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'pending', updated_at = ? WHERE status = 'running'",
        )
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(jobs = result.rows_affected(), "Requeued interrupted jobs");
        }
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::Running) => stats.running = count,
                Some(JobStatus::Done) => stats.done = count,
                Some(JobStatus::Dead) => stats.dead = count,
                None => {}
            }
        }
        Ok(stats)
    }

    /// Most recently touched jobs first
    pub async fn recent(&self, limit: i64) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query_as(
            "SELECT id, kind, payload, status, attempts, max_attempts, last_error, run_after, updated_at
             FROM jobs ORDER BY updated_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark(&self, job_id: i64, status: JobStatus, error: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = ?, last_error = COALESCE(?, last_error), updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(timestamp(Utc::now()))
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn setup() -> (Database, JobQueue) {
        let db = Database::in_memory().await.expect("Failed to create database");
        let queue = JobQueue::new(db.pool().clone()).with_backoff_base(Duration::ZERO);
        (db, queue)
    }

    #[tokio::test]
    async fn test_enqueue_and_claim_in_order() {
        let (_db, queue) = setup().await;

        let first = queue.enqueue(&Task::SyncUserGraph { user_id: 1 }).await.unwrap();
        let second = queue.enqueue(&Task::RunIngestion { max_articles: 3 }).await.unwrap();

        let job = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(job.id, first);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.task, Task::SyncUserGraph { user_id: 1 });

        let job = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(job.id, second);

        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_marks_done() {
        let (_db, queue) = setup().await;
        queue.enqueue(&Task::SyncUserGraph { user_id: 1 }).await.unwrap();

        let job = queue.claim_next().await.unwrap().unwrap();
        queue.complete(job.id).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats, QueueStats { done: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn test_fail_retries_then_dies() {
        let (_db, queue) = setup().await;
        let queue = queue.with_max_attempts(2);
        queue.enqueue(&Task::SyncUserGraph { user_id: 1 }).await.unwrap();

        let job = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(queue.fail(&job, "graph down").await.unwrap(), JobStatus::Pending);

        let job = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(queue.fail(&job, "graph down").await.unwrap(), JobStatus::Dead);

        assert!(queue.claim_next().await.unwrap().is_none());
        let recent = queue.recent(10).await.unwrap();
        assert_eq!(recent[0].status, "dead");
        assert_eq!(recent[0].last_error.as_deref(), Some("graph down"));
    }

    #[tokio::test]
    async fn test_retry_waits_for_backoff() {
        let db = Database::in_memory().await.unwrap();
        let queue = JobQueue::new(db.pool().clone()).with_backoff_base(Duration::from_secs(60));
        queue.enqueue(&Task::SyncUserGraph { user_id: 1 }).await.unwrap();

        let job = queue.claim_next().await.unwrap().unwrap();
        queue.fail(&job, "boom").await.unwrap();

        assert!(queue.claim_next().await.unwrap().is_none());
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_backoff_grows_and_caps() {
        let (_db, queue) = setup().await;
        let queue = queue.with_backoff_base(Duration::from_secs(5));

        assert_eq!(queue.backoff_for(1), Duration::from_secs(5));
        assert_eq!(queue.backoff_for(3), Duration::from_secs(20));
        assert_eq!(queue.backoff_for(40), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_bad_payload_is_buried() {
        let (db, queue) = setup().await;
        sqlx::query(
            "INSERT INTO jobs (kind, payload, run_after, created_at, updated_at)
             VALUES ('mystery', '{\"kind\": \"mystery\"}', '', '', '')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        queue.enqueue(&Task::SyncUserGraph { user_id: 9 }).await.unwrap();

        let job = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(job.task, Task::SyncUserGraph { user_id: 9 });
        assert_eq!(queue.stats().await.unwrap().dead, 1);
    }

    #[tokio::test]
    async fn test_requeue_running() {
        let (_db, queue) = setup().await;
        queue.enqueue(&Task::SyncUserGraph { user_id: 1 }).await.unwrap();
        queue.claim_next().await.unwrap().unwrap();

        assert_eq!(queue.requeue_running().await.unwrap(), 1);
        assert!(queue.claim_next().await.unwrap().is_some());
    }
}
