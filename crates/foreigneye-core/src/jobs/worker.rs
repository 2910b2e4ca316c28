//! Worker pool draining the job queue

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::queue::{Job, JobQueue};
use super::task::TaskHandler;
use crate::config::WorkerConfig;
use crate::error::Result;

/// Outcome of processing one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retrying,
    Dead,
}

/// Runs N tokio workers that claim and execute jobs until cancelled
pub struct WorkerPool {
    queue: JobQueue,
    handler: Arc<dyn TaskHandler>,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(queue: JobQueue, handler: Arc<dyn TaskHandler>, config: &WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            concurrency: config.concurrency.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Claim and run a single job, if one is due.
    pub async fn run_once(&self) -> Result<Option<(i64, JobOutcome)>> {
        let Some(job) = self.queue.claim_next().await? else {
            return Ok(None);
        };
        let outcome = execute(&self.queue, self.handler.as_ref(), &job).await?;
        Ok(Some((job.id, outcome)))
    }

    /// Run until `shutdown` is cancelled. In-flight jobs finish first.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.queue.requeue_running().await?;
        info!(workers = self.concurrency, "Worker pool started");

        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency {
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let shutdown = shutdown.clone();
            let poll_interval = self.poll_interval;

            workers.spawn(async move {
                worker_loop(worker_id, queue, handler, poll_interval, shutdown).await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task panicked");
            }
        }

        info!("Worker pool stopped");
        Ok(())
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: JobQueue,
    handler: Arc<dyn TaskHandler>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    while !shutdown.is_cancelled() {
        match queue.claim_next().await {
            Ok(Some(job)) => {
                if let Err(e) = execute(&queue, handler.as_ref(), &job).await {
                    error!(worker_id, job_id = job.id, error = %e, "Failed to record job outcome");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                warn!(worker_id, error = %e, "Failed to claim job");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
}

async fn execute(queue: &JobQueue, handler: &dyn TaskHandler, job: &Job) -> Result<JobOutcome> {
    info!(job_id = job.id, task = %job.task, attempt = job.attempts, "Running job");

    match handler.handle(&job.task).await {
        Ok(result) => {
            queue.complete(job.id).await?;
            info!(job_id = job.id, result = %result, "Job completed");
            Ok(JobOutcome::Completed)
        }
        Err(e) => {
            let status = queue.fail(job, &format!("[{}] {}", e.code(), e)).await?;
            Ok(match status {
                super::queue::JobStatus::Dead => JobOutcome::Dead,
                _ => JobOutcome::Retrying,
            })
        }
    }
}
