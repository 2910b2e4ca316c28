//! Background jobs
//!
//! A SQLite-backed queue with at-least-once delivery, a tokio worker pool,
//! and the [`TaskRunner`] that maps tasks onto the ingestion pipeline and the
//! graph synchronizer.

mod queue;
mod runner;
mod task;
mod worker;

pub use queue::{Job, JobQueue, JobRecord, JobStatus, QueueStats};
pub use runner::TaskRunner;
pub use task::{Task, TaskHandler};
pub use worker::{JobOutcome, WorkerPool};
