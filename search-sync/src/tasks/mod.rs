//! Background jobs: what they are, how they are scheduled and who runs them.

mod handlers;
mod jobs;
mod scheduler;
mod worker;

pub use handlers::run_job;
pub use jobs::{JobOptions, SearchJob, DEFAULT_QUEUE, LONG_RUNNING_QUEUE};
pub use scheduler::{JobScheduler, QueuedJobScheduler};
pub use worker::{backoff_delay, JobOutcome, Worker, WorkerConfig, WorkerStats};
