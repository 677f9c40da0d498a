//! Background processing: invocation queue, worker and record expiry

mod job_queue;
mod sweeper;
mod worker;

pub use job_queue::{Job, JobProgress, JobQueue, JobStatus, QueueStats, WorkerTask};
pub use sweeper::{spawn_ttl_sweeper, sweep_once};
pub use worker::Worker;
