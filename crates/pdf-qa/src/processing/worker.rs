//! Background worker answering queries and ingesting documents

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::generation::RagPipeline;
use crate::storage::QueryTable;

use super::job_queue::{Job, JobQueue, WorkerTask};

/// Worker draining the job queue
pub struct Worker {
    pipeline: Arc<RagPipeline>,
    table: QueryTable,
    job_queue: Arc<JobQueue>,
    concurrency: usize,
    task_timeout: Duration,
}

impl Worker {
    pub fn new(
        pipeline: Arc<RagPipeline>,
        table: QueryTable,
        job_queue: Arc<JobQueue>,
        config: &WorkerConfig,
    ) -> Self {
        let concurrency = config.effective_concurrency();
        let task_timeout = Duration::from_secs(config.task_timeout_secs);

        tracing::info!(
            "Worker configured: {} concurrent tasks, {}s timeout",
            concurrency,
            config.task_timeout_secs
        );

        Self {
            pipeline,
            table,
            job_queue,
            concurrency,
            task_timeout,
        }
    }

    /// Process jobs until every sender is gone
    pub async fn run(self, mut receiver: mpsc::Receiver<Job>) {
        tracing::info!("Worker started with {} slots", self.concurrency);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let worker = Arc::new(self);

        while let Some(job) = receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let worker = worker.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker.execute(job).await;
            });
        }

        tracing::info!("Worker stopped");
    }

    async fn execute(&self, job: Job) {
        let job_id = job.id;
        let kind = job.task.kind();
        let start_time = Instant::now();

        self.job_queue.mark_running(job_id);

        let result = match timeout(self.task_timeout, self.handle(job.task)).await {
            Ok(inner) => inner,
            Err(_) => Err(Error::internal(format!(
                "Task timeout after {}s",
                self.task_timeout.as_secs()
            ))),
        };

        match result {
            Ok(()) => {
                self.job_queue.mark_complete(job_id);
                tracing::info!(
                    "{} task {} completed in {:.1}s",
                    kind,
                    job_id,
                    start_time.elapsed().as_secs_f64()
                );
            }
            Err(e) => {
                self.job_queue.mark_failed(job_id);
                tracing::error!("{} task {} failed: {}", kind, job_id, e);
            }
        }
    }

    /// Run one task to completion
    ///
    /// A failed answer leaves the stored record incomplete.
    pub async fn handle(&self, task: WorkerTask) -> Result<()> {
        match task {
            WorkerTask::Answer(mut item) => {
                tracing::info!("Processing query {}: {:?}", item.query_id, item.query_text);

                let response = self
                    .pipeline
                    .process_query(&item.user_id, &item.query_text)
                    .await?;
                item.complete(response);

                let table = self.table.clone();
                let query_id = item.query_id.clone();
                tokio::task::spawn_blocking(move || table.put_item(&item))
                    .await
                    .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

                tracing::info!("Item is updated: {}", query_id);
            }
            WorkerTask::Ingest { user_id, reset } => {
                self.pipeline.ingest(&user_id, reset).await?;
            }
        }
        Ok(())
    }
}
