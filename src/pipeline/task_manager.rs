//! Worker pool and task manager
//!
//! A fixed number of worker tasks pull jobs from one shared FIFO queue. Each
//! job is received by exactly one worker, which owns it until it reaches a
//! terminal state and then sends back its record. Records are collected in
//! submission order, independent of completion order.
//!
//! Two cancellation signals exist:
//! - `cancel` is observed at stage boundaries and during retry backoff
//! - `abort` additionally interrupts the stage in flight; it fires only when
//!   the batch timeout passes

use crate::config::Config;
use crate::output::{aggregate, BatchResult, JobRecord};
use crate::pipeline::job::{Job, JobId};
use crate::pipeline::orchestrator::Pipeline;
use crate::pipeline::result::{ErrorInfo, ErrorKind, PipelineResult};
use crate::state::JobState;
use crate::url::normalize_url;
use crate::{PipelineError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A job waiting in the queue together with the channel for its record
struct QueuedJob {
    job: Job,
    reply: oneshot::Sender<JobRecord>,
}

/// A submitted job whose record has not been collected yet
struct Submitted {
    id: JobId,
    url: String,
    record: oneshot::Receiver<JobRecord>,
}

/// Caller's handle on a submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    url: String,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The normalized URL of the job
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cancels this job at its next stage boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Bounded pool of workers executing pipeline jobs
pub struct TaskManager {
    config: Arc<Config>,
    sender: Option<mpsc::UnboundedSender<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
    submitted: Vec<Submitted>,
    cancel: CancellationToken,
    abort: CancellationToken,
    started_at: DateTime<Utc>,
    next_id: u64,
}

impl TaskManager {
    /// Starts the worker pool
    ///
    /// The number of workers comes from `pipeline.max-workers`, defaulting to
    /// the available parallelism. Must be called inside a tokio runtime.
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let worker_count = pipeline.config().pipeline.worker_count().max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&pipeline),
                    Arc::clone(&queue),
                ))
            })
            .collect();

        tracing::debug!("Started {} workers", worker_count);

        Self {
            config: Arc::clone(pipeline.config()),
            sender: Some(sender),
            workers,
            submitted: Vec::new(),
            cancel: CancellationToken::new(),
            abort: CancellationToken::new(),
            started_at: Utc::now(),
            next_id: 0,
        }
    }

    /// Queues a job for `url`
    ///
    /// # Errors
    ///
    /// * `PipelineError::InvalidUrl` - the URL is malformed; nothing is queued
    /// * `PipelineError::Closed` - the workers are gone
    pub fn submit(&mut self, url: &str) -> Result<JobHandle> {
        let url = normalize_url(url)?;
        let sender = self.sender.as_ref().ok_or(PipelineError::Closed)?;

        let id = JobId(self.next_id);
        let cancel = self.cancel.child_token();
        let job = Job::with_tokens(
            id,
            url.clone(),
            Arc::clone(&self.config),
            cancel.clone(),
            self.abort.clone(),
        );
        let (reply, record) = oneshot::channel();

        sender
            .send(QueuedJob { job, reply })
            .map_err(|_| PipelineError::Closed)?;
        self.next_id += 1;

        tracing::trace!("Queued {} for {}", id, url);
        self.submitted.push(Submitted {
            id,
            url: url.to_string(),
            record,
        });

        Ok(JobHandle {
            id,
            url: url.to_string(),
            cancel,
        })
    }

    /// Signals every job to stop at its next stage boundary
    ///
    /// Jobs still in the queue end up `Cancelled` without running.
    pub fn cancel_all(&self) {
        tracing::info!("Cancelling all jobs");
        self.cancel.cancel();
    }

    /// Token that triggers [`cancel_all`](Self::cancel_all) when cancelled
    ///
    /// Lets another task cancel the batch while `wait_all` is running.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of jobs submitted so far
    pub fn len(&self) -> usize {
        self.submitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }

    /// Waits for every submitted job and aggregates the batch
    ///
    /// If `timeout` passes first, all jobs are cancelled: jobs that never
    /// started become `Cancelled`, jobs caught mid-stage become `Failed`
    /// with a timeout error.
    pub async fn wait_all(mut self, timeout: Option<Duration>) -> BatchResult {
        // Closing the queue lets workers exit once it is drained
        self.sender.take();

        let workers = std::mem::take(&mut self.workers);
        let drain = join_workers(workers);
        tokio::pin!(drain);

        if let Some(limit) = timeout {
            if tokio::time::timeout(limit, &mut drain).await.is_err() {
                tracing::warn!("Batch timeout of {:?} exceeded, cancelling remaining jobs", limit);
                self.cancel.cancel();
                self.abort.cancel();
                drain.await;
            }
        } else {
            drain.await;
        }

        let mut records = Vec::with_capacity(self.submitted.len());
        for submitted in std::mem::take(&mut self.submitted) {
            let record = match submitted.record.await {
                Ok(record) => record,
                Err(_) => lost_record(submitted.id, submitted.url),
            };
            records.push(record);
        }

        aggregate(records, self.started_at, Utc::now())
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        // Dropped without wait_all: stop the workers promptly
        if !self.workers.is_empty() {
            self.cancel.cancel();
            self.abort.cancel();
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    pipeline: Arc<Pipeline>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
) {
    loop {
        let next = { queue.lock().await.recv().await };
        let Some(QueuedJob { mut job, reply }) = next else {
            break;
        };

        tracing::debug!("Worker {} picked up {} ({})", worker_id, job.id, job.url);

        // The job deadline starts when a worker picks the job up
        let deadline = job
            .config
            .pipeline
            .job_timeout()
            .map(|timeout| Instant::now() + timeout);
        pipeline.execute(&mut job, deadline).await;

        // The receiver is gone only if the manager was dropped
        let _ = reply.send(job.into_record());
    }

    tracing::trace!("Worker {} exiting", worker_id);
}

async fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("Worker task failed: {}", e);
        }
    }
}

/// Record for a job whose worker died before reporting it
fn lost_record(id: JobId, url: String) -> JobRecord {
    JobRecord {
        id,
        result: PipelineResult::new(url.clone()),
        url,
        state: JobState::Failed,
        attempts: 0,
        error: Some(ErrorInfo::new(
            ErrorKind::Internal,
            None,
            "Worker stopped before the job finished",
        )),
    }
}
