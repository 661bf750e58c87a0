//! Job Queue and Worker Pool
//!
//! An in-process stand-in for the external task broker. Delivery is
//! at-least-once from the executor's point of view: a message may be
//! re-enqueued (retry) or re-delivered, and the status guards on the storage
//! layer make duplicate terminal commits no-ops.
//!
//! Retries are scheduled through `enqueue_after`, which re-sends the message
//! from a timer thread; the worker that hit the failure moves on to other
//! jobs instead of sleeping.
//!
//! Workers are dedicated OS threads, each driving a current-thread Tokio
//! runtime. `block_on` is the synchronous facade over the async generation
//! contract: a worker blocks until its job completes and runs nothing else
//! meanwhile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::models::job::JobMessage;
use crate::services::jobs::executor::{JobExecutor, JobOutcome};
use crate::utils::error::{AppError, AppResult};

/// How long a worker waits on the queue before re-checking shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// In-process job queue with delayed re-enqueue.
pub struct JobQueue {
    sender: Sender<JobMessage>,
    receiver: Mutex<Receiver<JobMessage>>,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Enqueue a job for immediate delivery.
    pub fn enqueue(&self, job: JobMessage) -> AppResult<()> {
        debug!(job = %job.describe(), "Enqueuing job");
        self.sender
            .send(job)
            .map_err(|_| AppError::internal("Job queue is closed"))
    }

    /// Enqueue a job after a delay, from a timer thread.
    ///
    /// The sending side may be gone by the time the timer fires (engine
    /// shut down); the message is dropped with a log line in that case.
    pub fn enqueue_after(&self, job: JobMessage, delay: Duration) {
        let sender = self.sender.clone();
        debug!(job = %job.describe(), delay_ms = delay.as_millis() as u64, "Scheduling delayed enqueue");
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if sender.send(job).is_err() {
                warn!("Dropped delayed job: queue closed before the timer fired");
            }
        });
    }

    /// Test hook: pop the next message if one arrives within `timeout`.
    #[cfg(test)]
    pub(crate) fn take_for_test(&self, timeout: Duration) -> Option<JobMessage> {
        self.next(timeout).ok()
    }

    /// Blocking receive with a timeout, for worker loops.
    fn next(&self, timeout: Duration) -> Result<JobMessage, RecvTimeoutError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        receiver.recv_timeout(timeout)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool of dedicated worker threads draining the queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Start `workers` threads pulling from `queue` and executing via
    /// `executor`. Retry outcomes are re-enqueued with the incremented
    /// attempt counter.
    pub fn start(workers: usize, queue: Arc<JobQueue>, executor: Arc<JobExecutor>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handles = (0..workers)
            .filter_map(|worker_id| {
                let queue = Arc::clone(&queue);
                let executor = Arc::clone(&executor);
                let shutdown = Arc::clone(&shutdown);
                std::thread::Builder::new()
                    .name(format!("job-worker-{}", worker_id))
                    .spawn(move || worker_loop(worker_id, queue, executor, shutdown))
                    .map_err(|e| error!(worker_id, "Failed to spawn job worker: {}", e))
                    .ok()
            })
            .collect();

        info!(workers, "Job worker pool started");
        Self { handles, shutdown }
    }

    /// Signal every worker to stop after its current job and join them.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles {
            if handle.join().is_err() {
                error!("Job worker panicked during shutdown");
            }
        }
        info!("Job worker pool stopped");
    }
}

fn worker_loop(
    worker_id: usize,
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    shutdown: Arc<AtomicBool>,
) {
    // One runtime per worker: generation calls block this thread and no
    // other job work shares it.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(worker_id, "Failed to build worker runtime: {}", e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let job = match queue.next(POLL_INTERVAL) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        debug!(worker_id, job = %job.describe(), "Worker picked up job");
        let outcome = runtime.block_on(executor.execute(&job));

        if let JobOutcome::Retry { delay } = outcome {
            queue.enqueue_after(job.next_attempt(), delay);
        }
    }

    debug!(worker_id, "Worker exiting");
}
