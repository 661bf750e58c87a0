//! Generation Jobs
//!
//! The asynchronous half of the engine: an in-process queue with delayed
//! re-enqueue, a worker pool bridging sync worker threads onto the async
//! generation contract, and the retry-with-backoff executor that drives the
//! letter and report jobs.

pub mod executor;
pub mod process_letter;
pub mod process_report;
pub mod queue;

pub use executor::{JobExecutor, JobOutcome};
pub use queue::{JobQueue, WorkerPool};
