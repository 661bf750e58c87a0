//! Engine State
//!
//! Composition root wiring configuration, storage, providers, services and
//! the job worker pool. The generation and embedding contracts are injected
//! as trait objects so adapters and tests choose the implementation.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::models::settings::AppConfig;
use crate::services::chat::ChatService;
use crate::services::jobs::{JobExecutor, JobQueue, WorkerPool};
use crate::services::letter::LetterService;
use crate::services::llm::LlmProvider;
use crate::services::memory::{EmbeddingProvider, VectorMemoryStore};
use crate::services::report::ReportService;
use crate::storage::{Database, FieldCipher};
use crate::utils::error::{AppError, AppResult};

/// The assembled engine.
pub struct AppState {
    config: AppConfig,
    database: Database,
    memory: VectorMemoryStore,
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    letters: LetterService,
    chat: ChatService,
    reports: ReportService,
    workers: Mutex<Option<WorkerPool>>,
}

impl AppState {
    /// Build the engine from configuration and injected providers.
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        config.validate().map_err(AppError::config)?;

        let cipher = FieldCipher::from_hex_key(&config.encryption_key)?;
        let database = if config.database_path == ":memory:" {
            Database::new_in_memory(cipher)?
        } else {
            Database::open(&config.database_path, cipher)?
        };

        let memory = VectorMemoryStore::new(database.clone(), embedder);
        let queue = Arc::new(JobQueue::new());
        let executor = Arc::new(JobExecutor::new(
            database.clone(),
            Arc::clone(&llm),
            memory.clone(),
            config.retry,
        ));

        let letters = LetterService::new(database.clone(), memory.clone(), Arc::clone(&queue));
        let chat = ChatService::new(
            database.clone(),
            Arc::clone(&llm),
            memory.clone(),
            config.max_user_turns,
        );
        let reports = ReportService::new(database.clone(), Arc::clone(&queue));

        info!(database = %config.database_path, "Engine state assembled");

        Ok(Self {
            config,
            database,
            memory,
            queue,
            executor,
            letters,
            chat,
            reports,
            workers: Mutex::new(None),
        })
    }

    /// Start the configured number of job workers. Idempotent.
    pub fn start_workers(&self) {
        let mut workers = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if workers.is_none() {
            *workers = Some(WorkerPool::start(
                self.config.workers,
                Arc::clone(&self.queue),
                Arc::clone(&self.executor),
            ));
        }
    }

    /// Stop the worker pool, letting in-flight jobs finish.
    pub fn shutdown(&self) {
        let pool = {
            let mut workers = self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            workers.take()
        };
        if let Some(pool) = pool {
            pool.shutdown();
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The storage layer.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The vector memory store.
    pub fn memory(&self) -> &VectorMemoryStore {
        &self.memory
    }

    /// The job queue.
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// The job executor (for adapters driving jobs without the pool).
    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }

    /// Letter intake and reading.
    pub fn letters(&self) -> &LetterService {
        &self.letters
    }

    /// Turn-limited conversations.
    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    /// Report triggering and reading.
    pub fn reports(&self) -> &ReportService {
        &self.reports
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.shutdown();
    }
}
