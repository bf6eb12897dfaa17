use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn, instrument};

use crate::{
    JobsResult, JobsError, JobId, JobOutcome, RegistryConfig, WorkError,
    observability::ObservabilityLayer,
    registry::WeakJobRegistry,
};

/// Worker pool that runs posted jobs.
///
/// Receives bare job ids from the registry and resolves each one back to its
/// job before running it, so a job removed before a worker got to it is
/// skipped. Owns its own runtime, which lets `post` be called from any thread.
pub struct JobExecutor {
    runtime: Option<Runtime>,
    dispatch_tx: mpsc::UnboundedSender<JobId>,
    dispatch_rx: Mutex<Option<mpsc::UnboundedReceiver<JobId>>>,
    semaphore: Arc<Semaphore>,
    active_jobs: Arc<AtomicUsize>,
    observability: ObservabilityLayer,
}

impl JobExecutor {
    /// Build the worker runtime. Nothing runs until [`JobExecutor::start`].
    pub(crate) fn new(config: &RegistryConfig, observability: ObservabilityLayer) -> JobsResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("dog-jobs-worker")
            .enable_all()
            .build()
            .map_err(|e| JobsError::Runtime(e.to_string()))?;

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        Ok(Self {
            runtime: Some(runtime),
            dispatch_tx,
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            active_jobs: Arc::new(AtomicUsize::new(0)),
            observability,
        })
    }

    /// Start the dispatch loop. Later calls are no-ops.
    pub(crate) fn start(&self, registry: WeakJobRegistry) {
        let (Some(runtime), Some(mut dispatch_rx)) = (self.runtime.as_ref(), self.dispatch_rx.lock().take()) else {
            return;
        };

        let worker = Worker {
            registry,
            semaphore: self.semaphore.clone(),
            active_jobs: self.active_jobs.clone(),
            observability: self.observability.clone(),
        };

        runtime.spawn(async move {
            debug!("Executor dispatch loop started");
            while let Some(job_id) = dispatch_rx.recv().await {
                let worker = worker.clone();
                tokio::spawn(async move { worker.run(job_id).await });
            }
            debug!("Executor dispatch loop stopped");
        });
    }

    /// Hand `job_id` to the workers. Returns without waiting for the job.
    pub fn dispatch(&self, job_id: JobId) -> JobsResult<()> {
        self.dispatch_tx
            .send(job_id)
            .map_err(|_| JobsError::ExecutorShutdown)
    }

    /// Number of jobs currently running
    pub fn active_job_count(&self) -> usize {
        self.active_jobs.load(Ordering::Acquire)
    }

    /// Get available execution slots
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Drop for JobExecutor {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which is not allowed inside async code
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[derive(Clone)]
struct Worker {
    registry: WeakJobRegistry,
    semaphore: Arc<Semaphore>,
    active_jobs: Arc<AtomicUsize>,
    observability: ObservabilityLayer,
}

impl Worker {
    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn run(&self, job_id: JobId) {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return;
        };

        // Only hold the registry while resolving, not while the work runs
        let Some(job) = self.registry.upgrade().and_then(|registry| registry.get(job_id)) else {
            debug!("Job {} is gone, skipping", job_id);
            return;
        };
        let Some(work) = job.take_work() else {
            debug!("Job {} was already executed, skipping", job_id);
            return;
        };

        self.active_jobs.fetch_add(1, Ordering::AcqRel);
        self.observability.record_job_started(job_id);
        let start_time = Instant::now();

        // Own task so a panicking work unit surfaces as a JoinError here
        let result = match tokio::spawn(work.run()).await {
            Ok(result) => result,
            Err(join_error) => Err(WorkError::from(join_error)),
        };

        if let Err(e) = &result {
            warn!("Job {} ({}) work failed: {}", job_id, job.name(), e);
        }

        let outcome = JobOutcome::from(result);
        job.complete(outcome.clone());
        self.active_jobs.fetch_sub(1, Ordering::AcqRel);
        self.observability.record_job_completed(job_id, &outcome);

        info!(
            "Job {} ({}) completed in {:?}: {}",
            job_id,
            job.name(),
            start_time.elapsed(),
            outcome.as_str()
        );

        match self.registry.upgrade() {
            Some(registry) => registry.notify_completed(&job),
            None => debug!("Registry dropped before job {} completed", job_id),
        }
    }
}
