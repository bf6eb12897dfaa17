use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn, instrument};

use crate::{
    JobsResult, JobsError, Job, JobId, JobEvent, RegistryConfig,
    control::ControlContext,
    execution::JobExecutor,
    listener::{JobListener, ListenerSet},
    observability::{LiveMetrics, ObservabilityLayer},
    types::IdAllocator,
};

static GLOBAL: OnceCell<JobRegistry> = OnceCell::new();

struct Shared {
    config: RegistryConfig,
    ids: IdAllocator,
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
    listeners: Mutex<HashMap<JobId, ListenerSet>>,
    control: ControlContext,
    executor: JobExecutor,
    observability: ObservabilityLayer,
}

/// Tracks posted jobs and tells listeners when they complete.
///
/// A cheap handle: clones share the same tables, workers and control
/// context. Use [`JobRegistry::global`] for the process-wide instance or
/// [`JobRegistry::new`] for an independent one.
///
/// The job table and the listener table sit behind separate locks. Only
/// [`remove`](Self::remove) takes both, always jobs first. No lock is held
/// while dispatching to workers or while listeners run.
#[derive(Clone)]
pub struct JobRegistry {
    shared: Arc<Shared>,
}

impl JobRegistry {
    /// Create a registry with its own worker pool and control thread
    pub fn new(config: RegistryConfig) -> JobsResult<Self> {
        config.validate()?;
        let control = ControlContext::spawn(config.control_thread_name.clone())?;
        Self::with_control(config, control)
    }

    /// Create a registry delivering completions on an existing control context.
    ///
    /// Pair with [`ControlContext::attached`] to make a thread you own the
    /// control thread.
    pub fn with_control(config: RegistryConfig, control: ControlContext) -> JobsResult<Self> {
        config.validate()?;
        let observability = ObservabilityLayer::new(config.event_capacity);
        let executor = JobExecutor::new(&config, observability.clone())?;

        let registry = Self {
            shared: Arc::new(Shared {
                ids: IdAllocator::new(config.max_job_id),
                config,
                jobs: RwLock::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                control,
                executor,
                observability,
            }),
        };
        registry.shared.executor.start(registry.downgrade());

        Ok(registry)
    }

    /// The process-wide registry, created from [`RegistryConfig::from_env`]
    /// on first use.
    pub fn global() -> JobsResult<&'static JobRegistry> {
        GLOBAL.get_or_try_init(|| Self::new(RegistryConfig::from_env()))
    }

    /// Create the process-wide registry with `config`.
    ///
    /// Fails with [`JobsError::AlreadyInitialized`] if it already exists,
    /// whoever created it.
    pub fn init(config: RegistryConfig) -> JobsResult<&'static JobRegistry> {
        let mut created = false;
        let registry = GLOBAL.get_or_try_init(|| {
            created = true;
            Self::new(config)
        })?;

        if created {
            Ok(registry)
        } else {
            Err(JobsError::AlreadyInitialized)
        }
    }

    /// Register `job` and hand it to the workers.
    ///
    /// Assigns the job its id and returns it; the work starts later on a
    /// worker. Posting a job that is already registered returns its current id
    /// and changes nothing.
    #[instrument(skip(self, job))]
    pub fn post(&self, job: impl Into<Arc<Job>>) -> JobId {
        let job = job.into();

        let job_id = {
            let mut jobs = self.shared.jobs.write();

            let current = job.id();
            if current.is_valid() && jobs.get(&current).is_some_and(|live| Arc::ptr_eq(live, &job)) {
                warn!("Job {} ({}) is already posted", current, job.name());
                return current;
            }

            let job_id = self.shared.ids.allocate();
            job.assign_id(job_id);
            if jobs.insert(job_id, job.clone()).is_some() {
                warn!("Job id {} reused while still live, the older job is no longer reachable", job_id);
            }
            job_id
        };

        self.shared.observability.record_job_posted(&job);
        info!("Posted job {} ({})", job_id, job.name());

        if let Err(e) = self.shared.executor.dispatch(job_id) {
            error!("Failed to dispatch job {}: {}", job_id, e);
        }

        job_id
    }

    /// The live job for `id`, or `None` if unknown or removed
    pub fn get(&self, id: JobId) -> Option<Arc<Job>> {
        self.shared.jobs.read().get(&id).cloned()
    }

    /// Drop the job and all its listeners. Safe to call more than once.
    ///
    /// Listeners subscribed to `id` are dropped even if no job is registered
    /// under it.
    pub fn remove(&self, id: JobId) -> Option<Arc<Job>> {
        let removed = {
            let mut jobs = self.shared.jobs.write();
            let removed = jobs.remove(&id);
            self.shared.listeners.lock().remove(&id);
            removed
        };

        if removed.is_some() {
            self.shared.observability.record_job_removed(id);
            info!("Removed job {}", id);
        }
        removed
    }

    /// Subscribe `listener` to the completion of job `id`.
    ///
    /// Returns `false` if the same instance was already subscribed.
    pub fn add_listener(&self, id: JobId, listener: Arc<dyn JobListener>) -> bool {
        let added = self
            .shared
            .listeners
            .lock()
            .entry(id)
            .or_default()
            .insert(listener);

        debug!("Listener {} for job {}", if added { "added" } else { "already present" }, id);
        added
    }

    /// Unsubscribe `listener` from job `id`; no-op if either is unknown.
    ///
    /// The entry for `id` goes away with its last listener.
    pub fn remove_listener<L: JobListener + ?Sized>(&self, id: JobId, listener: &Arc<L>) -> bool {
        let mut listeners = self.shared.listeners.lock();
        let Some(set) = listeners.get_mut(&id) else {
            return false;
        };

        let removed = set.remove(listener);
        if set.is_empty() {
            listeners.remove(&id);
        }
        drop(listeners);

        if removed {
            debug!("Listener removed for job {}", id);
        }
        removed
    }

    /// Number of listeners subscribed to job `id`
    pub fn listener_count(&self, id: JobId) -> usize {
        self.shared.listeners.lock().get(&id).map_or(0, ListenerSet::len)
    }

    /// Number of job ids with at least one listener
    pub fn listened_job_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }

    /// Schedule completion delivery for `job` on the control context.
    ///
    /// Listeners are captured now, in subscription order. One subscribed
    /// before this call is always told; one removed after it may still be.
    pub fn notify_completed(&self, job: &Arc<Job>) {
        let job_id = job.id();
        let listeners = match self.shared.listeners.lock().get(&job_id) {
            Some(set) if !set.is_empty() => set.snapshot(),
            _ => {
                debug!("No listeners for job {}", job_id);
                return;
            }
        };

        self.shared.observability.metrics().increment_notifications_scheduled();

        let registry = self.clone();
        let job = job.clone();
        let posted = self.shared.control.post(move || registry.deliver(&job, &listeners));

        if let Err(e) = posted {
            warn!("Completion of job {} not delivered: {}", job_id, e);
        }
    }

    // Runs on the control context
    fn deliver(&self, job: &Arc<Job>, listeners: &[Arc<dyn JobListener>]) {
        let metrics = self.shared.observability.metrics();

        for listener in listeners {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener.on_job_completed(self, job)));
            match result {
                Ok(()) => metrics.increment_notifications_delivered(),
                Err(_) => {
                    metrics.increment_listener_panics();
                    error!("Listener panicked while handling completion of job {}", job.id());
                }
            }
        }
    }

    /// The control context completions are delivered on
    pub fn control(&self) -> &ControlContext {
        &self.shared.control
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.shared.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Job events emitted from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.observability.subscribe()
    }

    pub fn observability(&self) -> &ObservabilityLayer {
        &self.shared.observability
    }

    pub fn metrics(&self) -> &LiveMetrics {
        self.shared.observability.metrics()
    }

    pub fn executor(&self) -> &JobExecutor {
        &self.shared.executor
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    pub(crate) fn downgrade(&self) -> WeakJobRegistry {
        WeakJobRegistry(Arc::downgrade(&self.shared))
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.len())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

/// Non-owning registry handle held by the workers
#[derive(Clone)]
pub(crate) struct WeakJobRegistry(Weak<Shared>);

impl WeakJobRegistry {
    pub(crate) fn upgrade(&self) -> Option<JobRegistry> {
        self.0.upgrade().map(|shared| JobRegistry { shared })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;
    use crate::{ControlLoop, listener_fn, work_fn};

    fn attached_registry() -> (JobRegistry, ControlLoop) {
        let (control, control_loop) = ControlContext::attached();
        let registry = JobRegistry::with_control(RegistryConfig::default(), control).unwrap();
        (registry, control_loop)
    }

    // Job whose work waits until the returned sender fires
    fn gated_job(name: &str) -> (Job, tokio::sync::oneshot::Sender<()>) {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let job = Job::new(name, work_fn(move || async move {
            let _ = rx.await;
            Ok(())
        }));
        (job, tx)
    }

    fn wait_completed(job: &Job) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !job.is_completed() {
            assert!(std::time::Instant::now() < deadline, "job {} never completed", job.id());
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn pump_until(control_loop: &mut ControlLoop, mut done: impl FnMut() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(std::time::Instant::now() < deadline, "condition not reached");
            control_loop.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_post_assigns_sequential_ids() {
        let (registry, _control_loop) = attached_registry();
        let (first, _gate1) = gated_job("first");
        let (second, _gate2) = gated_job("second");

        assert_eq!(registry.post(first), JobId(0));
        assert_eq!(registry.post(second), JobId(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(JobId(1)).unwrap().name(), "second");
    }

    #[test]
    fn test_get_returns_shared_instance() {
        let (registry, _control_loop) = attached_registry();
        let (job, _gate) = gated_job("shared");
        let job = Arc::new(job);

        let id = registry.post(job.clone());
        assert!(Arc::ptr_eq(&registry.get(id).unwrap(), &job));
        assert_eq!(job.id(), id);
    }

    #[test]
    fn test_reposting_live_job_is_noop() {
        let (registry, _control_loop) = attached_registry();
        let (job, _gate) = gated_job("twice");
        let job = Arc::new(job);

        let id = registry.post(job.clone());
        assert_eq!(registry.post(job.clone()), id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_clears_listeners() {
        let (registry, _control_loop) = attached_registry();
        let (job, _gate) = gated_job("removable");
        let id = registry.post(job);

        registry.add_listener(id, listener_fn(|_, _| {}));
        assert_eq!(registry.listener_count(id), 1);

        assert!(registry.remove(id).is_some());
        assert_eq!(registry.listener_count(id), 0);
        assert!(registry.remove(id).is_none());
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_listener_ops_on_unknown_id() {
        let (registry, _control_loop) = attached_registry();
        let listener = listener_fn(|_, _| {});

        assert!(!registry.remove_listener(JobId(42), &listener));
        // Entries are created lazily, even before the job exists
        assert!(registry.add_listener(JobId(42), listener.clone()));
        assert!(!registry.add_listener(JobId(42), listener.clone()));
        assert!(registry.remove_listener(JobId(42), &listener));
    }

    #[test]
    fn test_listener_entries_do_not_accumulate() {
        let (registry, _control_loop) = attached_registry();
        let (job, _gate) = gated_job("tidy");
        let id = registry.post(job);
        let first = listener_fn(|_, _| {});
        let second = listener_fn(|_, _| {});

        registry.add_listener(id, first.clone());
        registry.add_listener(id, second.clone());
        assert!(registry.remove_listener(id, &first));
        assert_eq!(registry.listened_job_count(), 1);
        assert!(registry.remove_listener(id, &second));
        assert_eq!(registry.listened_job_count(), 0);

        // Subscribed to an id nobody posted, then cleaned up by remove
        registry.add_listener(JobId(500), first.clone());
        assert_eq!(registry.listened_job_count(), 1);
        assert!(registry.remove(JobId(500)).is_none());
        assert_eq!(registry.listened_job_count(), 0);
        assert_eq!(registry.listener_count(JobId(500)), 0);
    }

    #[traced_test]
    #[test]
    fn test_id_collision_replaces_older_job() {
        let (control, _control_loop) = ControlContext::attached();
        let config = RegistryConfig::default().with_max_job_id(1);
        let registry = JobRegistry::with_control(config, control).unwrap();
        let (older, _gate1) = gated_job("older");
        let (newer, _gate2) = gated_job("newer");

        assert_eq!(registry.post(older), JobId(0));
        assert_eq!(registry.post(newer), JobId(0));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(JobId(0)).unwrap().name(), "newer");
        assert!(logs_contain("reused while still live"));
    }

    #[test]
    fn test_dropped_registry_releases_jobs() {
        let (control, control_loop) = ControlContext::attached();
        let registry = JobRegistry::with_control(RegistryConfig::default(), control).unwrap();
        let weak = registry.downgrade();

        // Completed with a delivery still queued on the control context
        let finished = Arc::new(Job::new("finished", work_fn(|| async { Ok(()) })));
        let finished_id = registry.post(finished.clone());
        registry.add_listener(finished_id, listener_fn(|_, _| {}));
        wait_completed(&finished);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while registry.metrics().snapshot().notifications_scheduled == 0 {
            assert!(std::time::Instant::now() < deadline, "delivery never scheduled");
            std::thread::sleep(Duration::from_millis(5));
        }

        // Still running when the registry goes away
        let (pending, _gate) = gated_job("pending");
        let pending = Arc::new(pending);
        registry.post(pending.clone());

        // The queued delivery holds the registry until the control loop goes
        drop(registry);
        assert!(weak.upgrade().is_some());
        drop(control_loop);

        // Workers only hold the registry for a moment
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while weak.upgrade().is_some() {
            assert!(std::time::Instant::now() < deadline, "registry outlived its handles");
            std::thread::sleep(Duration::from_millis(5));
        }
        while Arc::strong_count(&finished) > 1 || Arc::strong_count(&pending) > 1 {
            assert!(std::time::Instant::now() < deadline, "jobs still referenced after shutdown");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!pending.is_completed());
    }

    #[test]
    fn test_delivery_runs_on_control_thread() {
        let (registry, mut control_loop) = attached_registry();
        let (job, gate) = gated_job("control");
        let id = registry.post(job);

        let on_control = Arc::new(AtomicUsize::new(0));
        let counter = on_control.clone();
        registry.add_listener(id, listener_fn(move |registry, _| {
            if registry.control().is_current() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        // Claim this thread as the control thread before anything is queued
        control_loop.pump();
        gate.send(()).unwrap();
        wait_completed(&registry.get(id).unwrap());

        // Nothing runs until the control loop is pumped
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(on_control.load(Ordering::SeqCst), 0);

        pump_until(&mut control_loop, || on_control.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let (registry, mut control_loop) = attached_registry();
        let (job, gate) = gated_job("isolated");
        let id = registry.post(job);

        let delivered = Arc::new(AtomicUsize::new(0));
        registry.add_listener(id, listener_fn(|_, _| panic!("listener bug")));
        let counter = delivered.clone();
        registry.add_listener(id, listener_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        gate.send(()).unwrap();
        pump_until(&mut control_loop, || delivered.load(Ordering::SeqCst) == 1);
        assert_eq!(registry.metrics().listener_panics(), 1);
    }

    #[test]
    fn test_snapshot_taken_at_scheduling() {
        let (registry, mut control_loop) = attached_registry();
        let job = Arc::new(Job::delayed("snapshot", Duration::ZERO));
        job.assign_id(JobId(9));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let early = listener_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry.add_listener(JobId(9), early.clone());

        registry.notify_completed(&job);

        // Removed after scheduling: still delivered
        registry.remove_listener(JobId(9), &early);
        // Added after scheduling: not part of this delivery
        let late_calls = Arc::new(AtomicUsize::new(0));
        let late_counter = late_calls.clone();
        registry.add_listener(JobId(9), listener_fn(move |_, _| {
            late_counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(control_loop.pump(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_notify_without_listeners_schedules_nothing() {
        let (registry, mut control_loop) = attached_registry();
        let job = Arc::new(Job::delayed("lonely", Duration::ZERO));
        job.assign_id(JobId(3));

        registry.notify_completed(&job);
        assert_eq!(control_loop.pump(), 0);
        assert_eq!(registry.metrics().snapshot().notifications_scheduled, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RegistryConfig::default().with_max_concurrency(0);
        assert!(matches!(JobRegistry::new(config), Err(JobsError::InvalidConfig(_))));
    }

    #[test]
    fn test_global_is_initialized_once() {
        let first = JobRegistry::global().unwrap();
        let second = JobRegistry::global().unwrap();
        assert!(Arc::ptr_eq(&first.shared, &second.shared));

        assert_eq!(
            JobRegistry::init(RegistryConfig::default()).unwrap_err(),
            JobsError::AlreadyInitialized
        );
    }
}
