//! Binding a job to an owner that comes and goes.
//!
//! A view posts a job, keeps only its id across its own suspend/resume cycle,
//! listens while active and consumes the job once it has seen completion.
//! [`JobBinding`] packages that pattern.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::{Job, JobId, JobListener, JobRegistry};

/// Forwards to the owner's listener at most once
struct OnceListener {
    inner: Arc<dyn JobListener>,
    delivered: AtomicBool,
}

impl JobListener for OnceListener {
    fn on_job_completed(&self, registry: &JobRegistry, job: &Arc<Job>) {
        if !self.delivered.swap(true, Ordering::AcqRel) {
            self.inner.on_job_completed(registry, job);
        }
    }
}

/// One owner's view of one job
pub struct JobBinding {
    registry: JobRegistry,
    job: Arc<Job>,
    listener: Arc<OnceListener>,
    active: bool,
}

impl JobBinding {
    /// Rebind to the job saved as `saved`, or post a fresh one from `make_job`.
    ///
    /// `saved` is typically the id the owner persisted before it was torn
    /// down. If that job has been removed in the meantime a new job is posted.
    pub fn restore_or_post<F>(
        registry: &JobRegistry,
        saved: Option<JobId>,
        listener: Arc<dyn JobListener>,
        make_job: F,
    ) -> Self
    where
        F: FnOnce() -> Job,
    {
        let job = match saved.and_then(|id| registry.get(id)) {
            Some(job) => {
                debug!("Restored binding to job {}", job.id());
                job
            }
            None => {
                let job = Arc::new(make_job());
                registry.post(job.clone());
                job
            }
        };

        Self {
            registry: registry.clone(),
            job,
            listener: Arc::new(OnceListener {
                inner: listener,
                delivered: AtomicBool::new(false),
            }),
            active: false,
        }
    }

    /// Id to persist across the owner's suspend/resume cycle
    pub fn id(&self) -> JobId {
        self.job.id()
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start listening.
    ///
    /// If the job completed while nobody was listening, delivery is queued on
    /// the control context right away (or made inline when already on it).
    /// The owner's listener hears about the job once, however activation and
    /// the live notification interleave.
    ///
    /// Once the job has been removed from the registry its id may belong to
    /// another job, so nothing is subscribed; a completion the job already
    /// has is still replayed.
    pub fn activate(&mut self) {
        if self.active {
            return;
        }
        self.active = true;

        let job_id = self.job.id();
        if self.is_registered() {
            self.registry.add_listener(job_id, self.listener.clone());
        } else {
            debug!("Job {} ({}) is no longer registered, not subscribing", job_id, self.job.name());
        }

        if !self.job.is_completed() {
            return;
        }

        let control = self.registry.control();
        if control.is_current() {
            self.listener.on_job_completed(&self.registry, &self.job);
            return;
        }

        let registry = self.registry.clone();
        let job = self.job.clone();
        let listener = self.listener.clone();
        if control.post(move || listener.on_job_completed(&registry, &job)).is_err() {
            debug!("Control context closed, missed completion of job {} not replayed", self.job.id());
        }
    }

    /// Stop listening; a completion arriving meanwhile is picked up by the
    /// next [`activate`](Self::activate)
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.registry.remove_listener(self.job.id(), &self.listener);
    }

    // The registry still maps our id to this very job
    fn is_registered(&self) -> bool {
        self.registry
            .get(self.job.id())
            .is_some_and(|live| Arc::ptr_eq(&live, &self.job))
    }

    /// Stop listening and remove the job from the registry
    pub fn consume(mut self) -> Option<Arc<Job>> {
        self.deactivate();
        self.registry.remove(self.job.id())
    }
}

impl Drop for JobBinding {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl std::fmt::Debug for JobBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobBinding")
            .field("job", &self.job)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use crate::{ControlContext, ControlLoop, RegistryConfig, listener_fn, work_fn};

    fn attached_registry() -> (JobRegistry, ControlLoop) {
        let (control, control_loop) = ControlContext::attached();
        let registry = JobRegistry::with_control(RegistryConfig::default(), control).unwrap();
        (registry, control_loop)
    }

    fn counting_listener() -> (Arc<dyn JobListener>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = listener_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (listener, calls)
    }

    fn wait_completed(job: &Job) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !job.is_completed() {
            assert!(std::time::Instant::now() < deadline, "job never completed");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_restore_rebinds_to_live_job() {
        let (registry, _control_loop) = attached_registry();
        let (listener, _) = counting_listener();

        let first = JobBinding::restore_or_post(&registry, None, listener.clone(), || {
            Job::delayed("Tell Android Hi!", Duration::from_secs(60))
        });
        let saved = first.id();
        drop(first);

        let restored = JobBinding::restore_or_post(&registry, Some(saved), listener, || {
            panic!("must not post again")
        });
        assert_eq!(restored.id(), saved);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_restore_after_removal_posts_new_job() {
        let (registry, _control_loop) = attached_registry();
        let (listener, _) = counting_listener();

        let binding = JobBinding::restore_or_post(&registry, Some(JobId(77)), listener, || {
            Job::delayed("fresh", Duration::from_secs(60))
        });
        assert_eq!(binding.id(), JobId(0));
        assert_eq!(binding.job().name(), "fresh");
    }

    #[test]
    fn test_missed_completion_delivered_on_activate() {
        let (registry, mut control_loop) = attached_registry();
        let (listener, calls) = counting_listener();
        control_loop.pump();

        let mut binding = JobBinding::restore_or_post(&registry, None, listener, || {
            Job::new("offscreen", work_fn(|| async { Ok(()) }))
        });
        wait_completed(binding.job());
        assert_eq!(control_loop.pump(), 0);

        // On the control thread: delivered inline
        binding.activate();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        binding.deactivate();
        binding.activate();
        control_loop.pump();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let job = binding.consume().unwrap();
        assert_eq!(job.name(), "offscreen");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removed_job_does_not_capture_reused_id() {
        let (control, mut control_loop) = ControlContext::attached();
        let config = RegistryConfig::default().with_max_job_id(2);
        let registry = JobRegistry::with_control(config, control).unwrap();
        control_loop.pump();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let names = seen.clone();
        let listener = listener_fn(move |_, job| names.lock().push(job.name().to_string()));

        let mut binding = JobBinding::restore_or_post(&registry, None, listener, || {
            Job::delayed("mine", Duration::from_secs(60))
        });
        assert_eq!(binding.id(), JobId(0));
        registry.remove(JobId(0));

        binding.activate();
        assert_eq!(registry.listener_count(JobId(0)), 0);

        // Wraps back to id 0
        registry.post(Job::new("filler", work_fn(|| async { Ok(()) })));
        let reused = registry.post(Job::new("unrelated", work_fn(|| async { Ok(()) })));
        assert_eq!(reused, JobId(0));
        wait_completed(&registry.get(reused).unwrap());

        control_loop.pump();
        std::thread::sleep(Duration::from_millis(20));
        control_loop.pump();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_removed_completed_job_is_still_replayed() {
        let (registry, mut control_loop) = attached_registry();
        let (listener, calls) = counting_listener();
        control_loop.pump();

        let mut binding = JobBinding::restore_or_post(&registry, None, listener, || {
            Job::new("gone", work_fn(|| async { Ok(()) }))
        });
        wait_completed(binding.job());
        registry.remove(binding.id());

        binding.activate();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.listener_count(binding.id()), 0);
    }

    #[test]
    fn test_deactivate_unsubscribes() {
        let (registry, _control_loop) = attached_registry();
        let (listener, _) = counting_listener();

        let mut binding = JobBinding::restore_or_post(&registry, None, listener, || {
            Job::delayed("paused", Duration::from_secs(60))
        });
        binding.activate();
        assert!(binding.is_active());
        assert_eq!(registry.listener_count(binding.id()), 1);

        binding.deactivate();
        assert_eq!(registry.listener_count(binding.id()), 0);

        binding.activate();
        let id = binding.id();
        drop(binding);
        assert_eq!(registry.listener_count(id), 0);
    }
}
