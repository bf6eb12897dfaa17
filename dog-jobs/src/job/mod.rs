pub mod work;

pub use work::{WorkUnit, FnWork, BlockingWork, Delay, work_fn, blocking_fn};

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{JobId, JobOutcome};

/// A unit of trackable work: identity, name, one-way completion flag.
///
/// Shared as `Arc<Job>` between the caller, the registry and the worker that
/// runs it. The id is assigned by [`JobRegistry::post`](crate::JobRegistry::post),
/// not at construction.
pub struct Job {
    id: AtomicU32,
    name: String,
    completed: AtomicBool,
    outcome: OnceCell<JobOutcome>,
    work: Mutex<Option<Box<dyn WorkUnit>>>,
    created_at: DateTime<Utc>,
}

impl Job {
    /// Create an unposted job around `work`
    pub fn new(name: impl Into<String>, work: impl WorkUnit) -> Self {
        let work: Box<dyn WorkUnit> = Box::new(work);
        Self {
            id: AtomicU32::new(JobId::INVALID.get()),
            name: name.into(),
            completed: AtomicBool::new(false),
            outcome: OnceCell::new(),
            work: Mutex::new(Some(work)),
            created_at: Utc::now(),
        }
    }

    /// Create a job whose work just waits for `duration`
    pub fn delayed(name: impl Into<String>, duration: Duration) -> Self {
        Self::new(name, Delay(duration))
    }

    /// Registry id, or [`JobId::INVALID`] before the job is posted
    pub fn id(&self) -> JobId {
        JobId(self.id.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether a worker is done with this job.
    ///
    /// Lets a caller that was not listening at completion time find out later.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// How the work ended; `None` until the job is completed
    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.outcome.get()
    }

    pub(crate) fn assign_id(&self, id: JobId) {
        self.id.store(id.get(), Ordering::Release);
    }

    /// Take the work out for execution; `None` once it has been taken
    pub(crate) fn take_work(&self) -> Option<Box<dyn WorkUnit>> {
        self.work.lock().take()
    }

    /// Record the outcome and flip the completion flag.
    ///
    /// Returns `false` if the job was already completed, in which case nothing
    /// changes.
    pub(crate) fn complete(&self, outcome: JobOutcome) -> bool {
        if self.completed.load(Ordering::Acquire) {
            return false;
        }
        // Outcome first so anyone who sees `completed` also sees it
        let _ = self.outcome.set(outcome);
        !self.completed.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id())
            .field("name", &self.name)
            .field("completed", &self.is_completed())
            .field("outcome", &self.outcome())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
