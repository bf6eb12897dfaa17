use std::fmt;
use std::sync::Arc;

use crate::{Job, JobRegistry};

/// Observer of job completion.
///
/// Always called on the registry's control context. Listeners are compared by
/// identity (the allocation behind the `Arc`), so registering the same
/// instance twice keeps a single entry.
pub trait JobListener: Send + Sync {
    fn on_job_completed(&self, registry: &JobRegistry, job: &Arc<Job>);
}

impl<F> JobListener for F
where
    F: Fn(&JobRegistry, &Arc<Job>) + Send + Sync,
{
    fn on_job_completed(&self, registry: &JobRegistry, job: &Arc<Job>) {
        self(registry, job)
    }
}

/// Wrap a closure as a shareable listener
pub fn listener_fn<F>(f: F) -> Arc<dyn JobListener>
where
    F: Fn(&JobRegistry, &Arc<Job>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identity of a listener: the data address behind its `Arc`.
///
/// Vtable pointers are ignored, they are not guaranteed unique per type.
pub(crate) fn listener_addr<L: JobListener + ?Sized>(listener: &Arc<L>) -> *const () {
    Arc::as_ptr(listener) as *const ()
}

/// Insertion-ordered set of listeners, deduplicated by identity
#[derive(Default, Clone)]
pub struct ListenerSet {
    listeners: Vec<Arc<dyn JobListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` unless the same instance is already present
    pub fn insert(&mut self, listener: Arc<dyn JobListener>) -> bool {
        if self.contains(&listener) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Remove the entry for the same instance as `listener`
    pub fn remove<L: JobListener + ?Sized>(&mut self, listener: &Arc<L>) -> bool {
        let addr = listener_addr(listener);
        match self.listeners.iter().position(|l| listener_addr(l) == addr) {
            Some(index) => {
                // Vec::remove keeps insertion order for the rest
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains<L: JobListener + ?Sized>(&self, listener: &Arc<L>) -> bool {
        let addr = listener_addr(listener);
        self.listeners.iter().any(|l| listener_addr(l) == addr)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Copy of the current listeners, in insertion order
    pub fn snapshot(&self) -> Vec<Arc<dyn JobListener>> {
        self.listeners.clone()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.listeners.iter().map(listener_addr))
            .finish()
    }
}
