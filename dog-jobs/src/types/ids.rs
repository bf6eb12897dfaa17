use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Default exclusive upper bound of the job id space
pub const MAX_JOB_ID: u32 = 10_000;

/// Handle to a registered job.
///
/// Unique among live jobs only: ids come from a wrapping counter, so an id is
/// reused once the allocator wraps past its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u32);

impl JobId {
    /// Id carried by a job that has not been posted
    pub const INVALID: JobId = JobId(u32::MAX);

    /// Get the raw integer value
    pub fn get(self) -> u32 {
        self.0
    }

    /// Check whether this is a real id rather than [`JobId::INVALID`]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for JobId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Wrapping job id counter.
///
/// Hands out `0, 1, .., max - 1, 0, 1, ..`. Nothing checks whether an id is
/// still in use: callers must keep fewer than `max` jobs live at once or two
/// live jobs end up sharing an id.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
    max: u32,
}

impl IdAllocator {
    /// Create an allocator over `[0, max)`
    pub fn new(max: u32) -> Self {
        Self {
            next: AtomicU32::new(0),
            max: max.max(1),
        }
    }

    /// Allocate the next id
    pub fn allocate(&self) -> JobId {
        let max = self.max;
        let previous = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current + 1 >= max { 0 } else { current + 1 })
            })
            .unwrap_or_else(|current| current);
        JobId(previous)
    }

    /// Exclusive upper bound of the id space
    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(MAX_JOB_ID)
    }
}
