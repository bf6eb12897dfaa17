//! # dog-jobs: In-Process Job Tracking
//!
//! **Post work, keep an id, hear about completion on one control thread**
//!
//! dog-jobs tracks units of background work inside a single process. Jobs run
//! on a worker pool, their completion flag is visible from any thread, and
//! listeners are notified on a single designated *control* context no matter
//! which worker finished the job. Listeners may come and go while a job runs,
//! the way a UI view attaches and detaches across its own lifecycle.
//!
//! ## Guarantees
//!
//! - **Time-scoped ids**: small integer ids from a wrapping counter, unique
//!   among live jobs
//! - **Identity-deduplicated listeners**: the same listener instance is
//!   subscribed at most once per job, in subscription order
//! - **Control-context delivery**: completion callbacks never run on workers
//! - **Isolated listeners**: a panicking listener does not stop the others
//! - **Caller-driven removal**: completed jobs stay until someone removes them
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use dog_jobs::prelude::*;
//!
//! # fn main() -> JobsResult<()> {
//! let registry = JobRegistry::global()?;
//!
//! let job_id = registry.post(Job::delayed("Tell Android Hi!", Duration::from_secs(5)));
//!
//! registry.add_listener(job_id, listener_fn(|registry, job| {
//!     println!("Job completed {}", job.name());
//!     registry.remove(job.id());
//! }));
//! # Ok(())
//! # }
//! ```
//!
//! A job that completed while nobody listened can still be checked with
//! [`Job::is_completed`]; [`JobBinding`] wraps that pattern for owners that
//! activate and deactivate.

pub mod types;
pub mod error;
pub mod config;
pub mod job;
pub mod listener;
pub mod control;
pub mod execution;
pub mod registry;
pub mod binding;
pub mod observability;

// Core API exports
pub use registry::JobRegistry;
pub use types::{JobId, IdAllocator, JobOutcome, JobEvent, MAX_JOB_ID};
pub use error::{JobsError, JobsResult, WorkError};
pub use config::RegistryConfig;
pub use job::{Job, WorkUnit, Delay, work_fn, blocking_fn};
pub use listener::{JobListener, ListenerSet, listener_fn};
pub use control::{ControlContext, ControlLoop};
pub use execution::JobExecutor;
pub use binding::JobBinding;

// Observability exports
pub use observability::{ObservabilityLayer, LiveMetrics, MetricsSnapshot};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

/// Everything needed to post jobs and listen for them
pub mod prelude {
    pub use crate::{
        JobRegistry, Job, JobId, JobOutcome, JobListener, JobBinding
    };

    pub use crate::{
        RegistryConfig, ControlContext, ControlLoop, JobsError, JobsResult, WorkError
    };

    pub use crate::{
        WorkUnit, Delay, work_fn, blocking_fn, listener_fn
    };

    pub use async_trait::async_trait;
}
