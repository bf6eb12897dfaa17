use tracing::warn;

use crate::{JobsError, JobsResult, types::MAX_JOB_ID};

/// Environment variable overriding [`RegistryConfig::max_job_id`]
pub const ENV_MAX_JOB_ID: &str = "DOG_JOBS_MAX_JOB_ID";
/// Environment variable overriding [`RegistryConfig::worker_threads`]
pub const ENV_WORKER_THREADS: &str = "DOG_JOBS_WORKER_THREADS";
/// Environment variable overriding [`RegistryConfig::max_concurrency`]
pub const ENV_MAX_CONCURRENCY: &str = "DOG_JOBS_MAX_CONCURRENCY";
/// Environment variable overriding [`RegistryConfig::event_capacity`]
pub const ENV_EVENT_CAPACITY: &str = "DOG_JOBS_EVENT_CAPACITY";

/// Configuration for a job registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Exclusive upper bound of the job id space; ids wrap to 0 past it
    pub max_job_id: u32,
    /// Number of worker threads running work units
    pub worker_threads: usize,
    /// Maximum number of work units running at the same time
    pub max_concurrency: usize,
    /// Capacity of the job event broadcast channel
    pub event_capacity: usize,
    /// Name given to the control thread
    pub control_thread_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_job_id: MAX_JOB_ID,
            worker_threads: 2,
            max_concurrency: 8,
            event_capacity: 1024,
            control_thread_name: "dog-jobs-control".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `DOG_JOBS_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `DOG_JOBS_*` key.
    ///
    /// Values that do not parse are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = parse_var(&lookup, ENV_MAX_JOB_ID) {
            config.max_job_id = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_WORKER_THREADS) {
            config.worker_threads = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_MAX_CONCURRENCY) {
            config.max_concurrency = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_EVENT_CAPACITY) {
            config.event_capacity = value;
        }

        config
    }

    /// Set the id space bound
    pub fn with_max_job_id(mut self, max_job_id: u32) -> Self {
        self.max_job_id = max_job_id;
        self
    }

    /// Set the number of worker threads
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Set the concurrency limit for running work
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    /// Set the control thread name
    pub fn with_control_thread_name(mut self, name: impl Into<String>) -> Self {
        self.control_thread_name = name.into();
        self
    }

    /// Reject values the registry cannot run with
    pub fn validate(&self) -> JobsResult<()> {
        // u32::MAX is reserved for JobId::INVALID
        if self.max_job_id == 0 || self.max_job_id == u32::MAX {
            return Err(JobsError::InvalidConfig(format!(
                "max_job_id must be in 1..{}, got {}",
                u32::MAX,
                self.max_job_id
            )));
        }
        if self.worker_threads == 0 {
            return Err(JobsError::InvalidConfig("worker_threads must be at least 1".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(JobsError::InvalidConfig("max_concurrency must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(JobsError::InvalidConfig("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}
