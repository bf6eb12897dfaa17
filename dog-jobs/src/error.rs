use thiserror::Error;

/// Result type for registry operations
pub type JobsResult<T> = Result<T, JobsError>;

/// Infrastructure errors raised while setting up or driving a registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build worker runtime: {0}")]
    Runtime(String),

    #[error("Failed to spawn control thread: {0}")]
    ControlThread(String),

    #[error("Control context is closed")]
    ControlClosed,

    #[error("Executor is shut down")]
    ExecutorShutdown,

    #[error("Global job registry is already initialized")]
    AlreadyInitialized,
}

/// Outcome of a failed work unit.
///
/// Never surfaced to listeners as an error: the executor records it on the job
/// as a [`JobOutcome`](crate::JobOutcome) and still marks the job completed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkError {
    /// The work ran and reported a failure
    #[error("Work failed: {0}")]
    Failed(String),

    /// The work was torn down before it could finish (panic, aborted task)
    #[error("Work interrupted: {0}")]
    Interrupted(String),
}

impl WorkError {
    /// Create a failure error
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Create an interruption error
    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::Interrupted(msg.into())
    }

    /// Check if the work was interrupted rather than failing on its own
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(msg) | Self::Interrupted(msg) => msg,
        }
    }
}

impl From<tokio::task::JoinError> for WorkError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Interrupted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_error_helpers() {
        let failed = WorkError::failed("disk full");
        assert!(!failed.is_interrupted());
        assert_eq!(failed.message(), "disk full");
        assert_eq!(failed.to_string(), "Work failed: disk full");

        let interrupted = WorkError::interrupted("panicked");
        assert!(interrupted.is_interrupted());
        assert_eq!(interrupted.message(), "panicked");
    }
}
