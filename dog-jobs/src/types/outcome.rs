use serde::{Deserialize, Serialize};

use crate::WorkError;

/// How a job's work ended.
///
/// Every outcome counts as completed; listeners are notified for all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The work ran to its natural end
    Succeeded,
    /// The work returned an error
    Failed(String),
    /// The work was torn down before finishing (panic or abort), with the reason
    Interrupted(String),
}

impl JobOutcome {
    /// Check if the work ran to its natural end
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Outcome name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::Interrupted(_) => "interrupted",
        }
    }
}

impl From<Result<(), WorkError>> for JobOutcome {
    fn from(result: Result<(), WorkError>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(WorkError::Failed(reason)) => Self::Failed(reason),
            Err(WorkError::Interrupted(reason)) => Self::Interrupted(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_work_result() {
        assert_eq!(JobOutcome::from(Ok(())), JobOutcome::Succeeded);
        assert_eq!(
            JobOutcome::from(Err(WorkError::failed("boom"))),
            JobOutcome::Failed("boom".to_string())
        );

        let interrupted = JobOutcome::from(Err(WorkError::interrupted("panic")));
        assert_eq!(interrupted.as_str(), "interrupted");
        assert!(!interrupted.is_success());
        assert_eq!(interrupted, JobOutcome::Interrupted("panic".to_string()));
    }

    #[test]
    fn test_interrupted_keeps_reason_in_json() {
        let value = serde_json::to_value(JobOutcome::Interrupted("task aborted".to_string())).unwrap();
        assert_eq!(value["status"], "interrupted");
        assert_eq!(value["reason"], "task aborted");

        let back: JobOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(back, JobOutcome::Interrupted("task aborted".to_string()));
    }
}
