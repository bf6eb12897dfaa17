use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobOutcome};

/// Lifecycle events broadcast by a registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// Job was registered and handed to the executor
    Posted {
        job_id: JobId,
        name: String,
        at: DateTime<Utc>,
    },

    /// A worker picked the job up
    Started {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// The worker is done with the job
    Completed {
        job_id: JobId,
        outcome: JobOutcome,
        at: DateTime<Utc>,
    },

    /// Job was removed from the registry
    Removed {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Posted { .. } => "posted",
            Self::Started { .. } => "started",
            Self::Completed { .. } => "completed",
            Self::Removed { .. } => "removed",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Posted { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Removed { job_id, .. } => *job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Posted { at, .. }
            | Self::Started { at, .. }
            | Self::Completed { at, .. }
            | Self::Removed { at, .. } => at,
        }
    }

    /// Render the event as a JSON line
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
