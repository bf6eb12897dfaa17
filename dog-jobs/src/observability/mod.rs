pub mod metrics;
pub mod tracing;

pub use metrics::{LiveMetrics, MetricsSnapshot};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;

use std::sync::Arc;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{Job, JobEvent, JobId, JobOutcome};

/// Event broadcast plus counters for one registry
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    /// Create a layer whose event channel holds `capacity` unread events
    pub fn new(capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(capacity.max(1));

        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    pub fn record_job_posted(&self, job: &Job) {
        self.emit(JobEvent::Posted {
            job_id: job.id(),
            name: job.name().to_string(),
            at: Utc::now(),
        });
        self.metrics.increment_jobs_posted();
    }

    pub fn record_job_started(&self, job_id: JobId) {
        self.emit(JobEvent::Started { job_id, at: Utc::now() });
        self.metrics.increment_jobs_started();
    }

    pub fn record_job_completed(&self, job_id: JobId, outcome: &JobOutcome) {
        self.metrics.record_outcome(outcome);
        self.emit(JobEvent::Completed {
            job_id,
            outcome: outcome.clone(),
            at: Utc::now(),
        });
    }

    pub fn record_job_removed(&self, job_id: JobId) {
        self.emit(JobEvent::Removed { job_id, at: Utc::now() });
        self.metrics.increment_jobs_removed();
    }

    /// Receiver for events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Events emitted from now on, as a stream
    pub fn events(&self) -> BroadcastStream<JobEvent> {
        BroadcastStream::new(self.subscribe())
    }

    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.event_broadcaster.send(event);
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new(1024)
    }
}
