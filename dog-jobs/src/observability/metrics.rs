use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

use crate::JobOutcome;

/// Live counters for registry activity
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_posted: AtomicU64,
    jobs_started: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_interrupted: AtomicU64,
    jobs_removed: AtomicU64,
    notifications_scheduled: AtomicU64,
    notifications_delivered: AtomicU64,
    listener_panics: AtomicU64,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_jobs_posted(&self) {
        self.jobs_posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed job under its outcome
    pub fn record_outcome(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Succeeded => &self.jobs_succeeded,
            JobOutcome::Failed(_) => &self.jobs_failed,
            JobOutcome::Interrupted(_) => &self.jobs_interrupted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_removed(&self) {
        self.jobs_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_notifications_scheduled(&self) {
        self.notifications_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_notifications_delivered(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_listener_panics(&self) {
        self.listener_panics.fetch_add(1, Ordering::Relaxed);
    }

    // Getters
    pub fn jobs_posted(&self) -> u64 {
        self.jobs_posted.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_succeeded.load(Ordering::Relaxed)
            + self.jobs_failed.load(Ordering::Relaxed)
            + self.jobs_interrupted.load(Ordering::Relaxed)
    }

    pub fn listener_panics(&self) -> u64 {
        self.listener_panics.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_posted: self.jobs_posted.load(Ordering::Relaxed),
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_interrupted: self.jobs_interrupted.load(Ordering::Relaxed),
            jobs_removed: self.jobs_removed.load(Ordering::Relaxed),
            notifications_scheduled: self.notifications_scheduled.load(Ordering::Relaxed),
            notifications_delivered: self.notifications_delivered.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_posted: u64,
    pub jobs_started: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_interrupted: u64,
    pub jobs_removed: u64,
    pub notifications_scheduled: u64,
    pub notifications_delivered: u64,
    pub listener_panics: u64,
}

impl MetricsSnapshot {
    /// Jobs posted but not yet completed, as far as the counters know
    pub fn in_flight(&self) -> u64 {
        let done = self.jobs_succeeded + self.jobs_failed + self.jobs_interrupted;
        self.jobs_posted.saturating_sub(done)
    }

    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let done = self.jobs_succeeded + self.jobs_failed + self.jobs_interrupted;
        if done == 0 {
            100.0
        } else {
            (self.jobs_succeeded as f64 / done as f64) * 100.0
        }
    }
}
