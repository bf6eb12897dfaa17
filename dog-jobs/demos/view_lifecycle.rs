//! A view that posts a job, goes to the background and comes back.
//!
//! The main thread plays the UI thread: it drives the control loop, so every
//! completion callback runs here.
//!
//! Run with `cargo run -p dog-jobs --example view_lifecycle --features tracing-basic`.

use std::time::Duration;
use anyhow::Result;
use tracing::info;

use dog_jobs::prelude::*;
use dog_jobs::init_tracing;

struct View {
    binding: JobBinding,
}

impl View {
    /// Create the view, rebinding to `saved` if that job is still around
    fn create(registry: &JobRegistry, saved: Option<JobId>) -> Self {
        let listener = listener_fn(|registry, job| {
            info!("Job completed {} ({:?})", job.name(), job.outcome());
            registry.remove(job.id());
        });

        let binding = JobBinding::restore_or_post(registry, saved, listener, || {
            Job::delayed("Tell Android Hi!", Duration::from_millis(300))
        });
        Self { binding }
    }

    fn start(&mut self) {
        self.binding.activate();
    }

    fn stop(&mut self) {
        self.binding.deactivate();
    }

    /// Id to keep while the view is torn down
    fn save(&self) -> JobId {
        self.binding.id()
    }
}

fn main() -> Result<()> {
    init_tracing("dog_jobs=debug,view_lifecycle=info");

    let (control, mut control_loop) = ControlContext::attached();
    let registry = JobRegistry::with_control(RegistryConfig::from_env(), control)?;
    control_loop.pump();

    let mut view = View::create(&registry, None);
    view.start();

    // Rotated away before the job finishes
    view.stop();
    let saved = view.save();
    drop(view);
    std::thread::sleep(Duration::from_millis(500));
    control_loop.pump();
    info!("While the view was gone: completed = {:?}", registry.get(saved).map(|job| job.is_completed()));

    // Recreated: the missed completion is delivered on start
    let mut view = View::create(&registry, Some(saved));
    view.start();
    control_loop.pump();

    info!("Jobs left in registry: {}", registry.len());
    info!("Metrics: {:?}", registry.metrics().snapshot());

    drop(view);
    Ok(())
}
