//! The control execution context.
//!
//! One thread owns listener delivery. Completion callbacks, and any state the
//! caller wants to mutate alongside them, are queued here and run in order on
//! that thread, never on the worker that finished the job.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use once_cell::sync::OnceCell;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::{JobsError, JobsResult};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the control context's run queue
#[derive(Clone)]
pub struct ControlContext {
    tx: mpsc::UnboundedSender<Task>,
    thread: Arc<OnceCell<ThreadId>>,
}

impl ControlContext {
    /// Start a dedicated control thread named `name`.
    ///
    /// The thread exits once every handle to the context is dropped.
    pub fn spawn(name: impl Into<String>) -> JobsResult<Self> {
        let (context, control_loop) = Self::attached();

        thread::Builder::new()
            .name(name.into())
            .spawn(move || control_loop.run())
            .map_err(|e| JobsError::ControlThread(e.to_string()))?;

        Ok(context)
    }

    /// Create a context whose loop the caller drives on a thread of its own.
    ///
    /// The first thread to run or pump the returned [`ControlLoop`] becomes
    /// the control thread.
    pub fn attached() -> (Self, ControlLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = Arc::new(OnceCell::new());

        let context = Self { tx, thread: thread.clone() };
        (context, ControlLoop { rx, thread })
    }

    /// Queue `task` to run on the control thread.
    ///
    /// Returns immediately; the task runs after everything queued before it.
    pub fn post<F>(&self, task: F) -> JobsResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(task))
            .map_err(|_| JobsError::ControlClosed)
    }

    /// Whether the calling thread is the control thread
    pub fn is_current(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }

    /// Whether the loop behind this context is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for ControlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlContext")
            .field("thread", &self.thread.get())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving end of a control context
pub struct ControlLoop {
    rx: mpsc::UnboundedReceiver<Task>,
    thread: Arc<OnceCell<ThreadId>>,
}

impl ControlLoop {
    /// Run queued tasks until every [`ControlContext`] handle is dropped.
    ///
    /// Blocks the calling thread; must not be called from async code.
    pub fn run(mut self) {
        self.claim_thread();
        debug!("Control loop started");

        while let Some(task) = self.rx.blocking_recv() {
            run_task(task);
        }

        debug!("Control loop stopped");
    }

    /// Run whatever is queued right now without blocking.
    ///
    /// Returns the number of tasks run.
    pub fn pump(&mut self) -> usize {
        self.claim_thread();

        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            run_task(task);
            ran += 1;
        }
        ran
    }

    fn claim_thread(&self) {
        let _ = self.thread.set(thread::current().id());
    }
}

// A panicking task must not take the control thread down with it
fn run_task(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("Task panicked on control context");
    }
}
