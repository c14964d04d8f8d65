//! Execution primitive for queued deliveries
//!
//! The bus only needs to hand a job off to run concurrently. The default
//! [`TokioExecutor`] runs jobs on tokio's blocking pool, which suits handlers
//! that do synchronous work.

use crate::bus::error::{EventBusError, EventBusResult};
use once_cell::sync::OnceCell;
use tokio::runtime::{Builder, Handle, Runtime};

/// Unit of work submitted by the posters
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs concurrently with the submitting thread
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job) -> EventBusResult<()>;
}

static SHARED_RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Runs jobs with `spawn_blocking`
///
/// Uses the supplied runtime handle, or a process-wide runtime built on first use.
#[derive(Clone, Default)]
pub struct TokioExecutor {
    handle: Option<Handle>,
}

impl TokioExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn handle(&self) -> EventBusResult<Handle> {
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }
        let runtime = SHARED_RUNTIME.get_or_try_init(|| {
            log::trace!("Starting shared msgbus runtime");
            Builder::new_multi_thread()
                .thread_name("msgbus-worker")
                .enable_all()
                .build()
                .map_err(|e| EventBusError::Executor {
                    message: format!("failed to start runtime: {e}"),
                })
        })?;
        Ok(runtime.handle().clone())
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) -> EventBusResult<()> {
        // Detached; the join handle is not needed
        drop(self.handle()?.spawn_blocking(job));
        Ok(())
    }
}

/// Spawns a named OS thread per job
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, job: Job) -> EventBusResult<()> {
        std::thread::Builder::new()
            .name("msgbus-job".to_string())
            .spawn(job)
            .map(|_| ())
            .map_err(|e| EventBusError::Executor {
                message: format!("failed to spawn thread: {e}"),
            })
    }
}
