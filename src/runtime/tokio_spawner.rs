//! Tokio runtime spawner implementation.

use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tracing::debug;

use crate::runtime::{IntentJob, IntentSpawner};

/// Runs intents on a tokio runtime's blocking thread pool.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: Handle,
    // Keeps an owned runtime alive for as long as any clone exists.
    _runtime: Option<Arc<OwnedRuntime>>,
}

/// Owned runtime that may be dropped from one of its own blocking threads.
///
/// Intents carry a spawner clone, so the last clone can go away inside a job
/// running on this runtime. A plain `Runtime` drop would wait for that very
/// job; `shutdown_background` does not wait.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            debug!("shutting down owned intent runtime");
            runtime.shutdown_background();
        }
    }
}

impl TokioSpawner {
    /// Create a `TokioSpawner` from an existing runtime handle.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self {
            handle,
            _runtime: None,
        }
    }

    /// Create a `TokioSpawner` owning a new multi-threaded runtime.
    ///
    /// # Errors
    ///
    /// Fails if the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            _runtime: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }
}

impl IntentSpawner for TokioSpawner {
    fn spawn(&self, name: &str, job: IntentJob) {
        debug!(task = name, "spawning intent on tokio blocking pool");
        // Detached: the JoinHandle is dropped on purpose.
        drop(self.handle.spawn_blocking(job));
    }
}
