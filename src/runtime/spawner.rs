//! Spawning abstraction for fire-and-forget intents.
//!
//! Intents block on the guide pool and on socket reads, so spawners must run
//! them somewhere blocking is allowed. Tasks are never joined or cancelled.

use std::thread;

use tracing::error;

/// Blocking unit of work run by a spawner.
pub type IntentJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs intents without blocking the caller.
pub trait IntentSpawner: Send + Sync + 'static {
    /// Start `job` in the background. `name` labels the task for diagnostics.
    fn spawn(&self, name: &str, job: IntentJob);
}

/// Runs each intent on its own detached OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl IntentSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, job: IntentJob) {
        if let Err(e) = thread::Builder::new().name(name.to_owned()).spawn(job) {
            error!(task = name, error = %e, "could not spawn intent thread; intent dropped");
        }
    }
}
