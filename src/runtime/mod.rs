//! Runtime adapters that run intents as detached background tasks.

pub mod spawner;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

pub use spawner::{IntentJob, IntentSpawner, ThreadSpawner};
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
