//! Admission-control core: bounded pools, the wire codec, the capacity
//! server's dispatcher and the entrance-side coordinator.

pub mod bounded_pool;
pub(crate) mod connection_pool;
pub mod coordinator;
pub mod dispatcher;
pub mod entrance;
pub mod error;
pub mod events;
pub mod poller;
pub mod protocol;

pub use bounded_pool::BoundedPool;
pub use coordinator::{Intent, IntentId, IntentOutcome, RequestCoordinator};
pub use dispatcher::{
    respond, serve_connection, ConnectionDispatcher, ConnectionState, DispatcherHandle,
    DispatcherStats, ShutdownHandle,
};
pub use entrance::Entrance;
pub use error::{AdmissionError, AppResult, ConfigError, PoolError};
pub use events::{AdmissionEvent, AdmissionEvents, ChannelEvents, TracingEvents};
pub use poller::PollingAdapter;
pub use protocol::{Request, REFUSED};
