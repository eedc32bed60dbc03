//! Configuration models for the capacity server and entrance processes.

pub mod tunnel;

pub use tunnel::{
    EntranceConfig, ServerConfig, WorkerPolicy, DEFAULT_CAPACITY, DEFAULT_GUIDE_COUNT,
    DEFAULT_MAX_GROUP_SIZE, DEFAULT_POLL_DELAY_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT,
    DEFAULT_WORKER_POLICY,
};
