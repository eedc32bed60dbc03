//! Shared utilities.

pub mod input;
pub mod telemetry;

pub use input::parse_group_size;
pub use telemetry::init_tracing;
