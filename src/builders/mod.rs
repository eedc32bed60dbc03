//! Builders to construct servers and entrances from configuration.

pub mod tunnel_builder;

pub use tunnel_builder::{build_dispatcher, build_entrance, build_entrance_with};
