//! # Tunnel Admission
//!
//! Admission control for a capacity-limited tunnel guarded by two
//! independent bounded resources.
//!
//! Each entrance process holds a small pool of escort guides. A single
//! coordinating server holds the shared visitor capacity of the tunnel. A
//! group is admitted only when it has both a guide and enough tunnel places.
//!
//! ## Components
//!
//! - [`BoundedPool`](core::BoundedPool): counting monitor with blocking
//!   `acquire`, broadcasting `release` and non-blocking `peek`. Used for the
//!   guides (capacity 4) and, on the server, for visitors (capacity 50).
//! - [`protocol`](core::protocol): one big-endian `i32` in, one out, one
//!   exchange per TCP connection.
//! - [`ConnectionDispatcher`](core::ConnectionDispatcher): server accept
//!   loop, one worker per connection by default.
//! - [`RequestCoordinator`](core::RequestCoordinator): takes a guide, asks the
//!   server, and hands the guide back if the server does not confirm.
//! - [`PollingAdapter`](core::PollingAdapter): periodic capacity queries.
//!
//! ## Running the capacity server
//!
//! ```rust,no_run
//! use tunnel_admission::builders::build_dispatcher;
//! use tunnel_admission::config::ServerConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dispatcher = build_dispatcher(&ServerConfig::default())?;
//! dispatcher.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Admitting a group from an entrance
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunnel_admission::builders::build_entrance;
//! use tunnel_admission::config::EntranceConfig;
//! use tunnel_admission::core::{AdmissionEvent, ChannelEvents};
//!
//! # fn main() -> anyhow::Result<()> {
//! let (events, rx) = ChannelEvents::new();
//! let entrance = build_entrance(&EntranceConfig::default(), Arc::new(events))?;
//! entrance.start_polling()?;
//! entrance.request_admission(12);
//!
//! for event in rx.iter() {
//!     if let AdmissionEvent::AdmissionConfirmed(n) = event {
//!         println!("{n} visitors entered");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Pools, wire codec, dispatcher, coordinator and their errors.
pub mod core;
/// Configuration models for the server and entrances.
pub mod config;
/// Builders to construct servers and entrances from configuration.
pub mod builders;
/// Infrastructure adapters for talking to the capacity server.
pub mod infra;
/// Spawners for detached intent tasks.
pub mod runtime;
/// Shared utilities.
pub mod util;
