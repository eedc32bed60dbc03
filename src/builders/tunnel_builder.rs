//! Builders to construct the capacity server and entrances from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::{EntranceConfig, ServerConfig};
use crate::core::{
    AdmissionEvents, AppResult, BoundedPool, ConfigError, ConnectionDispatcher, Entrance,
    RequestCoordinator,
};
use crate::infra::{TcpTransport, Transport};
use crate::runtime::{IntentSpawner, ThreadSpawner};

/// Name of the server-side capacity pool in logs.
pub const CAPACITY_POOL_NAME: &str = "visitors";

/// Validate `cfg`, create the capacity pool and bind the dispatcher.
///
/// # Errors
///
/// Invalid configuration or a failed bind.
pub fn build_dispatcher(cfg: &ServerConfig) -> AppResult<ConnectionDispatcher> {
    cfg.validate().context("server config invalid")?;
    let pool = Arc::new(BoundedPool::new(CAPACITY_POOL_NAME, cfg.capacity_max));
    ConnectionDispatcher::bind(cfg.bind_addr.as_str(), pool, cfg.worker_policy)
        .with_context(|| format!("binding {}", cfg.bind_addr))
}

/// Build an entrance talking TCP to `cfg.server_addr`, running intents on
/// detached threads.
///
/// # Errors
///
/// `ConfigError` if `cfg` is invalid.
pub fn build_entrance(
    cfg: &EntranceConfig,
    events: Arc<dyn AdmissionEvents>,
) -> Result<Entrance, ConfigError> {
    build_entrance_with(
        cfg,
        events,
        Arc::new(TcpTransport::from_config(cfg)),
        Arc::new(ThreadSpawner),
    )
}

/// Build an entrance with an explicit transport and spawner.
///
/// # Errors
///
/// `ConfigError` if `cfg` is invalid.
pub fn build_entrance_with(
    cfg: &EntranceConfig,
    events: Arc<dyn AdmissionEvents>,
    transport: Arc<dyn Transport>,
    spawner: Arc<dyn IntentSpawner>,
) -> Result<Entrance, ConfigError> {
    cfg.validate()?;
    let guides = Arc::new(BoundedPool::new(cfg.name.clone(), cfg.guide_count));
    let coordinator = RequestCoordinator::new(guides, transport, events)
        .with_entrance_name(&cfg.name)
        .with_spawner(spawner)
        .with_max_group_size(cfg.max_group_size);
    Ok(Entrance::new(
        coordinator,
        cfg.max_group_size,
        cfg.poll_delay(),
        cfg.poll_interval(),
    ))
}
