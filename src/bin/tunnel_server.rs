//! Capacity server: serves the shared visitor pool until the process exits.
//!
//! Configured through `TUNNEL_BIND_ADDR`, `TUNNEL_CAPACITY` and
//! `TUNNEL_WORKERS` (or a `.env` file); logging through `RUST_LOG`.

use anyhow::Context;
use tracing::info;

use tunnel_admission::builders::build_dispatcher;
use tunnel_admission::config::ServerConfig;
use tunnel_admission::core::AppResult;
use tunnel_admission::util::init_tracing;

fn main() -> AppResult<()> {
    init_tracing();
    let cfg = ServerConfig::from_env().context("loading server configuration")?;
    let dispatcher = build_dispatcher(&cfg)?;
    info!(
        addr = %dispatcher.local_addr(),
        capacity = cfg.capacity_max,
        "server started, waiting for connections"
    );
    dispatcher.run().context("accept loop failed")?;
    Ok(())
}
