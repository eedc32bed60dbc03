//! Headless entrance: reads signed visitor counts from stdin, one per line.
//!
//! `N` admits a group of N, `-N` ends a visit of N, `0` queries the remaining
//! capacity and `quit` exits. Outcomes are logged. Configured through the
//! `TUNNEL_*` entrance variables (or a `.env` file); logging through
//! `RUST_LOG`.

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use tunnel_admission::builders::build_entrance;
use tunnel_admission::config::EntranceConfig;
use tunnel_admission::core::{AppResult, Intent, TracingEvents};
use tunnel_admission::util::init_tracing;

fn main() -> AppResult<()> {
    init_tracing();
    let cfg = EntranceConfig::from_env().context("loading entrance configuration")?;
    let entrance = build_entrance(&cfg, Arc::new(TracingEvents::new(cfg.name.clone())))?;
    entrance.start_polling().context("starting capacity polling")?;
    info!(entrance = entrance.name(), server = %cfg.server_addr, "reading visitor counts from stdin");

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") {
            break;
        }
        match input.parse::<i32>() {
            Ok(code) => {
                let id = entrance.coordinator().launch(Intent::from_code(code));
                info!(%id, code, "intent launched");
            }
            Err(_) => warn!(input, "Invalid entry: Please use only numbers for visitor count."),
        }
    }

    entrance.stop_polling();
    Ok(())
}
