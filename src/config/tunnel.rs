//! Server and entrance configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// Port the capacity server listens on.
pub const DEFAULT_PORT: u16 = 65535;
/// Visitors the tunnel holds at once.
pub const DEFAULT_CAPACITY: u32 = 50;
/// Guides stationed at each entrance.
pub const DEFAULT_GUIDE_COUNT: u32 = 4;
/// Largest group an operator may admit in one request.
pub const DEFAULT_MAX_GROUP_SIZE: u32 = 50;
/// Delay before the first capacity poll.
pub const DEFAULT_POLL_DELAY_MS: u64 = 1500;
/// Period between capacity polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// How the dispatcher staffs accepted connections.
///
/// The remote pool has at most `capacity` concurrent holders, so one thread
/// per connection stays small under the expected load. `Bounded` trades that
/// for a fixed set of threads; connections that arrive while every worker is
/// parked in `acquire` wait in the queue, including releases that would
/// unpark them, so `workers` must exceed the expected number of blocked
/// acquirers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WorkerPolicy {
    /// Spawn one detached OS thread per accepted connection.
    #[default]
    ThreadPerConnection,
    /// Hand connections to a fixed set of worker threads.
    Bounded {
        /// Number of worker threads.
        workers: usize,
    },
}

/// Policy used when nothing else is configured.
pub const DEFAULT_WORKER_POLICY: WorkerPolicy = WorkerPolicy::ThreadPerConnection;

/// Capacity server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_addr: String,
    /// Size of the shared visitor-capacity pool.
    pub capacity_max: u32,
    /// Worker staffing for accepted connections.
    pub worker_policy: WorkerPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            capacity_max: DEFAULT_CAPACITY,
            worker_policy: DEFAULT_WORKER_POLICY,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration values.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_addr must not be empty".into()));
        }
        validate_units("capacity_max", self.capacity_max)?;
        if let WorkerPolicy::Bounded { workers: 0 } = self.worker_policy {
            return Err(ConfigError::Invalid(
                "bounded worker policy needs at least one worker".into(),
            ));
        }
        Ok(())
    }

    /// Parse server configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed JSON, `ConfigError::Invalid` for
    /// values that fail [`validate`](Self::validate).
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `TUNNEL_*` environment variables, reading a
    /// `.env` file first if one exists.
    ///
    /// Recognised: `TUNNEL_BIND_ADDR`, `TUNNEL_CAPACITY`, `TUNNEL_WORKERS`
    /// (a count, or `auto` for one per CPU).
    ///
    /// # Errors
    ///
    /// `ConfigError` if a variable does not parse or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// # Errors
    ///
    /// `ConfigError` if a variable does not parse or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(addr) = lookup("TUNNEL_BIND_ADDR") {
            cfg.bind_addr = addr;
        }
        if let Some(capacity) = parse_var(&lookup, "TUNNEL_CAPACITY")? {
            cfg.capacity_max = capacity;
        }
        if let Some(workers) = lookup("TUNNEL_WORKERS") {
            let workers = if workers.trim().eq_ignore_ascii_case("auto") {
                num_cpus::get()
            } else {
                workers
                    .trim()
                    .parse()
                    .map_err(|e| ConfigError::Parse(format!("TUNNEL_WORKERS: {e}")))?
            };
            cfg.worker_policy = WorkerPolicy::Bounded { workers };
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Entrance process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntranceConfig {
    /// Display name of the entrance, used in logs and thread names.
    pub name: String,
    /// Address of the capacity server.
    pub server_addr: String,
    /// Guides available at this entrance.
    pub guide_count: u32,
    /// Largest group accepted in one admission.
    pub max_group_size: u32,
    /// Optional connect timeout; `None` leaves it to the OS.
    pub connect_timeout_ms: Option<u64>,
    /// Optional read/write timeout; `None` blocks until the peer answers.
    pub io_timeout_ms: Option<u64>,
    /// Delay before the first capacity poll.
    pub poll_delay_ms: u64,
    /// Period between capacity polls.
    pub poll_interval_ms: u64,
}

impl Default for EntranceConfig {
    fn default() -> Self {
        Self {
            name: "Entrance 1".into(),
            server_addr: format!("localhost:{DEFAULT_PORT}"),
            guide_count: DEFAULT_GUIDE_COUNT,
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
            connect_timeout_ms: None,
            io_timeout_ms: None,
            poll_delay_ms: DEFAULT_POLL_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl EntranceConfig {
    /// Validate entrance configuration values.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.server_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("server_addr must not be empty".into()));
        }
        validate_units("guide_count", self.guide_count)?;
        validate_units("max_group_size", self.max_group_size)?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.connect_timeout_ms == Some(0) || self.io_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("timeouts must be greater than 0".into()));
        }
        Ok(())
    }

    /// Parse entrance configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed JSON, `ConfigError::Invalid` for
    /// values that fail [`validate`](Self::validate).
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `TUNNEL_*` environment variables, reading a
    /// `.env` file first if one exists.
    ///
    /// Recognised: `TUNNEL_ENTRANCE_NAME`, `TUNNEL_SERVER_ADDR`,
    /// `TUNNEL_GUIDES`, `TUNNEL_MAX_GROUP_SIZE`, `TUNNEL_CONNECT_TIMEOUT_MS`,
    /// `TUNNEL_IO_TIMEOUT_MS`, `TUNNEL_POLL_DELAY_MS`, `TUNNEL_POLL_INTERVAL_MS`.
    ///
    /// # Errors
    ///
    /// `ConfigError` if a variable does not parse or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// # Errors
    ///
    /// `ConfigError` if a variable does not parse or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(name) = lookup("TUNNEL_ENTRANCE_NAME") {
            cfg.name = name;
        }
        if let Some(addr) = lookup("TUNNEL_SERVER_ADDR") {
            cfg.server_addr = addr;
        }
        if let Some(guides) = parse_var(&lookup, "TUNNEL_GUIDES")? {
            cfg.guide_count = guides;
        }
        if let Some(max) = parse_var(&lookup, "TUNNEL_MAX_GROUP_SIZE")? {
            cfg.max_group_size = max;
        }
        if let Some(ms) = parse_var(&lookup, "TUNNEL_CONNECT_TIMEOUT_MS")? {
            cfg.connect_timeout_ms = Some(ms);
        }
        if let Some(ms) = parse_var(&lookup, "TUNNEL_IO_TIMEOUT_MS")? {
            cfg.io_timeout_ms = Some(ms);
        }
        if let Some(ms) = parse_var(&lookup, "TUNNEL_POLL_DELAY_MS")? {
            cfg.poll_delay_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "TUNNEL_POLL_INTERVAL_MS")? {
            cfg.poll_interval_ms = ms;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Read/write timeout as a `Duration`.
    #[must_use]
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    /// Delay before the first poll.
    #[must_use]
    pub const fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    /// Period between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// Counts travel as positive i32 on the wire.
fn validate_units(field: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 || i32::try_from(value).is_err() {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {}",
            i32::MAX
        )));
    }
    Ok(())
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| ConfigError::Parse(format!("{key}: {e}")))
        })
        .transpose()
}
