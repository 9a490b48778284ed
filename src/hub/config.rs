//! Hub Configuration
//!
//! Defaults suit a local session. Every knob can be overridden from the
//! environment with [`HubConfig::from_env`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::core::vec2::Bounds;
use crate::world::spawn::SpawnRates;

/// Spawn-rate file read when `HORDE_SPAWN_RATES` is unset.
pub const DEFAULT_SPAWN_RATES_FILE: &str = "spawn_rates.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    InvalidVar {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// Spawn-rate file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Spawn-rate file is not valid.
    #[error("invalid spawn rates in {path}: {source}")]
    SpawnRates {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a new connection may take to say hello.
    pub hello_timeout: Duration,
    /// Period of the idle simulation tick.
    pub idle_tick_interval: Duration,
    /// Silence after which hub-side simulation takes over.
    pub idle_after: Duration,
    /// Delay before a disconnect's removal broadcast.
    pub removal_delay: Duration,
    /// Per-connection outbound queue length.
    pub outbox_capacity: usize,
    /// Reconciliation loop queue length.
    pub event_capacity: usize,
    /// Dead hostiles created at start-up.
    pub hostile_pool: usize,
    /// Fixed RNG seed, or entropy when `None`.
    pub rng_seed: Option<u64>,
    /// Spawn counts and difficulty stepping.
    pub spawn_rates: SpawnRates,
    /// Play area.
    pub bounds: Bounds,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8765)),
            max_connections: 1000,
            hello_timeout: Duration::from_secs(10),
            idle_tick_interval: Duration::from_millis(100),
            idle_after: Duration::from_millis(500),
            removal_delay: Duration::from_millis(100),
            outbox_capacity: 256,
            event_capacity: 1024,
            hostile_pool: 1000,
            rng_seed: None,
            spawn_rates: SpawnRates::default(),
            bounds: Bounds::default(),
        }
    }
}

impl HubConfig {
    /// Defaults overridden by `HORDE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HORDE_BIND_ADDR") {
            config.bind_addr = parse_var("HORDE_BIND_ADDR", addr)?;
        }
        if let Some(ms) = lookup("HORDE_HELLO_TIMEOUT_MS") {
            config.hello_timeout = Duration::from_millis(parse_var("HORDE_HELLO_TIMEOUT_MS", ms)?);
        }
        if let Some(ms) = lookup("HORDE_IDLE_TICK_MS") {
            config.idle_tick_interval = Duration::from_millis(parse_var("HORDE_IDLE_TICK_MS", ms)?);
        }
        if let Some(seed) = lookup("HORDE_RNG_SEED") {
            config.rng_seed = Some(parse_var("HORDE_RNG_SEED", seed)?);
        }

        let rates_path = lookup("HORDE_SPAWN_RATES").unwrap_or_else(|| DEFAULT_SPAWN_RATES_FILE.to_string());
        config.spawn_rates = load_spawn_rates(Path::new(&rates_path))?;

        Ok(config)
    }
}

/// Load spawn rates from `path`, or defaults when there is no such file.
pub fn load_spawn_rates(path: &Path) -> Result<SpawnRates, ConfigError> {
    if !path.is_file() {
        return Ok(SpawnRates::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rates = SpawnRates::from_json(&text).map_err(|source| ConfigError::SpawnRates {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Spawn rates loaded from {}: {:?}", path.display(), rates);
    Ok(rates)
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVar { name, value })
}
