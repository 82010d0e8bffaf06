//! # Configuration Module
//!
//! Loads spectest's settings from `spectest.toml` and the environment.
//!
//! ```text
//! +-------------------+     +-------------------+     +-------------------+
//! | SPECTEST_CONFIG   | --> | Path resolution   | --> | spectest.toml     |
//! | (optional)        |     | or default ./     |     | (optional)        |
//! +-------------------+     +-------------------+     +-------------------+
//!                                                              |
//!                                                              v
//! +-------------------+     +-------------------+     +-------------------+
//! | .env + process    | --> | SPECTEST_* keys   | --> | Config            |
//! | environment       |     | override the file |     | [engine]          |
//! +-------------------+     +-------------------+     +-------------------+
//! ```
//!
//! ## Config File Location
//!
//! 1. If `SPECTEST_CONFIG` is set, load from that path. The file must exist.
//! 2. Otherwise, load `spectest.toml` from the current directory. A missing file
//!    means defaults.
//!
//! ## Configuration Structure
//!
//! ```toml
//! [engine]
//! queue_capacity = 1000
//! wait_timeout = "5s"
//! request_timeout = "30s"
//! mask_sensitive = true
//! ```
//!
//! Every engine key can be overridden with `SPECTEST_<KEY>`, e.g.
//! `SPECTEST_WAIT_TIMEOUT=500ms`.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::{io::Read, path::Path, str::FromStr, time::Duration};
use tracing::*;

use crate::{queue, Error, Result};

/// Environment variable name for specifying the config file path.
const SPECTEST_CONFIG_ENV: &str = "SPECTEST_CONFIG";
const ENV_PREFIX: &str = "SPECTEST_";

static CONFIG: Lazy<Config> = Lazy::new(|| {
    let _ = dotenv::dotenv();
    Config::load().unwrap_or_else(|e| {
        error!("{e}; falling back to the default configuration");
        Config::default()
    })
});

/// Process-wide configuration, loaded on first use.
pub fn get_config() -> &'static Config {
    &CONFIG
}

/// spectest's configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Runs allowed to wait per target URL.
    pub queue_capacity: usize,
    /// How long a caller waits for a run before getting a pending handle.
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Duration,
    /// Transport timeout of a single HTTP request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Mask credentials in logged URLs and headers.
    pub mask_sensitive: bool,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            queue_capacity: queue::DEFAULT_CAPACITY,
            wait_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            mask_sensitive: true,
        }
    }
}

impl Config {
    /// Load configuration from `path`, then apply environment overrides. A missing
    /// file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Config> {
        let mut cfg = match std::fs::File::open(path) {
            Ok(mut file) => {
                let mut buf = String::new();
                file.read_to_string(&mut buf)
                    .map_err(|e| Error::LoadError(e.to_string()))?;
                let cfg: Config = toml::from_str(&buf).map_err(|e| {
                    Error::LoadError(format!("failed to deserialize {path:?}: {e}"))
                })?;
                debug!("{path:?} was successfully loaded: {cfg:#?}");
                cfg
            }
            Err(_) => {
                debug!("{path:?} not found, using defaults");
                Config::default()
            }
        };

        cfg.load_env()?;
        Ok(cfg)
    }

    /// Load configuration from `SPECTEST_CONFIG` or `./spectest.toml`.
    pub fn load() -> Result<Config> {
        match std::env::var(SPECTEST_CONFIG_ENV) {
            Ok(path) => {
                let path = Path::new(&path);

                if !looks_like_path(path) {
                    return Err(Error::LoadError(format!(
                        "{SPECTEST_CONFIG_ENV} should be a path to a config file, not a config value. \
                         Got: {path:?}. Use {ENV_PREFIX}<KEY>=value for config values instead."
                    )));
                }

                if !path.exists() {
                    return Err(Error::LoadError(format!(
                        "Config file specified by {SPECTEST_CONFIG_ENV} not found: {path:?}"
                    )));
                }

                debug!("Loading config from {SPECTEST_CONFIG_ENV}={path:?}");
                Config::load_from(path)
            }
            Err(_) => Config::load_from(Path::new("spectest.toml")),
        }
    }

    /// Apply `SPECTEST_<KEY>` overrides on top of the loaded values.
    fn load_env(&mut self) -> Result<()> {
        let engine = &mut self.engine;
        if let Some(capacity) = env_value::<usize>("queue_capacity")? {
            engine.queue_capacity = capacity;
        }
        if let Some(timeout) = env_duration("wait_timeout")? {
            engine.wait_timeout = timeout;
        }
        if let Some(timeout) = env_duration("request_timeout")? {
            engine.request_timeout = timeout;
        }
        if let Some(mask) = env_value::<bool>("mask_sensitive")? {
            engine.mask_sensitive = mask;
        }
        debug!("spectest configuration after env overrides: {self:#?}");
        Ok(())
    }
}

fn looks_like_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
        || path.to_string_lossy().contains(std::path::MAIN_SEPARATOR)
        || path.to_string_lossy().contains('/')
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{}", key.to_uppercase())).ok()
}

fn env_value<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_var(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::ValueError(eyre::Error::new(e).wrap_err(key.to_string())))
        })
        .transpose()
}

fn env_duration(key: &str) -> Result<Option<Duration>> {
    env_var(key)
        .map(|raw| {
            humantime_serde::re::humantime::parse_duration(raw.trim())
                .map_err(|e| Error::ValueError(eyre::Error::new(e).wrap_err(key.to_string())))
        })
        .transpose()
}
