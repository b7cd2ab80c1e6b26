//! Link configuration using Figment.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (`LinkConfig::default()`)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `ROBOT_LINK_`, nested keys separated
//!    by `__` (e.g. `ROBOT_LINK_DEVICE__PORT=9000`)
//!
//! Durations use human-readable strings (`"10ms"`, `"5s"`).
//!
//! # Example
//! ```no_run
//! use robot_link::config::LinkConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LinkConfig::load_from("config/robot_link.toml")?;
//! config.validate()?;
//! println!("Controller at {}", config.device.addr());
//! # Ok(())
//! # }
//! ```

use crate::error::{LinkError, ValidationError};
use crate::logging::LogFormat;
use crate::recovery::RetryPolicy;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "ROBOT_LINK_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Where the controller listens and how long to wait on it.
    pub device: DeviceConfig,
    /// Per-timestep pacing.
    pub session: SessionConfig,
    /// Recovery policy for per-timestep exchanges.
    pub retry: RetryPolicy,
    /// Recovery policy for the end-of-session frame.
    pub close_retry: RetryPolicy,
    /// Log level and output format.
    pub logging: LoggingConfig,
}

/// Controller endpoint and transport timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Controller host name or IP address.
    pub host: String,
    /// Controller TCP port.
    pub port: u16,
    /// Timeout for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout applied to each frame send and receive.
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "10.0.0.11".to_string(),
            port: 8080,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
        }
    }
}

impl DeviceConfig {
    /// `host:port` string suitable for dialling.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Session timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sleep between a recorded timestep and the next send.
    #[serde(with = "humantime_serde")]
    pub pacing: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(10),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LinkConfig {
    /// Defaults overridden by `ROBOT_LINK_*` environment variables.
    pub fn load() -> Result<Self, LinkError> {
        Ok(Self::base_figment()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Defaults, then the TOML file at `path`, then environment variables.
    ///
    /// A missing file is not an error; its layer is simply empty.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, LinkError> {
        Ok(Self::base_figment()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    fn base_figment() -> Figment {
        Figment::from(Serialized::defaults(LinkConfig::default()))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.device.host.trim().is_empty() {
            return Err(ValidationError::InvalidConfig(
                "device.host must not be empty".into(),
            ));
        }
        if self.device.port == 0 {
            return Err(ValidationError::InvalidConfig(
                "device.port must be non-zero".into(),
            ));
        }
        if self.device.connect_timeout.is_zero() || self.device.io_timeout.is_zero() {
            return Err(ValidationError::InvalidConfig(
                "device timeouts must be greater than zero".into(),
            ));
        }
        for (name, policy) in [("retry", &self.retry), ("close_retry", &self.close_retry)] {
            if policy.max_attempts == Some(0) {
                return Err(ValidationError::InvalidConfig(format!(
                    "{name}.max_attempts must be at least 1 when set"
                )));
            }
        }
        crate::logging::parse_log_level(&self.logging.level)
            .map_err(ValidationError::InvalidConfig)?;
        Ok(())
    }
}
