//! Agent configuration
//! Handles environment variable loading, validation, and defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the portal agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub portal: PortalConfig,
    pub poller: PollerSettings,
    pub monitor: MonitorSettings,
    /// Where persisted session state lives on disk.
    pub state_path: PathBuf,
}

/// Backend connectivity settings. A single base URL selects the backend
/// host per deployment environment.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

/// Payment-status polling settings.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Session monitoring settings.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// How often the session status endpoint is re-checked.
    pub status_interval: Duration,
    /// Heartbeat cadence used when the backend does not specify one.
    pub heartbeat_fallback: Duration,
    /// Consecutive heartbeat failures before the condition is surfaced.
    pub heartbeat_failure_threshold: u32,
}

impl AgentConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults observed in production.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        Ok(AgentConfig {
            portal: PortalConfig::from_env()?,
            poller: PollerSettings::from_env()?,
            monitor: MonitorSettings::from_env()?,
            state_path: env::var("PORTAL_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("portal-state.json")),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.portal.validate()?;
        self.poller.validate()?;
        self.monitor.validate()?;
        Ok(())
    }
}

impl PortalConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PortalConfig {
            base_url: env::var("PORTAL_BASE_URL")
                .map_err(|_| ConfigError::MissingVariable("PORTAL_BASE_URL".to_string()))?,
            request_timeout: Duration::from_secs(parse_var("PORTAL_REQUEST_TIMEOUT_SECS", 10)?),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue(
                "PORTAL_BASE_URL cannot be empty".to_string(),
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PORTAL_BASE_URL must be a valid URL".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PORTAL_REQUEST_TIMEOUT_SECS cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl PollerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PollerSettings {
            interval: Duration::from_millis(parse_var("PAYMENT_POLL_INTERVAL_MS", 3000)?),
            max_attempts: parse_var("PAYMENT_POLL_MAX_ATTEMPTS", 60u32)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_INTERVAL_MS cannot be 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_MAX_ATTEMPTS cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl MonitorSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(MonitorSettings {
            status_interval: Duration::from_secs(parse_var("SESSION_STATUS_INTERVAL_SECS", 30)?),
            heartbeat_fallback: Duration::from_secs(parse_var("HEARTBEAT_FALLBACK_SECS", 60)?),
            heartbeat_failure_threshold: parse_var("HEARTBEAT_FAILURE_THRESHOLD", 3u32)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "SESSION_STATUS_INTERVAL_SECS cannot be 0".to_string(),
            ));
        }
        if self.heartbeat_fallback.is_zero() {
            return Err(ConfigError::InvalidValue(
                "HEARTBEAT_FALLBACK_SECS cannot be 0".to_string(),
            ));
        }
        if self.heartbeat_failure_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "HEARTBEAT_FAILURE_THRESHOLD cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(format!("{name} is not a valid number: {raw}"))
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}
