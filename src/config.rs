//! Configuration management for vidsnap
//!
//! Settings are read from a TOML file with one section per layer. Every
//! section and field is optional; missing values fall back to the defaults in
//! `constants`. Durations are written in humantime form (`"13s"`, `"250ms"`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::app::extractor::FinalizeConfig;
use crate::app::session::SessionConfig;
use crate::app::transport::TransportConfig;
use crate::constants::{env, finalize, http, limits, session};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shared HTTP client and transport settings
    pub transport: TransportToml,
    /// Per-attempt session settings
    pub session: SessionToml,
    /// Size enrichment settings
    pub finalize: FinalizeToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Enable HTTP/2 support
    pub http2: bool,
    /// TCP keep-alive interval (absent = disabled)
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout (absent = no timeout)
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_per_host: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Requests per second across all attempts
    pub rate_limit_rps: u32,
    pub max_redirects: usize,
    /// Retries after a transient fault
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_jitter: Duration,
    pub user_agent: String,
}

impl Default for TransportToml {
    fn default() -> Self {
        Self {
            http2: false,
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_redirects: http::MAX_REDIRECTS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            retry_jitter: Duration::from_millis(limits::RETRY_JITTER_MS),
            user_agent: http::USER_AGENT.to_string(),
        }
    }
}

/// TOML-friendly session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Upper bound of every network phase
    #[serde(with = "humantime_serde")]
    pub phase_timeout: Duration,
}

impl Default for SessionToml {
    fn default() -> Self {
        Self {
            phase_timeout: session::PHASE_TIMEOUT,
        }
    }
}

/// TOML-friendly finalize configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizeToml {
    pub max_concurrent_probes: usize,
}

impl Default for FinalizeToml {
    fn default() -> Self {
        Self {
            max_concurrent_probes: finalize::MAX_CONCURRENT_PROBES,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level, overridden by `VIDSNAP_LOG`
    pub level: String,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            colored_output: true,
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to validated runtime configuration
    pub fn to_runtime_config(&self) -> ConfigResult<(TransportConfig, SessionConfig, FinalizeConfig)> {
        let transport = self.transport.to_runtime_config();
        transport.validate()?;

        let session = self.session.to_runtime_config()?;
        let finalize = self.finalize.to_runtime_config()?;
        Ok((transport, session, finalize))
    }

    /// Load configuration
    ///
    /// An explicitly named file must exist. Without one, `./vidsnap.toml` and
    /// then the user config directory are searched; if neither exists the
    /// defaults are used.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let path = match config_file_override {
            Some(path) if path.exists() => Some(path),
            Some(path) => return Err(ConfigError::NotFound { path }),
            None => Self::find_config_file(),
        };

        match path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Render the defaults as a commented TOML document
    pub fn default_config_content() -> ConfigResult<String> {
        let body = toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            value: "defaults".to_string(),
            reason: e.to_string(),
        })?;
        Ok(format!(
            "# vidsnap configuration\n# Durations use humantime syntax, e.g. \"13s\" or \"250ms\".\n\n{}",
            body
        ))
    }

    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from("./vidsnap.toml")];
        if let Some(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        search_paths.into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// User config file location, when the platform has a config directory
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vidsnap").join("config.toml"))
    }

    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }
}

impl TransportToml {
    pub fn to_runtime_config(&self) -> TransportConfig {
        TransportConfig {
            http2: self.http2,
            tcp_keepalive: self.tcp_keepalive,
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout,
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            rate_limit_rps: self.rate_limit_rps,
            max_redirects: self.max_redirects,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            retry_jitter: self.retry_jitter,
            user_agent: self.user_agent.clone(),
        }
    }
}

impl SessionToml {
    pub fn to_runtime_config(&self) -> ConfigResult<SessionConfig> {
        if self.phase_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "session.phase_timeout".to_string(),
                value: "0s".to_string(),
                reason: "Phase timeout must be positive".to_string(),
            });
        }
        Ok(SessionConfig {
            phase_timeout: self.phase_timeout,
        })
    }
}

impl FinalizeToml {
    pub fn to_runtime_config(&self) -> ConfigResult<FinalizeConfig> {
        if self.max_concurrent_probes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "finalize.max_concurrent_probes".to_string(),
                value: "0".to_string(),
                reason: "At least one probe must be allowed in flight".to_string(),
            });
        }
        Ok(FinalizeConfig {
            max_concurrent_probes: self.max_concurrent_probes,
        })
    }
}

/// Install the global tracing subscriber
///
/// `VIDSNAP_LOG` takes precedence over the configured level. A second call
/// leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_env(env::LOG_FILTER)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.colored_output)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        debug!("Logging initialized at level {}", config.level);
    }
}
