use crate::core::errors::ConfigError;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Generation API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub image_model: String,
    pub max_retries: u32,
    /// Timeout for a single generation call. A hung call would otherwise
    /// block the job (and, during a sweep, every job after it) indefinitely.
    pub request_timeout: Duration,
}

/// Export configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Delay between consecutive staggered saves in `export_all`.
    pub download_stagger: Duration,
    /// Directory colorized results are saved into after each batch;
    /// unset disables server-side export.
    pub export_dir: Option<PathBuf>,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub export: ExportConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Ok(Self {
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1420),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            api: ApiConfig {
                api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
                image_model: env::var("IMAGE_MODEL")
                    .unwrap_or_else(|_| "gemini-2.5-flash-image".to_string()),
                max_retries: env::var("MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
                request_timeout: Duration::from_secs(
                    env::var("API_TIMEOUT_SECONDS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(120),
                ),
            },
            export: ExportConfig {
                download_stagger: Duration::from_millis(
                    env::var("DOWNLOAD_STAGGER_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(500),
                ),
                export_dir: env::var("EXPORT_DIR").ok().map(PathBuf::from),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.api_key.trim().is_empty() {
            return Err(ConfigError::NoApiKey);
        }

        if self.api.max_retries > 10 {
            return Err(ConfigError::InvalidMaxRetries(self.api.max_retries));
        }

        if self.api.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "server host must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn api_key(&self) -> &str {
        &self.api.api_key
    }

    pub fn image_model(&self) -> &str {
        &self.api.image_model
    }

    pub fn max_retries(&self) -> u32 {
        self.api.max_retries
    }

    pub fn request_timeout(&self) -> Duration {
        self.api.request_timeout
    }

    pub fn download_stagger(&self) -> Duration {
        self.export.download_stagger
    }

    pub fn export_dir(&self) -> Option<&Path> {
        self.export.export_dir.as_deref()
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors
