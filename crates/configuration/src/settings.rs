use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseSettings,
    #[serde(default)] // Use default values if the [logging] section is missing
    pub logging: LoggingSettings,
}

impl Config {
    /// Checks the values that deserialization alone cannot reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection parameters for the MySQL server that holds the market data tables.
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Never printed; `Debug` shows `[REDACTED]`.
    pub password: SecretString,
    /// The schema name (e.g., "tushare").
    pub database: String,
    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a query waits for a free connection before failing.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("database.host", &self.host),
            ("database.user", &self.user),
            ("database.database", &self.database),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{key} must not be empty")));
            }
        }
        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "database.port must be non-zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The password in clear text, for handing to the driver only.
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// Where and how verbosely the application logs.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive such as "info" or "database=debug".
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_level")]
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "bagelfactor.log".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}
