use crate::error::ConfigError;
use crate::settings::Config;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_logging;
pub use settings::{DatabaseSettings, LoggingSettings};

/// Prefix for environment overrides, e.g. `BAGEL__DATABASE__PASSWORD`.
const ENV_PREFIX: &str = "BAGEL";

/// Loads the application configuration from the `config.toml` file.
///
/// This function is the primary entry point for this crate. It reads the configuration file,
/// deserializes it into our strongly-typed `Config` struct, and returns it.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Loads configuration from `path`, then applies `.env` and `BAGEL__*` environment overrides.
///
/// The file is optional so that a deployment can be configured from the environment alone.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    finish(builder)
}

/// Parses configuration from an in-memory TOML document, without environment overrides.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml));

    finish(builder)
}

fn finish(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<Config, ConfigError> {
    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.build()?.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
