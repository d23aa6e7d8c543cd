//! Configuration for the `fhirkit` binary
//!
//! Values are layered: built-in defaults, then an optional `fhirkit.toml`
//! (or the file given with `--config`), then `FHIRKIT__`-prefixed environment
//! variables such as `FHIRKIT__LOGGING__LEVEL=debug`. A `.env` file in the
//! working directory is loaded before the environment is read.

use std::path::{Path, PathBuf};

use config::{ConfigError, Environment, File};
use serde::Deserialize;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub codec: CodecConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub pretty: bool,
    /// StructureDefinition bundles replacing the embedded R4 schema
    pub definitions: Vec<PathBuf>,
}

impl Config {
    /// Load configuration, reading `path` instead of `fhirkit.toml` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // A missing .env is not an error
        let _ = dotenvy::dotenv();
        Self::load_without_dotenv(path)
    }

    fn load_without_dotenv(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("fhirkit").required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("FHIRKIT")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("codec.definitions")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            ));
        }
        Ok(())
    }
}
