//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use documind_core::ModelCatalog;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When unset, sessions live in process memory only.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub fast_model: String,
    pub pro_model: String,
    pub thinking_budget: u32,
    pub temperature: Option<f32>,
    pub backend_timeout: Duration,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:3000"))?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generative Backend Settings ---
        let gemini_api_key = lookup("GEMINI_API_KEY");
        let gemini_base_url = var_or(
            "GEMINI_BASE_URL",
            "https://generativelanguage.googleapis.com/v1beta",
        );
        let defaults = ModelCatalog::default();
        let fast_model = var_or("FAST_MODEL", &defaults.fast_model);
        let pro_model = var_or("PRO_MODEL", &defaults.pro_model);

        let thinking_budget: u32 = match lookup("THINKING_BUDGET") {
            Some(raw) => parse_var("THINKING_BUDGET", &raw)?,
            None => defaults.thinking_budget,
        };
        if thinking_budget == 0 {
            return Err(ConfigError::InvalidValue(
                "THINKING_BUDGET".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let temperature = lookup("TEMPERATURE")
            .map(|raw| parse_var::<f32>("TEMPERATURE", &raw))
            .transpose()?;

        let backend_timeout_secs: u64 = parse_var(
            "BACKEND_TIMEOUT_SECS",
            &var_or("BACKEND_TIMEOUT_SECS", "120"),
        )?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            gemini_api_key,
            gemini_base_url,
            fast_model,
            pro_model,
            thinking_budget,
            temperature,
            backend_timeout: Duration::from_secs(backend_timeout_secs),
            cors_origin,
        })
    }

    /// The model names and generation knobs handed to the orchestrator.
    pub fn model_catalog(&self) -> ModelCatalog {
        ModelCatalog {
            fast_model: self.fast_model.clone(),
            pro_model: self.pro_model.clone(),
            thinking_budget: self.thinking_budget,
            temperature: self.temperature,
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
