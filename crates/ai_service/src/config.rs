//! Service configuration
//!
//! Settings come from `config/<environment>.toml` when that file exists,
//! otherwise from built-in defaults. Environment variables are applied last.

use crate::ServiceError;
use penguin_ai_core::{
    ArtifactConfig, GcsConfig, LoadOptions, ReferenceCase, DEFAULT_CONFIDENCE_DECIMALS,
    MAX_CONFIDENCE_DECIMALS,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration manager for the prediction service
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ServiceConfig,
    environment: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
    Testing,
}

impl Environment {
    pub fn config_file(&self) -> &'static str {
        match self {
            Environment::Production => "production.toml",
            Environment::Staging => "staging.toml",
            Environment::Testing => "testing.toml",
            Environment::Development => "development.toml",
        }
    }

    fn parse(value: &str) -> Result<Self, ServiceError> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" | "stage" => Ok(Environment::Staging),
            "testing" | "test" => Ok(Environment::Testing),
            "development" | "dev" => Ok(Environment::Development),
            _ => Err(ServiceError::ConfigError(format!(
                "Unknown environment: {value}"
            ))),
        }
    }
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Keep the listener up without a model; `/predict` answers 503
    pub serve_when_unready: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            serve_when_unready: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSettings {
    pub confidence_decimals: u32,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            confidence_decimals: DEFAULT_CONFIDENCE_DECIMALS,
        }
    }
}

/// Full service configuration; every section may be omitted from the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub artifacts: ArtifactConfig,
    pub storage: GcsConfig,
    pub loading: LoadOptions,
    pub prediction: PredictionSettings,
}

impl ServiceConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.prediction.confidence_decimals > MAX_CONFIDENCE_DECIMALS {
            return Err(ServiceError::ConfigError(format!(
                "confidence_decimals must be at most {MAX_CONFIDENCE_DECIMALS}, got {}",
                self.prediction.confidence_decimals
            )));
        }
        if self.storage.timeout_secs == 0 {
            return Err(ServiceError::ConfigError(
                "fetch timeout must be at least one second".to_string(),
            ));
        }
        self.loading
            .bounds
            .validate()
            .map_err(|e| ServiceError::ConfigError(e.to_string()))?;
        // the startup reference prediction must stay inside the accepted ranges
        let canonical = ReferenceCase::canonical();
        self.loading.bounds.check(&canonical.record).map_err(|e| {
            ServiceError::ConfigError(format!(
                "feature bounds exclude the '{}' reference record: {e}",
                canonical.name
            ))
        })?;
        if self.server.host.trim().is_empty() {
            return Err(ServiceError::ConfigError("host must not be empty".to_string()));
        }
        Ok(())
    }
}

impl ConfigManager {
    /// Detect the environment, read its file from `config/` and apply env overrides
    pub fn new() -> Result<Self, ServiceError> {
        let environment = Self::detect_environment(|key| env::var(key).ok())?;
        Self::from_sources(environment, Path::new("config"), |key| env::var(key).ok())
    }

    /// Build from an explicit config directory and variable lookup
    pub fn from_sources(
        environment: Environment,
        config_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ServiceError> {
        let mut config = Self::load_config(environment, config_dir)?;
        Self::apply_overrides(&mut config, lookup);
        config.validate()?;

        Ok(Self {
            config,
            environment,
        })
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Get the current environment
    pub fn get_environment(&self) -> Environment {
        self.environment
    }

    pub fn into_config(self) -> ServiceConfig {
        self.config
    }

    fn detect_environment(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Environment, ServiceError> {
        let env_str = lookup("APP_ENV")
            .or_else(|| lookup("ENVIRONMENT"))
            .unwrap_or_else(|| "development".to_string());
        Environment::parse(&env_str)
    }

    fn load_config(
        environment: Environment,
        config_dir: &Path,
    ) -> Result<ServiceConfig, ServiceError> {
        let path = config_dir.join(environment.config_file());
        if path.exists() {
            Self::load_config_from_file(&path)
        } else {
            Ok(ServiceConfig::default())
        }
    }

    /// Load configuration from TOML file
    fn load_config_from_file(path: &Path) -> Result<ServiceConfig, ServiceError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServiceError::Io(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            ServiceError::SerializationError(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    fn apply_overrides(config: &mut ServiceConfig, lookup: impl Fn(&str) -> Option<String>) {
        let text = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = lookup("GCS_BUCKET_NAME") {
            let trimmed = value.trim();
            config.artifacts.bucket = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        if let Some(value) = text("GCS_MODEL_PATH") {
            config.artifacts.model_object = value;
        }
        if let Some(value) = text("GCS_METADATA_PATH") {
            config.artifacts.metadata_object = value;
        }
        if let Some(value) = text("LOCAL_MODEL_PATH") {
            config.artifacts.local_model_path = Some(PathBuf::from(value));
        }
        if let Some(value) = text("LOCAL_METADATA_PATH") {
            config.artifacts.local_metadata_path = Some(PathBuf::from(value));
        }

        if let Some(value) = text("GCS_ENDPOINT") {
            config.storage.endpoint = value;
        }
        if let Some(value) = text("GCS_ACCESS_TOKEN") {
            config.storage.access_token = Some(value);
        }
        if let Some(value) = text("GOOGLE_APPLICATION_CREDENTIALS") {
            config.storage.credentials_file = Some(PathBuf::from(value));
        }
        if let Some(parsed) = text("FETCH_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.storage.timeout_secs = parsed;
        }

        if let Some(parsed) = text("FETCH_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
            config.loading.retry.retries = parsed;
        }
        if let Some(parsed) = text("REQUIRE_INTEGRITY").and_then(|v| Self::parse_bool(&v)) {
            config.loading.require_integrity = parsed;
        }

        if let Some(parsed) = text("CONFIDENCE_DECIMALS").and_then(|v| v.parse::<u32>().ok()) {
            config.prediction.confidence_decimals = parsed;
        }

        if let Some(value) = text("HOST") {
            config.server.host = value;
        }
        if let Some(parsed) = text("PORT").and_then(|v| v.parse::<u16>().ok()) {
            config.server.port = parsed;
        }
        if let Some(parsed) = text("SERVE_WHEN_UNREADY").and_then(|v| Self::parse_bool(&v)) {
            config.server.serve_when_unready = parsed;
        }
    }

    fn parse_bool(value: &str) -> Option<bool> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("true")
            || value.eq_ignore_ascii_case("yes")
            || value.eq_ignore_ascii_case("y")
            || value == "1"
        {
            Some(true)
        } else if value.eq_ignore_ascii_case("false")
            || value.eq_ignore_ascii_case("no")
            || value.eq_ignore_ascii_case("n")
            || value == "0"
        {
            Some(false)
        } else {
            None
        }
    }
}
