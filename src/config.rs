use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::gateway::GatewayConfig;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_DATABASE_URL: &str = "sqlite://storefront.db?mode=rwc";
const DEFAULT_PUBLIC_DIR: &str = "public";
const CONFIG_DIR: &str = "config";

/// eSewa sandbox credentials. Only valid against the test gateway.
pub const SANDBOX_PRODUCT_CODE: &str = "EPAYTEST";
pub const SANDBOX_SECRET_KEY: &str = "8gBm/:&EnhH.1/q";
pub const SANDBOX_FORM_URL: &str = "https://rc-epay.esewa.com.np/api/epay/main/v2/form";

/// Unprefixed variables honored for compatibility with existing deployments.
/// They sit below config files and `APP__*` variables in precedence.
const LEGACY_ENV_KEYS: [(&str, &str); 5] = [
    ("PORT", "port"),
    ("BASE_URL", "base_url"),
    ("ESEWA_PRODUCT_CODE", "esewa_product_code"),
    ("ESEWA_SECRET_KEY", "esewa_secret_key"),
    ("ESEWA_FORM_URL", "esewa_form_url"),
];

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    /// Seed the default catalog when the products table is empty
    #[serde(default = "default_true_bool")]
    pub seed_catalog: bool,

    /// Directory holding the storefront pages and static assets
    #[serde(default = "default_public_dir")]
    pub public_dir: String,

    /// Externally visible base URL used for gateway callbacks
    #[serde(default)]
    #[validate(url)]
    pub base_url: Option<String>,

    /// eSewa merchant product code
    #[validate(length(min = 1, message = "esewa_product_code cannot be empty"))]
    pub esewa_product_code: String,

    /// Shared secret used to sign and verify gateway payloads
    #[validate(length(min = 8, message = "esewa_secret_key must be at least 8 characters"))]
    pub esewa_secret_key: String,

    /// Hosted payment form endpoint
    #[validate(url)]
    pub esewa_form_url: String,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
}

impl AppConfig {
    /// Creates a new configuration with sandbox gateway credentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            seed_catalog: true,
            public_dir: default_public_dir(),
            base_url: None,
            esewa_product_code: SANDBOX_PRODUCT_CODE.to_string(),
            esewa_secret_key: SANDBOX_SECRET_KEY.to_string(),
            esewa_form_url: SANDBOX_FORM_URL.to_string(),
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Base URL without a trailing slash, defaulting to the local listener.
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }

    /// Immutable gateway settings handed to the payment adapter.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            product_code: self.esewa_product_code.clone(),
            secret_key: self.esewa_secret_key.clone(),
            form_url: self.esewa_form_url.clone(),
            base_url: self.base_url(),
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.esewa_secret_key == SANDBOX_SECRET_KEY {
            let mut err = ValidationError::new("esewa_secret_key_sandbox");
            err.message = Some(
                "The sandbox eSewa secret must not be used outside development. Set APP__ESEWA_SECRET_KEY."
                    .into(),
            );
            errors.add("esewa_secret_key", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_public_dir() -> String {
    DEFAULT_PUBLIC_DIR.to_string()
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    8
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults (sandbox gateway, SQLite file database)
/// 2. Legacy unprefixed variables (`PORT`, `BASE_URL`, `ESEWA_*`)
/// 3. Default config (config/default.toml)
/// 4. Environment-specific config (config/{env}.toml)
/// 5. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("esewa_product_code", SANDBOX_PRODUCT_CODE)?
        .set_default("esewa_secret_key", SANDBOX_SECRET_KEY)?
        .set_default("esewa_form_url", SANDBOX_FORM_URL)?;

    for (var, key) in LEGACY_ENV_KEYS {
        if let Ok(value) = env::var(var) {
            if !value.trim().is_empty() {
                builder = builder.set_default(key, value)?;
            }
        }
    }

    let config = builder
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8000,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let mut cfg = base_config();
        cfg.esewa_secret_key = "live-merchant-secret".into();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.esewa_secret_key = "live-merchant-secret".into();
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn production_rejects_sandbox_secret() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        let errors = cfg
            .validate_additional_constraints()
            .expect_err("sandbox secret must be rejected");
        assert!(errors.field_errors().contains_key("esewa_secret_key"));
    }

    #[test]
    fn staging_rejects_sandbox_secret() {
        let mut cfg = base_config();
        cfg.environment = "staging".into();
        cfg.cors_allowed_origins = Some("https://staging.shop.example.com".into());
        let errors = cfg
            .validate_additional_constraints()
            .expect_err("sandbox secret must be rejected outside development");
        assert!(errors.field_errors().contains_key("esewa_secret_key"));
    }

    #[test]
    fn development_allows_sandbox_defaults() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn invalid_log_level_fails_validation() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        let errors = cfg.validate().expect_err("log level must be validated");
        assert!(errors.field_errors().contains_key("log_level"));
    }

    #[test]
    fn base_url_defaults_to_local_listener() {
        let cfg = base_config();
        assert_eq!(cfg.base_url(), "http://localhost:8000");
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let mut cfg = base_config();
        cfg.base_url = Some("https://shop.example.com/".into());
        assert_eq!(cfg.base_url(), "https://shop.example.com");
        assert_eq!(cfg.gateway_config().base_url, "https://shop.example.com");
    }

    #[test]
    fn gateway_config_carries_credentials() {
        let cfg = base_config();
        let gateway = cfg.gateway_config();
        assert_eq!(gateway.product_code, SANDBOX_PRODUCT_CODE);
        assert_eq!(gateway.secret_key, SANDBOX_SECRET_KEY);
        assert_eq!(gateway.form_url, SANDBOX_FORM_URL);
    }
}
