use std::env;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    pub auto_migrate: bool,
    pub db_max_connections: u32,
    /// Tax rate applied for tenants without an explicit override,
    /// e.g. 0.19 for 19%.
    pub default_tax_rate: Decimal,
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// file, and `APP__*` environment variables, in that order of precedence.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
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

    let config = Config::builder()
        .set_default("database_url", "sqlite://salespoint.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("auto_migrate", true)?
        .set_default("db_max_connections", 10)?
        .set_default("default_tax_rate", "0.19")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("salespoint_api={},tower_http=info", level);
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

/// Per-tenant settings consumed by the order total calculator.
///
/// The tax rate is always tenant-scoped: tenants without an override fall
/// back to the configured default, never to a hard-coded constant.
#[derive(Debug)]
pub struct TenantSettings {
    default_tax_rate: Decimal,
    tax_rates: DashMap<Uuid, Decimal>,
}

impl TenantSettings {
    pub fn new(default_tax_rate: Decimal) -> Self {
        Self {
            default_tax_rate,
            tax_rates: DashMap::new(),
        }
    }

    pub fn tax_rate(&self, tenant_id: Uuid) -> Decimal {
        self.tax_rates
            .get(&tenant_id)
            .map(|r| *r)
            .unwrap_or(self.default_tax_rate)
    }

    pub fn set_tax_rate(&self, tenant_id: Uuid, rate: Decimal) {
        self.tax_rates.insert(tenant_id, rate);
    }
}
