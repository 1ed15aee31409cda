/**
 * Server Configuration
 *
 * Settings are read from the environment (a `.env` file is loaded first)
 * and may be overridden by a TOML file named in `RELAYCHAT_CONFIG`.
 *
 * # Variables
 *
 * - `DATABASE_URL` - required
 * - `SERVER_PORT` - default 3000
 * - `JWT_SECRET` - token signing secret, required in release builds
 * - `BUS_TOPIC_CAPACITY` - events buffered per conversation, default 256
 * - `SESSION_IDLE_CLEANUP_SECS` - idle bus channel sweep, default 300
 *
 * # File overrides
 *
 * ```toml
 * port = 8080
 * bus_topic_capacity = 1024
 * ```
 */

use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::backend::error::BackendError;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BUS_TOPIC_CAPACITY: usize = 256;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
const DEVELOPMENT_JWT_SECRET: &str = "relaychat-development-secret";

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("invalid config file {path}: {message}")]
    InvalidFile { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub bus_topic_capacity: usize,
    pub cleanup_interval_secs: u64,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Load from `.env`, the process environment and the optional file
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(url) = lookup("DATABASE_URL") {
            builder = builder.database_url(url);
        }
        if let Some(port) = lookup("SERVER_PORT") {
            builder = builder.port(parse_var("SERVER_PORT", &port)?);
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            builder = builder.jwt_secret(secret);
        }
        if let Some(capacity) = lookup("BUS_TOPIC_CAPACITY") {
            builder = builder.bus_topic_capacity(parse_var("BUS_TOPIC_CAPACITY", &capacity)?);
        }
        if let Some(secs) = lookup("SESSION_IDLE_CLEANUP_SECS") {
            builder = builder.cleanup_interval_secs(parse_var("SESSION_IDLE_CLEANUP_SECS", &secs)?);
        }
        if let Some(path) = lookup("RELAYCHAT_CONFIG") {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::InvalidFile {
                path: path.clone(),
                message: e.to_string(),
            })?;
            builder = builder.merge_toml(&path, &text)?;
        }

        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingValue("DATABASE_URL"));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SERVER_PORT",
                message: "port must not be 0".to_string(),
            });
        }
        if self.bus_topic_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BUS_TOPIC_CAPACITY",
                message: "capacity must be positive".to_string(),
            });
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_IDLE_CLEANUP_SECS",
                message: "interval must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        message: e.to_string(),
    })
}

/// Values a config file may override
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOverrides {
    database_url: Option<String>,
    port: Option<u16>,
    jwt_secret: Option<String>,
    bus_topic_capacity: Option<usize>,
    cleanup_interval_secs: Option<u64>,
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    database_url: Option<String>,
    port: Option<u16>,
    jwt_secret: Option<String>,
    bus_topic_capacity: Option<usize>,
    cleanup_interval_secs: Option<u64>,
}

impl ServerConfigBuilder {
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    pub fn bus_topic_capacity(mut self, capacity: usize) -> Self {
        self.bus_topic_capacity = Some(capacity);
        self
    }

    pub fn cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.cleanup_interval_secs = Some(secs);
        self
    }

    /// Overlay values from a TOML document
    pub fn merge_toml(mut self, path: &str, text: &str) -> Result<Self, ConfigError> {
        let overrides: FileOverrides = toml::from_str(text).map_err(|e| ConfigError::InvalidFile {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        self.database_url = overrides.database_url.or(self.database_url);
        self.port = overrides.port.or(self.port);
        self.jwt_secret = overrides.jwt_secret.or(self.jwt_secret);
        self.bus_topic_capacity = overrides.bus_topic_capacity.or(self.bus_topic_capacity);
        self.cleanup_interval_secs = overrides.cleanup_interval_secs.or(self.cleanup_interval_secs);
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let database_url = self
            .database_url
            .ok_or(ConfigError::MissingValue("DATABASE_URL"))?;
        let jwt_secret = resolve_jwt_secret(self.jwt_secret, cfg!(debug_assertions))?;

        let config = ServerConfig {
            database_url,
            port: self.port.unwrap_or(DEFAULT_PORT),
            jwt_secret,
            bus_topic_capacity: self.bus_topic_capacity.unwrap_or(DEFAULT_BUS_TOPIC_CAPACITY),
            cleanup_interval_secs: self
                .cleanup_interval_secs
                .unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Fall back to the development secret only when `allow_development` is set
///
/// Debug builds allow it; release builds must be given `JWT_SECRET`.
fn resolve_jwt_secret(
    secret: Option<String>,
    allow_development: bool,
) -> Result<String, ConfigError> {
    match secret {
        Some(secret) if !secret.trim().is_empty() => Ok(secret),
        _ if allow_development => {
            tracing::warn!("JWT_SECRET not set, using the development secret");
            Ok(DEVELOPMENT_JWT_SECRET.to_string())
        }
        _ => Err(ConfigError::MissingValue("JWT_SECRET")),
    }
}

/// Connect the pool and run migrations
///
/// Startup stops on a failed migration.
pub async fn load_database(config: &ServerConfig) -> Result<PgPool, BackendError> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    tracing::info!("Database connection pool created successfully");

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply pending migrations from `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<(), BackendError> {
    sqlx::migrate!().run(pool).await.map_err(|e| {
        tracing::error!("Failed to run database migrations: {}", e);
        BackendError::transient(format!("database migrations failed: {}", e))
    })?;
    tracing::info!("Database migrations completed successfully");
    Ok(())
}
