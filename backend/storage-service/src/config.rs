//! Configuration for the storage service
//!
//! Everything comes from `PASSWORDEXCHANGE_*` environment variables, with a
//! `.env` file honoured in debug builds.

use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Messages without an explicit expiry live this long
pub const DEFAULT_TTL_HOURS: i64 = 168;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub retention: RetentionSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Self {
            database: DatabaseSettings::from_env()?,
            server: ServerSettings::from_env()?,
            retention: RetentionSettings::from_env()?,
        })
    }
}

/// PostgreSQL connection settings
#[derive(Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("PASSWORDEXCHANGE_DBHOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("PASSWORDEXCHANGE_DBPORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()
                .context("Invalid PASSWORDEXCHANGE_DBPORT")?,
            user: env::var("PASSWORDEXCHANGE_DBUSER")
                .context("PASSWORDEXCHANGE_DBUSER must be set")?,
            password: env::var("PASSWORDEXCHANGE_DBPASS")
                .context("PASSWORDEXCHANGE_DBPASS must be set")?,
            name: env::var("PASSWORDEXCHANGE_DBNAME")
                .unwrap_or_else(|_| "passwordexchange".to_string()),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            acquire_timeout_secs: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
            connect_timeout_secs: env::var("DATABASE_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid DATABASE_CONNECTION_TIMEOUT")?,
        })
    }

    pub fn connect_options(&self) -> sqlx::postgres::PgConnectOptions {
        sqlx::postgres::PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub grpc_port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("GRPC_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            grpc_port: env::var("GRPC_PORT")
                .unwrap_or_else(|_| "50051".to_string())
                .parse()
                .context("Invalid GRPC_PORT")?,
        })
    }
}

/// Expiry bounds and the cleanup cadence
#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub default_ttl_hours: i64,
    pub max_expiration_hours: i64,
    pub cleanup_interval: Duration,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            default_ttl_hours: DEFAULT_TTL_HOURS,
            max_expiration_hours: 720,
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl RetentionSettings {
    fn from_env() -> Result<Self> {
        let max_expiration_hours: i64 = env::var("PASSWORDEXCHANGE_MAXEXPIRATIONHOURS")
            .unwrap_or_else(|_| "720".to_string())
            .parse()
            .context("Invalid PASSWORDEXCHANGE_MAXEXPIRATIONHOURS")?;
        if max_expiration_hours < DEFAULT_TTL_HOURS {
            bail!(
                "PASSWORDEXCHANGE_MAXEXPIRATIONHOURS must be at least {}",
                DEFAULT_TTL_HOURS
            );
        }

        let cleanup_interval_secs: u64 = env::var("CLEANUP_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .context("Invalid CLEANUP_INTERVAL_SECS")?;

        Ok(Self {
            default_ttl_hours: DEFAULT_TTL_HOURS,
            max_expiration_hours,
            cleanup_interval: Duration::from_secs(cleanup_interval_secs.max(1)),
        })
    }
}
