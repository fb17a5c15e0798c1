//! Frontend configuration
//!
//! `PASSWORDEXCHANGE_RUNNINGENVIRONMENT` selects between the `prod` and `dev`
//! host and RPC endpoint variables; everything else has a default.

use anyhow::{bail, Context, Result};
use message_queue::AmqpSettings;
use std::env;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use tracing::info;

/// Used when neither the request nor the environment sets a view cap
pub const DEFAULT_MAX_VIEW_COUNT: i32 = 10;

/// Lifetime of a message submitted without an explicit expiration
pub const DEFAULT_EXPIRATION_HOURS: i64 = 168;

pub const DEFAULT_BCRYPT_COST: u32 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningEnvironment {
    Prod,
    Dev,
}

impl std::str::FromStr for RunningEnvironment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Self::Prod),
            "dev" | "development" => Ok(Self::Dev),
            other => bail!("unknown running environment {:?} (expected prod or dev)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: RunningEnvironment,
    pub server: ServerSettings,
    pub services: ServiceEndpoints,
    pub messages: MessageSettings,
    pub turnstile: TurnstileSettings,
    pub amqp: AmqpSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        let environment: RunningEnvironment = env::var("PASSWORDEXCHANGE_RUNNINGENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .context("Invalid PASSWORDEXCHANGE_RUNNINGENVIRONMENT")?;

        Ok(Self {
            environment,
            server: ServerSettings::from_env(environment)?,
            services: ServiceEndpoints::from_env(environment)?,
            messages: MessageSettings::from_env()?,
            turnstile: TurnstileSettings::from_env(),
            amqp: AmqpSettings::from_env()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub http_port: u16,
    /// Public origin used to build decrypt URLs, without a trailing slash
    pub base_url: String,
    pub request_timeout: Duration,
    /// Reverse proxies whose `X-Forwarded-For` is believed
    pub trusted_proxies: Vec<IpAddr>,
}

impl ServerSettings {
    fn from_env(environment: RunningEnvironment) -> Result<Self> {
        let base_url = match environment {
            RunningEnvironment::Prod => env::var("PASSWORDEXCHANGE_PRODHOST")
                .unwrap_or_else(|_| "https://password.exchange".to_string()),
            RunningEnvironment::Dev => env::var("PASSWORDEXCHANGE_DEVHOST")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
        };

        Ok(Self {
            host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(
                env::var("HTTP_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid HTTP_REQUEST_TIMEOUT_SECS")?,
            ),
            trusted_proxies: parse_proxies(
                &env::var("PASSWORDEXCHANGE_TRUSTED_PROXIES").unwrap_or_default(),
            )
            .context("Invalid PASSWORDEXCHANGE_TRUSTED_PROXIES")?,
        })
    }
}

/// Comma separated IP addresses; empty means no proxy is trusted
fn parse_proxies(raw: &str) -> Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpAddr>()
                .with_context(|| format!("not an IP address: {:?}", entry))
        })
        .collect()
}

/// Storage and Encryption RPC endpoints
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub storage_url: String,
    pub encryption_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ServiceEndpoints {
    fn from_env(environment: RunningEnvironment) -> Result<Self> {
        let (storage, encryption) = match environment {
            RunningEnvironment::Prod => (
                env::var("PASSWORDEXCHANGE_DATABASEPRODSERVICE")
                    .unwrap_or_else(|_| "storage-service:50051".to_string()),
                env::var("PASSWORDEXCHANGE_ENCRYPTIONPRODSERVICE")
                    .unwrap_or_else(|_| "encryption-service:50051".to_string()),
            ),
            RunningEnvironment::Dev => (
                env::var("PASSWORDEXCHANGE_DATABASEDEVSERVICE")
                    .unwrap_or_else(|_| "localhost:50051".to_string()),
                env::var("PASSWORDEXCHANGE_ENCRYPTIONDEVSERVICE")
                    .unwrap_or_else(|_| "localhost:50052".to_string()),
            ),
        };

        Ok(Self {
            storage_url: with_scheme(&storage),
            encryption_url: with_scheme(&encryption),
            connect_timeout: Duration::from_secs(
                env::var("GRPC_CONNECT_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("Invalid GRPC_CONNECT_TIMEOUT_SECS")?,
            ),
            request_timeout: Duration::from_secs(
                env::var("GRPC_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("Invalid GRPC_REQUEST_TIMEOUT_SECS")?,
            ),
        })
    }
}

/// Endpoints are configured as `host:port`; tonic wants a URI
fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

#[derive(Debug, Clone)]
pub struct MessageSettings {
    pub default_max_view_count: i32,
    pub max_expiration_hours: i64,
    pub bcrypt_cost: u32,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            default_max_view_count: DEFAULT_MAX_VIEW_COUNT,
            max_expiration_hours: 720,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl MessageSettings {
    fn from_env() -> Result<Self> {
        let default_max_view_count: i32 = env::var("PASSWORDEXCHANGE_DEFAULTMAXVIEWCOUNT")
            .unwrap_or_else(|_| DEFAULT_MAX_VIEW_COUNT.to_string())
            .parse()
            .context("Invalid PASSWORDEXCHANGE_DEFAULTMAXVIEWCOUNT")?;
        if !(1..=100).contains(&default_max_view_count) {
            bail!(
                "PASSWORDEXCHANGE_DEFAULTMAXVIEWCOUNT must be between 1 and 100, got {}",
                default_max_view_count
            );
        }

        let max_expiration_hours: i64 = env::var("PASSWORDEXCHANGE_MAXEXPIRATIONHOURS")
            .unwrap_or_else(|_| "720".to_string())
            .parse()
            .context("Invalid PASSWORDEXCHANGE_MAXEXPIRATIONHOURS")?;
        if max_expiration_hours < DEFAULT_EXPIRATION_HOURS {
            bail!(
                "PASSWORDEXCHANGE_MAXEXPIRATIONHOURS must be at least {}, got {}",
                DEFAULT_EXPIRATION_HOURS,
                max_expiration_hours
            );
        }

        let bcrypt_cost: u32 = env::var("BCRYPT_COST")
            .unwrap_or_else(|_| DEFAULT_BCRYPT_COST.to_string())
            .parse()
            .context("Invalid BCRYPT_COST")?;
        if !(4..=31).contains(&bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {}", bcrypt_cost);
        }

        Ok(Self {
            default_max_view_count,
            max_expiration_hours,
            bcrypt_cost,
        })
    }
}

#[derive(Clone, Default)]
pub struct TurnstileSettings {
    /// Verification is skipped entirely when unset
    pub secret: Option<String>,
    /// Public widget key rendered into the home page form
    pub site_key: Option<String>,
}

impl TurnstileSettings {
    fn from_env() -> Self {
        Self {
            secret: env::var("PASSWORDEXCHANGE_TURNSTILE_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            site_key: env::var("PASSWORDEXCHANGE_TURNSTILE_SITEKEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

impl fmt::Debug for TurnstileSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnstileSettings")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("site_key", &self.site_key)
            .finish()
    }
}
