//! Notification service configuration
//!
//! One typed record loaded at startup; every range is checked before any
//! worker or scheduler starts.

use anyhow::{bail, Context, Result};
use message_queue::AmqpSettings;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_INITIAL_TEMPLATE: &str = "/templates/email_template.html";
pub const DEFAULT_REMINDER_TEMPLATE: &str = "/templates/reminder_email_template.html";

#[derive(Debug, Clone)]
pub struct Settings {
    pub smtp: SmtpSettings,
    pub amqp: AmqpSettings,
    pub reminder: ReminderSettings,
    pub consumer: ConsumerSettings,
    pub storage: StorageEndpoint,
    pub templates: TemplatePaths,
    pub http: HttpSettings,
    /// Public site root linked from every email
    pub site_url: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Self {
            smtp: SmtpSettings::from_env()?,
            amqp: AmqpSettings::from_env()?,
            reminder: ReminderSettings::from_env()?,
            consumer: ConsumerSettings::from_env()?,
            storage: StorageEndpoint::from_env()?,
            templates: TemplatePaths::from_env(),
            http: HttpSettings::from_env()?,
            site_url: site_url(),
        })
    }
}

fn site_url() -> String {
    match env::var("PASSWORDEXCHANGE_PRODHOST") {
        Ok(host) if !host.trim().is_empty() => format!("https://{}", host.trim()),
        _ => "https://password.exchange".to_string(),
    }
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Server `From:` address
    pub from_email: String,
    /// Server `From:` display name
    pub from_name: String,
    /// Bound on a single send, dial and auth included
    pub timeout: Duration,
}

impl SmtpSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("PASSWORDEXCHANGE_EMAILHOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("PASSWORDEXCHANGE_EMAILPORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .context("Invalid PASSWORDEXCHANGE_EMAILPORT")?,
            user: env::var("PASSWORDEXCHANGE_EMAILUSER").unwrap_or_default(),
            password: env::var("PASSWORDEXCHANGE_EMAILPASS").unwrap_or_default(),
            from_email: env::var("PASSWORDEXCHANGE_EMAILFROM")
                .unwrap_or_else(|_| "server@password.exchange".to_string()),
            from_name: env::var("PASSWORDEXCHANGE_EMAILFROMNAME")
                .unwrap_or_else(|_| "Password Exchange".to_string()),
            timeout: Duration::from_secs(
                env::var("SMTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid SMTP_TIMEOUT_SECS")?,
            ),
        })
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSettings {
    pub enabled: bool,
    /// Minimum message age before the first reminder
    pub check_after_hours: i32,
    pub max_reminders: i32,
    /// Minimum gap between reminders for one message
    pub reminder_interval_hours: i32,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_after_hours: 24,
            max_reminders: 3,
            reminder_interval_hours: 24,
        }
    }
}

impl ReminderSettings {
    fn from_env() -> Result<Self> {
        let settings = Self {
            enabled: env::var("PASSWORDEXCHANGE_REMINDER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("Invalid PASSWORDEXCHANGE_REMINDER_ENABLED")?,
            check_after_hours: env::var("PASSWORDEXCHANGE_REMINDER_CHECKAFTERHOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("Invalid PASSWORDEXCHANGE_REMINDER_CHECKAFTERHOURS")?,
            max_reminders: env::var("PASSWORDEXCHANGE_REMINDER_MAXREMINDERS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid PASSWORDEXCHANGE_REMINDER_MAXREMINDERS")?,
            reminder_interval_hours: env::var("PASSWORDEXCHANGE_REMINDER_REMINDERINTERVAL")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("Invalid PASSWORDEXCHANGE_REMINDER_REMINDERINTERVAL")?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=8760).contains(&self.check_after_hours) {
            bail!(
                "check_after_hours must be between 1 and 8760, got {}",
                self.check_after_hours
            );
        }
        if !(1..=10).contains(&self.max_reminders) {
            bail!("max_reminders must be between 1 and 10, got {}", self.max_reminders);
        }
        if !(1..=720).contains(&self.reminder_interval_hours) {
            bail!(
                "reminder_interval_hours must be between 1 and 720, got {}",
                self.reminder_interval_hours
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub workers: usize,
    /// Reconnects attempted after the channel closes before giving up
    pub reconnect_attempts: u32,
}

impl ConsumerSettings {
    fn from_env() -> Result<Self> {
        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let workers: usize = match env::var("NOTIFICATION_WORKERS") {
            Ok(raw) => raw.parse().context("Invalid NOTIFICATION_WORKERS")?,
            Err(_) => default_workers,
        };
        if workers == 0 {
            bail!("NOTIFICATION_WORKERS must be at least 1");
        }

        Ok(Self {
            workers,
            reconnect_attempts: env::var("AMQP_RECONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid AMQP_RECONNECT_ATTEMPTS")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StorageEndpoint {
    pub url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl StorageEndpoint {
    fn from_env() -> Result<Self> {
        let prod = env::var("PASSWORDEXCHANGE_RUNNINGENVIRONMENT")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "prod" | "production"))
            .unwrap_or(false);

        let endpoint = if prod {
            env::var("PASSWORDEXCHANGE_DATABASEPRODSERVICE")
                .unwrap_or_else(|_| "storage-service:50051".to_string())
        } else {
            env::var("PASSWORDEXCHANGE_DATABASEDEVSERVICE")
                .unwrap_or_else(|_| "localhost:50051".to_string())
        };

        Ok(Self {
            url: if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint
            } else {
                format!("http://{}", endpoint)
            },
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

#[derive(Debug, Clone)]
pub struct TemplatePaths {
    pub initial: PathBuf,
    pub reminder: PathBuf,
}

impl TemplatePaths {
    fn from_env() -> Self {
        Self {
            initial: env::var("EMAIL_TEMPLATE_PATH")
                .unwrap_or_else(|_| DEFAULT_INITIAL_TEMPLATE.to_string())
                .into(),
            reminder: env::var("REMINDER_EMAIL_TEMPLATE_PATH")
                .unwrap_or_else(|_| DEFAULT_REMINDER_TEMPLATE.to_string())
                .into(),
        }
    }
}

/// Health and metrics listener used while consuming
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

impl HttpSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
        })
    }
}
