/// SMTP delivery
use async_trait::async_trait;
use email_validation::{mask_email_for_logging, sanitize_header_value};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use resilience::{with_timeout_result, TimeoutError};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SmtpSettings;

/// Implicit-TLS submission port; every other port negotiates STARTTLS
const SMTPS_PORT: u16 = 465;

/// A rendered email ready for the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Worth requeueing: connection problems, timeouts, 4xx replies
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Retrying cannot help: bad address, 5xx replies
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), DeliveryError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    timeout: std::time::Duration,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let address: Address = settings
            .from_email
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid PASSWORDEXCHANGE_EMAILFROM address: {}", e))?;
        let from = Mailbox::new(Some(sanitize_header_value(&settings.from_name)), address);

        let builder = if settings.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .map_err(|e| anyhow::anyhow!("Failed to configure SMTP transport: {}", e))?
        .port(settings.port)
        .authentication(vec![Mechanism::Plain])
        .timeout(Some(settings.timeout));

        let builder = if settings.user.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ))
        };

        Ok(Self {
            transport: builder.build(),
            from,
            timeout: settings.timeout,
        })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, DeliveryError> {
        let address: Address = mail
            .to_email
            .parse()
            .map_err(|e| DeliveryError::Permanent(format!("invalid recipient address: {}", e)))?;
        let to_name = sanitize_header_value(&mail.to_name);
        let to = Mailbox::new((!to_name.is_empty()).then_some(to_name), address);

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(sanitize_header_value(&mail.subject))
            .header(header::ContentType::TEXT_HTML)
            .body(mail.html_body.clone())
            .map_err(|e| DeliveryError::Permanent(format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), DeliveryError> {
        let message = self.build_message(&mail)?;
        let recipient = mask_email_for_logging(&mail.to_email);

        match with_timeout_result(self.timeout, self.transport.send(message)).await {
            Ok(_) => {
                info!(recipient = %recipient, "Email sent via SMTP");
                Ok(())
            }
            Err(TimeoutError::Elapsed(after)) => {
                warn!(recipient = %recipient, ?after, "SMTP send timed out");
                Err(DeliveryError::Transient(format!("SMTP send timed out after {:?}", after)))
            }
            Err(TimeoutError::OperationFailed(e)) => {
                warn!(recipient = %recipient, error = %e, "SMTP send failed");
                if e.is_permanent() {
                    Err(DeliveryError::Permanent(e.to_string()))
                } else {
                    Err(DeliveryError::Transient(e.to_string()))
                }
            }
        }
    }
}
