//! Per-delivery pipeline: decode, screen, render, send.
//!
//! The processor never touches the channel. It returns a [`Disposition`] and
//! the consumer turns that into an ack or a nack.

use std::sync::Arc;

use email_validation::{mask_email_for_logging, validate_email, validate_header_value};
use message_queue::{NotificationEnvelope, TemplateKind};
use tracing::{debug, error, warn};

use crate::mailer::{DeliveryError, MailSender, OutgoingMail};
use crate::metrics;
use crate::templates::{EmailContext, EmailTemplates};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Delivered
    Ack,
    /// Nack with requeue
    Requeue,
    /// Ack without delivering
    Drop { reason: &'static str },
}

/// Subject used when an initial envelope arrives without one
pub fn initial_subject(sender_name: &str) -> String {
    format!("Encrypted Message from Password Exchange from {}", sender_name)
}

struct Rejection {
    reason: &'static str,
    detail: String,
}

impl Rejection {
    fn new(reason: &'static str, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

pub struct DeliveryProcessor {
    templates: EmailTemplates,
    mailer: Arc<dyn MailSender>,
    site_url: String,
}

impl DeliveryProcessor {
    pub fn new(templates: EmailTemplates, mailer: Arc<dyn MailSender>, site_url: String) -> Self {
        Self {
            templates,
            mailer,
            site_url,
        }
    }

    pub async fn process(&self, body: &[u8]) -> Disposition {
        let envelope = match NotificationEnvelope::decode_from(body) {
            Ok(envelope) => envelope,
            Err(e) => return poison(Rejection::new("poison", e.to_string())),
        };
        let kind = envelope.template_kind();

        let mail = match self.prepare(envelope, kind) {
            Ok(mail) => mail,
            Err(rejection) => return poison(rejection),
        };

        let recipient = mask_email_for_logging(&mail.to_email);
        debug!(recipient = %recipient, ?kind, "Delivering notification");

        match self.mailer.send(mail).await {
            Ok(()) => {
                metrics::record_sent(kind_label(kind));
                Disposition::Ack
            }
            Err(DeliveryError::Transient(e)) => {
                warn!(recipient = %recipient, error = %e, "Transient delivery failure, requeueing");
                metrics::record_requeued();
                Disposition::Requeue
            }
            Err(DeliveryError::Permanent(e)) => {
                error!(recipient = %recipient, error = %e, "Permanent delivery failure, dropping");
                metrics::record_dropped("permanent_failure");
                Disposition::Drop {
                    reason: "permanent_failure",
                }
            }
        }
    }

    fn prepare(
        &self,
        envelope: NotificationEnvelope,
        kind: TemplateKind,
    ) -> Result<OutgoingMail, Rejection> {
        let subject = match (envelope.subject.trim().is_empty(), kind) {
            (false, _) => envelope.subject.clone(),
            (true, TemplateKind::Initial) => initial_subject(&envelope.sender_name),
            (true, TemplateKind::Reminder) => {
                return Err(Rejection::new("invalid_envelope", "reminder without subject"))
            }
        };

        validate_email(&envelope.recipient_email)
            .map_err(|e| Rejection::new("invalid_envelope", format!("recipient: {}", e)))?;
        validate_email(&envelope.sender_email)
            .map_err(|e| Rejection::new("invalid_envelope", format!("sender: {}", e)))?;

        for (field, value) in [
            ("subject", subject.as_str()),
            ("sender_name", envelope.sender_name.as_str()),
            ("recipient_name", envelope.recipient_name.as_str()),
        ] {
            validate_header_value(value)
                .map_err(|e| Rejection::new("header_injection", format!("{}: {}", field, e)))?;
        }

        let context = EmailContext {
            subject: subject.clone(),
            sender_name: envelope.sender_name,
            recipient_name: envelope.recipient_name.clone(),
            content: envelope.content,
            url: match kind {
                TemplateKind::Initial => envelope.url,
                TemplateKind::Reminder => String::new(),
            },
            additional_info: envelope.additional_info,
            site_url: self.site_url.clone(),
        };
        let html_body = self
            .templates
            .render(kind, &context)
            .map_err(|e| Rejection::new("render", e.to_string()))?;

        Ok(OutgoingMail {
            to_email: envelope.recipient_email,
            to_name: envelope.recipient_name,
            subject,
            html_body,
        })
    }
}

fn poison(rejection: Rejection) -> Disposition {
    warn!(
        reason = rejection.reason,
        detail = %rejection.detail,
        "poison message dropped"
    );
    metrics::record_dropped(rejection.reason);
    Disposition::Drop {
        reason: rejection.reason,
    }
}

fn kind_label(kind: TemplateKind) -> &'static str {
    match kind {
        TemplateKind::Initial => "initial",
        TemplateKind::Reminder => "reminder",
    }
}
