use std::time::Duration;

use actix_middleware::{current_correlation_id, GRPC_CORRELATION_ID_KEY};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_types::{ServiceError, ServiceResult};
use tonic::metadata::MetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use crate::config::ReminderSettings;
use crate::pb::storage::{
    db_service_client::DbServiceClient, GetReminderHistoryRequest, GetUnviewedMessagesRequest,
    LogReminderRequest,
};

const STORAGE: &str = "storage";

/// An unviewed message due for a reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderCandidate {
    pub message_id: i64,
    pub unique_id: String,
    pub recipient_email: String,
    pub created_at: Option<DateTime<Utc>>,
    pub days_old: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderHistoryEntry {
    pub email_address: String,
    pub reminder_count: i32,
    pub last_reminder_sent: Option<DateTime<Utc>>,
}

/// Storage calls the reminder scheduler makes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn unviewed_messages(
        &self,
        settings: &ReminderSettings,
    ) -> ServiceResult<Vec<ReminderCandidate>>;

    async fn reminder_history(&self, message_id: i64) -> ServiceResult<Vec<ReminderHistoryEntry>>;

    async fn log_reminder_sent(&self, message_id: i64, email_address: &str) -> ServiceResult<()>;
}

/// Client interceptor: forward the scoped correlation ID as gRPC metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationForwarder;

impl Interceptor for CorrelationForwarder {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        if let Some(id) = current_correlation_id() {
            if let Ok(value) = MetadataValue::try_from(id.as_str()) {
                req.metadata_mut().insert(GRPC_CORRELATION_ID_KEY, value);
            }
        }
        Ok(req)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[derive(Clone)]
pub struct GrpcReminderStore {
    client: DbServiceClient<InterceptedService<Channel, CorrelationForwarder>>,
}

impl GrpcReminderStore {
    /// Lazily connected; the first call dials
    pub fn connect_lazy(
        url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(url.to_string())?
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .connect_lazy();
        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            client: DbServiceClient::with_interceptor(channel, CorrelationForwarder),
        }
    }
}

#[async_trait]
impl ReminderStore for GrpcReminderStore {
    async fn unviewed_messages(
        &self,
        settings: &ReminderSettings,
    ) -> ServiceResult<Vec<ReminderCandidate>> {
        let response = self
            .client
            .clone()
            .get_unviewed_messages_for_reminders(GetUnviewedMessagesRequest {
                older_than_hours: settings.check_after_hours,
                max_reminders: settings.max_reminders,
                reminder_interval_hours: settings.reminder_interval_hours,
            })
            .await
            .map_err(|status| ServiceError::from_status(STORAGE, status))?;

        Ok(response
            .into_inner()
            .messages
            .into_iter()
            .map(|m| ReminderCandidate {
                message_id: m.message_id,
                unique_id: m.unique_id,
                recipient_email: m.recipient_email,
                created_at: parse_timestamp(&m.created),
                days_old: m.days_old,
            })
            .collect())
    }

    async fn reminder_history(&self, message_id: i64) -> ServiceResult<Vec<ReminderHistoryEntry>> {
        let response = self
            .client
            .clone()
            .get_reminder_history(GetReminderHistoryRequest { message_id })
            .await
            .map_err(|status| ServiceError::from_status(STORAGE, status))?;

        Ok(response
            .into_inner()
            .entries
            .into_iter()
            .map(|e| ReminderHistoryEntry {
                email_address: e.email_address,
                reminder_count: e.reminder_count,
                last_reminder_sent: parse_timestamp(&e.last_reminder_sent),
            })
            .collect())
    }

    async fn log_reminder_sent(&self, message_id: i64, email_address: &str) -> ServiceResult<()> {
        self.client
            .clone()
            .log_reminder_sent(LogReminderRequest {
                message_id,
                email_address: email_address.to_string(),
            })
            .await
            .map_err(|status| ServiceError::from_status(STORAGE, status))?;
        Ok(())
    }
}
