//! gRPC surface of the storage service
//!
//! Timestamps cross the wire as RFC 3339 strings.

use chrono::{DateTime, SecondsFormat, Utc};
use tonic::{Request, Response, Status};
use tracing::{info_span, Instrument};

use super::correlation_id;
use crate::models::{ReminderCandidate, ReminderLogEntry, ReminderQuery, StoredMessage};
use crate::pb::db_service_server::DbService;
use crate::pb::*;
use crate::service::{InsertMessage, StorageService};

#[derive(Clone)]
pub struct DbServiceImpl {
    store: StorageService,
}

impl DbServiceImpl {
    pub fn new(store: StorageService) -> Self {
        Self { store }
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_expires_at(raw: &str) -> Result<Option<DateTime<Utc>>, Status> {
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|_| Status::invalid_argument("expires_at must be an RFC 3339 timestamp"))
}

impl From<StoredMessage> for SelectResponse {
    fn from(row: StoredMessage) -> Self {
        SelectResponse {
            content: row.content,
            passphrase: row.passphrase_hash,
            view_count: row.view_count,
            max_view_count: row.max_view_count,
            expires_at: row.expires_at.map(format_timestamp).unwrap_or_default(),
            created_at: format_timestamp(row.created_at),
        }
    }
}

impl From<ReminderCandidate> for UnviewedMessage {
    fn from(c: ReminderCandidate) -> Self {
        UnviewedMessage {
            message_id: c.message_id,
            unique_id: c.unique_id,
            recipient_email: c.recipient_email,
            created: format_timestamp(c.created_at),
            days_old: c.days_old,
        }
    }
}

impl From<ReminderLogEntry> for crate::pb::ReminderLogEntry {
    fn from(e: ReminderLogEntry) -> Self {
        crate::pb::ReminderLogEntry {
            message_id: e.message_id,
            email_address: e.email_address,
            reminder_count: e.reminder_count,
            last_reminder_sent: format_timestamp(e.last_reminder_sent),
        }
    }
}

#[tonic::async_trait]
impl DbService for DbServiceImpl {
    async fn insert(
        &self,
        request: Request<InsertRequest>,
    ) -> Result<Response<InsertResponse>, Status> {
        let span = info_span!("insert", correlation_id = %correlation_id(&request));
        let req = request.into_inner();

        async move {
            let expires_at = parse_expires_at(&req.expires_at)?;
            self.store
                .insert(InsertMessage {
                    unique_id: req.uuid,
                    content: req.content,
                    passphrase_hash: req.passphrase,
                    max_view_count: req.max_view_count,
                    recipient_email: req.recipient_email,
                    expires_at,
                })
                .await?;
            Ok::<_, Status>(Response::new(InsertResponse {}))
        }
        .instrument(span)
        .await
    }

    async fn select(
        &self,
        request: Request<SelectRequest>,
    ) -> Result<Response<SelectResponse>, Status> {
        let span = info_span!("select", correlation_id = %correlation_id(&request));
        let uuid = request.into_inner().uuid;

        async move {
            let row = self.store.select(&uuid).await?;
            Ok::<_, Status>(Response::new(row.into()))
        }
        .instrument(span)
        .await
    }

    async fn get_message(
        &self,
        request: Request<SelectRequest>,
    ) -> Result<Response<SelectResponse>, Status> {
        let span = info_span!("get_message", correlation_id = %correlation_id(&request));
        let uuid = request.into_inner().uuid;

        async move {
            let row = self.store.get_message(&uuid).await?;
            Ok::<_, Status>(Response::new(row.into()))
        }
        .instrument(span)
        .await
    }

    async fn get_unviewed_messages_for_reminders(
        &self,
        request: Request<GetUnviewedMessagesRequest>,
    ) -> Result<Response<GetUnviewedMessagesResponse>, Status> {
        let span = info_span!("get_unviewed_messages", correlation_id = %correlation_id(&request));
        let req = request.into_inner();

        async move {
            let candidates = self
                .store
                .unviewed_for_reminders(ReminderQuery {
                    older_than_hours: req.older_than_hours,
                    max_reminders: req.max_reminders,
                    reminder_interval_hours: req.reminder_interval_hours,
                })
                .await?;
            Ok::<_, Status>(Response::new(GetUnviewedMessagesResponse {
                messages: candidates.into_iter().map(Into::into).collect(),
            }))
        }
        .instrument(span)
        .await
    }

    async fn get_reminder_history(
        &self,
        request: Request<GetReminderHistoryRequest>,
    ) -> Result<Response<GetReminderHistoryResponse>, Status> {
        let span = info_span!("get_reminder_history", correlation_id = %correlation_id(&request));
        let message_id = request.into_inner().message_id;

        async move {
            let entries = self.store.reminder_history(message_id).await?;
            Ok::<_, Status>(Response::new(GetReminderHistoryResponse {
                entries: entries.into_iter().map(Into::into).collect(),
            }))
        }
        .instrument(span)
        .await
    }

    async fn log_reminder_sent(
        &self,
        request: Request<LogReminderRequest>,
    ) -> Result<Response<LogReminderResponse>, Status> {
        let span = info_span!("log_reminder_sent", correlation_id = %correlation_id(&request));
        let req = request.into_inner();

        async move {
            self.store
                .log_reminder_sent(req.message_id, &req.email_address)
                .await?;
            Ok::<_, Status>(Response::new(LogReminderResponse {}))
        }
        .instrument(span)
        .await
    }

    async fn cleanup_expired_messages(
        &self,
        request: Request<CleanupExpiredMessagesRequest>,
    ) -> Result<Response<CleanupExpiredMessagesResponse>, Status> {
        let span = info_span!("cleanup_expired_messages", correlation_id = %correlation_id(&request));

        async move {
            let deleted = self.store.cleanup_expired().await?;
            Ok::<_, Status>(Response::new(CleanupExpiredMessagesResponse {
                deleted_count: i64::try_from(deleted).unwrap_or(i64::MAX),
            }))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_at_parsing() {
        assert_eq!(parse_expires_at("").unwrap(), None);
        assert!(parse_expires_at("2030-01-01T00:00:00Z").unwrap().is_some());
        assert_eq!(
            parse_expires_at("tomorrow").unwrap_err().code(),
            tonic::Code::InvalidArgument
        );
    }
}
