use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use error_types::ServiceError;
use serde_json::json;
use tracing::info;

use super::error::ApiError;
use super::models::{
    HealthResponse, HealthServices, MessageAccessInfoResponse, MessageDecryptRequest,
    MessageDecryptResponse, MessageSubmissionRequest, MessageSubmissionResponse, API_VERSION,
};
use crate::service::{decode_key, RetrieveRequest};
use crate::state::AppState;

const NOT_FOUND_MESSAGE: &str = "Message not found or has expired";

fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info()
        .realip_remote_addr()
        .map(|addr| addr.to_string())
}

fn lookup_error(err: ServiceError, req: &HttpRequest) -> ApiError {
    let message = match err {
        ServiceError::NotFound => NOT_FOUND_MESSAGE,
        ServiceError::InvalidPassphrase => "Invalid passphrase provided",
        ServiceError::InvalidKeyFormat => "Invalid decryption key format",
        _ => "Failed to process message request",
    };
    ApiError::new(err, req).with_message(message)
}

/// POST /api/v1/messages
pub async fn submit_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<MessageSubmissionRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();

    let missing = body.missing_parties();
    if !missing.is_empty() {
        return Err(ApiError::new(
            ServiceError::invalid_with_details("Request validation failed", missing),
            &req,
        ));
    }

    let result = state
        .messages
        .submit(body.into_submit(client_ip(&req)))
        .await
        .map_err(|e| ApiError::new(e, &req).with_message("Failed to submit message"))?;

    info!(message_id = %result.message_id, "API message submitted");
    Ok(HttpResponse::Created().json(MessageSubmissionResponse::from(result)))
}

/// GET /api/v1/messages/{id}
pub async fn get_message_info(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let info = state
        .messages
        .check_access(&path.into_inner())
        .await
        .map_err(|e| lookup_error(e, &req))?;

    Ok(HttpResponse::Ok().json(MessageAccessInfoResponse::from(info)))
}

/// POST /api/v1/messages/{id}/decrypt
pub async fn decrypt_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<MessageDecryptRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let key = decode_key(&body.decryption_key).map_err(|e| lookup_error(e, &req))?;

    let message = state
        .messages
        .retrieve(RetrieveRequest {
            message_id: path.into_inner(),
            key,
            passphrase: body.passphrase.unwrap_or_default(),
        })
        .await
        .map_err(|e| lookup_error(e, &req))?;

    Ok(HttpResponse::Ok().json(MessageDecryptResponse::from(message)))
}

/// GET /api/v1/health
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let report = state.health.report().await;
    let label = |ok: bool| if ok { "healthy" } else { "unhealthy" };

    let body = HealthResponse {
        status: if report.is_healthy() { "healthy" } else { "degraded" },
        version: API_VERSION,
        timestamp: Utc::now(),
        services: HealthServices {
            database: label(report.database),
            encryption: label(report.encryption),
            email: if report.email_enabled { "healthy" } else { "disabled" },
        },
    };

    if report.is_healthy() {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// GET /api/v1/info
pub async fn info(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "version": API_VERSION,
        "documentation": "/api/v1/docs",
        "endpoints": {
            "submit": "POST /api/v1/messages",
            "access": "GET /api/v1/messages/{id}",
            "decrypt": "POST /api/v1/messages/{id}/decrypt",
            "health": "GET /api/v1/health",
            "info": "GET /api/v1/info",
            "metrics": "GET /api/v1/metrics",
        },
        "features": {
            "emailNotifications": state.messages.notifications_enabled(),
            "passphraseProtection": true,
            "antiSpamProtection": true,
            "emailReminders": true,
        },
    }))
}
