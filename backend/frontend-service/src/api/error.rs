use std::collections::BTreeMap;
use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{error, HttpRequest, HttpResponse, ResponseError};
use error_types::{ServiceError, StandardErrorResponse};

/// A [`ServiceError`] bound to the request path it was raised on
#[derive(Debug)]
pub struct ApiError {
    error: ServiceError,
    path: String,
    message: Option<&'static str>,
}

impl ApiError {
    pub fn new(error: ServiceError, req: &HttpRequest) -> Self {
        Self {
            error,
            path: req.path().to_string(),
            message: None,
        }
    }

    /// Replace the public message for non-validation errors
    pub fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    pub fn kind(&self) -> &ServiceError {
        &self.error
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        self.error.log();
        let mut body = StandardErrorResponse::from_error(&self.error, self.path.clone());
        if let (Some(message), false) = (
            self.message,
            matches!(self.error, ServiceError::InvalidArgument { .. }),
        ) {
            body.message = message.to_string();
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Turn JSON extractor failures into a `validation_failed` body
pub fn json_error_handler(err: error::JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    let mut details = BTreeMap::new();
    details.insert("parse_error".to_string(), err.to_string());
    let body = StandardErrorResponse::new("validation_failed", "Invalid request format", req.path())
        .with_details(details);
    error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn test_not_found_body() {
        let req = TestRequest::get().uri("/api/v1/messages/abc").to_http_request();
        let err = ApiError::new(ServiceError::NotFound, &req)
            .with_message("Message not found or has expired");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "message_not_found");
        assert_eq!(json["message"], "Message not found or has expired");
        assert_eq!(json["path"], "/api/v1/messages/abc");
        assert!(json.get("details").is_none());
    }

    #[actix_web::test]
    async fn test_validation_keeps_details() {
        let req = TestRequest::post().uri("/api/v1/messages").to_http_request();
        let mut details = BTreeMap::new();
        details.insert("content".to_string(), "Message content is required".to_string());
        let err = ApiError::new(
            ServiceError::invalid_with_details("Request validation failed", details),
            &req,
        )
        .with_message("ignored for validation errors");

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "validation_failed");
        assert_eq!(json["message"], "Request validation failed");
        assert_eq!(json["details"]["content"], "Message content is required");
    }

    #[test]
    fn test_transient_is_503() {
        let req = TestRequest::get().to_http_request();
        let err = ApiError::new(ServiceError::transient("storage", "down"), &req);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
