//! Browser pages
//!
//! Same lifecycle engine as the JSON API, rendered as HTML. Validation
//! failures re-render the home page with the field errors and a 400.

pub mod templates;

use std::collections::BTreeMap;

use actix_web::http::{header, StatusCode};
use actix_web::{guard, web, HttpRequest, HttpResponse};
use error_types::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::anti_spam;
use crate::api::RateLimits;
use crate::service::{decode_key, RetrieveRequest, SubmitRequest};
use crate::state::AppState;
use templates::{ABOUT, CONFIRMATION, DECRYPTION, HOME, NOT_FOUND};

const WRONG_PASSPHRASE: &str = "Wrong Passphrase/Lastname. Please try again(can be empty)";
const VIEW_COUNT_ERROR: &str = "Max view count must be between 1 and 100";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionForm {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub other_firstname: String,
    #[serde(default)]
    pub other_email: String,
    /// Passphrase; never echoed back into the page
    #[serde(default, skip_serializing)]
    pub other_lastname: String,
    #[serde(default)]
    pub other_information: String,
    #[serde(default, rename = "enableEmail")]
    pub enable_email: String,
    #[serde(default, rename = "questionId")]
    pub question_id: String,
    #[serde(default, rename = "antiSpamAnswer", skip_serializing)]
    pub anti_spam_answer: String,
    #[serde(default)]
    pub max_view_count: String,
    #[serde(default)]
    pub expiration_value: String,
    #[serde(default)]
    pub expiration_unit: String,
    #[serde(default, rename = "cf-turnstile-response", skip_serializing)]
    pub turnstile_token: String,
}

impl SubmissionForm {
    fn notify(&self) -> bool {
        matches!(
            self.enable_email.trim().to_ascii_lowercase().as_str(),
            "on" | "true" | "1" | "yes"
        )
    }

    /// Parse the string fields; numeric errors are reported with the same
    /// wording the engine uses for range errors
    pub fn to_submit(
        &self,
        remote_ip: Option<String>,
        max_expiration_hours: i64,
    ) -> Result<SubmitRequest, BTreeMap<String, String>> {
        let mut details = BTreeMap::new();
        let expiration_error = format!(
            "Expiration must be between 1 hour and {} days",
            max_expiration_hours / 24
        );

        let max_view_count = match self.max_view_count.trim() {
            "" => 0,
            raw => match raw.parse::<i32>() {
                Ok(n) if n != 0 => n,
                _ => {
                    details.insert("maxViewCount".to_string(), VIEW_COUNT_ERROR.to_string());
                    0
                }
            },
        };

        let multiplier = if self.expiration_unit.trim().eq_ignore_ascii_case("hours") {
            1
        } else {
            24
        };
        let expiration_hours = match self.expiration_value.trim() {
            "" => 0,
            raw => match raw.parse::<i64>().ok().and_then(|v| v.checked_mul(multiplier)) {
                Some(hours) if hours > 0 => hours,
                _ => {
                    details.insert("expirationHours".to_string(), expiration_error);
                    0
                }
            },
        };

        if !details.is_empty() {
            return Err(details);
        }

        Ok(SubmitRequest {
            content: self.content.clone(),
            sender_name: self.firstname.clone(),
            sender_email: self.email.clone(),
            recipient_name: self.other_firstname.clone(),
            recipient_email: self.other_email.clone(),
            passphrase: self.other_lastname.clone(),
            additional_info: self.other_information.clone(),
            send_notification: self.notify(),
            anti_spam_answer: self.anti_spam_answer.clone(),
            question_id: self.question_id.trim().parse().ok(),
            max_view_count,
            expiration_hours,
            turnstile_token: self.turnstile_token.clone(),
            remote_ip,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationQuery {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PassphraseForm {
    #[serde(default)]
    pub passphrase: String,
}

fn page(state: &AppState, status: StatusCode, name: &str, data: serde_json::Value) -> HttpResponse {
    match state.pages.render(name, &data) {
        Ok(html) => HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .body(html),
        Err(e) => {
            error!(template = name, error = %e, "Failed to render page");
            HttpResponse::InternalServerError().body("Internal Server Error")
        }
    }
}

fn home_page(
    state: &AppState,
    status: StatusCode,
    form: &SubmissionForm,
    errors: Vec<String>,
) -> HttpResponse {
    let challenge = anti_spam::random_challenge();
    page(
        state,
        status,
        HOME,
        json!({
            "title": "Password Exchange",
            "question": challenge.question,
            "question_id": challenge.id,
            "site_key": state.site_key,
            "max_expiration_days": state.messages.max_expiration_hours() / 24,
            "default_max_view_count": state.default_max_view_count,
            "form": form,
            "errors": errors,
        }),
    )
}

fn not_found_page(state: &AppState) -> HttpResponse {
    page(
        state,
        StatusCode::NOT_FOUND,
        NOT_FOUND,
        json!({"title": "Not Found - Password Exchange"}),
    )
}

pub async fn home(state: web::Data<AppState>) -> HttpResponse {
    home_page(&state, StatusCode::OK, &SubmissionForm::default(), Vec::new())
}

pub async fn about(state: web::Data<AppState>) -> HttpResponse {
    page(
        &state,
        StatusCode::OK,
        ABOUT,
        json!({"title": "About - Password Exchange"}),
    )
}

pub async fn confirmation(
    state: web::Data<AppState>,
    query: web::Query<ConfirmationQuery>,
) -> HttpResponse {
    page(
        &state,
        StatusCode::OK,
        CONFIRMATION,
        json!({"title": "passwordExchange", "url": query.content}),
    )
}

/// POST /
pub async fn submit(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<SubmissionForm>,
) -> HttpResponse {
    let form = form.into_inner();
    let remote_ip = req
        .connection_info()
        .realip_remote_addr()
        .map(|addr| addr.to_string());

    let submit = match form.to_submit(remote_ip, state.messages.max_expiration_hours()) {
        Ok(submit) => submit,
        Err(details) => {
            return home_page(
                &state,
                StatusCode::BAD_REQUEST,
                &form,
                details.into_values().collect(),
            )
        }
    };

    match state.messages.submit(submit).await {
        Ok(result) => HttpResponse::SeeOther()
            .insert_header((
                header::LOCATION,
                format!(
                    "/confirmation?content={}",
                    urlencoding::encode(&result.decrypt_url)
                ),
            ))
            .finish(),
        Err(ServiceError::InvalidArgument { details, message }) => {
            let errors = if details.is_empty() {
                vec![message]
            } else {
                details.into_values().collect()
            };
            home_page(&state, StatusCode::BAD_REQUEST, &form, errors)
        }
        Err(e) => {
            e.log();
            let status =
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            home_page(
                &state,
                status,
                &form,
                vec!["We could not store your message. Please try again.".to_string()],
            )
        }
    }
}

/// GET /decrypt/{id}/{key}; never consumes a view
pub async fn decrypt_page(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (message_id, key) = path.into_inner();
    if decode_key(&key).is_err() {
        return not_found_page(&state);
    }

    match state.messages.check_access(&message_id).await {
        Ok(info) => page(
            &state,
            StatusCode::OK,
            DECRYPTION,
            json!({
                "title": "passwordExchange",
                "has_password": info.requires_passphrase,
            }),
        ),
        Err(e) => {
            e.log();
            not_found_page(&state)
        }
    }
}

/// POST /decrypt/{id}/{key}
pub async fn decrypt_submit(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    form: web::Form<PassphraseForm>,
) -> HttpResponse {
    let (message_id, key) = path.into_inner();
    let Ok(key) = decode_key(&key) else {
        return not_found_page(&state);
    };

    let result = state
        .messages
        .retrieve(RetrieveRequest {
            message_id,
            key,
            passphrase: form.into_inner().passphrase,
        })
        .await;

    match result {
        Ok(message) => page(
            &state,
            StatusCode::OK,
            DECRYPTION,
            json!({
                "title": "passwordExchange Decrypted",
                "decrypted_message": message.content,
                "view_count": message.view_count,
                "max_view_count": message.max_view_count,
                "remaining_views": (message.max_view_count - message.view_count).max(0),
            }),
        ),
        Err(ServiceError::InvalidPassphrase) => page(
            &state,
            StatusCode::OK,
            DECRYPTION,
            json!({
                "title": "passwordExchange",
                "has_password": true,
                "error": WRONG_PASSPHRASE,
            }),
        ),
        Err(e) => {
            if !matches!(e, ServiceError::NotFound | ServiceError::InvalidKeyFormat) {
                warn!(error = %e, "Decryption failed");
            }
            not_found_page(&state)
        }
    }
}

pub async fn not_found(state: web::Data<AppState>) -> HttpResponse {
    not_found_page(&state)
}

/// Mount the pages. Form posts draw from the same per-IP buckets as the
/// matching `/api/v1` routes.
pub fn configure(cfg: &mut web::ServiceConfig, limits: &RateLimits) {
    cfg.app_data(web::FormConfig::default().limit(crate::api::MAX_BODY_BYTES))
        .service(
            web::resource("/")
                .guard(guard::Post())
                .wrap(limits.submit.clone())
                .route(web::post().to(submit)),
        )
        .route("/", web::get().to(home))
        .route("/about", web::get().to(about))
        .route("/confirmation", web::get().to(confirmation))
        .service(
            web::resource("/decrypt/{id}/{key}")
                .guard(guard::Post())
                .wrap(limits.decrypt.clone())
                .route(web::post().to(decrypt_submit)),
        )
        .service(
            web::resource("/decrypt/{id}/{key}")
                .wrap(limits.access.clone())
                .route(web::get().to(decrypt_page)),
        );
}
