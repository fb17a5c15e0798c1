//! Cloudflare Turnstile verification for submissions that send email

use std::time::Duration;

use async_trait::async_trait;
use error_types::{ServiceError, ServiceResult};
use serde::Deserialize;
use tracing::{debug, warn};

pub const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "PasswordExchange/1.0";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HumanVerifier: Send + Sync {
    /// `Ok(false)` when the token was rejected
    async fn verify(&self, token: &str, remote_ip: Option<String>) -> ServiceResult<bool>;
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

pub struct TurnstileVerifier {
    client: reqwest::Client,
    secret: String,
    endpoint: String,
}

impl TurnstileVerifier {
    pub fn new(secret: impl Into<String>) -> ServiceResult<Self> {
        Self::with_endpoint(secret, SITEVERIFY_URL)
    }

    pub fn with_endpoint(
        secret: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ServiceError::internal)?;

        Ok(Self {
            client,
            secret: secret.into(),
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl HumanVerifier for TurnstileVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<String>) -> ServiceResult<bool> {
        if token.trim().is_empty() {
            return Ok(false);
        }

        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip.as_deref() {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::transient("turnstile", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::transient(
                "turnstile",
                format!("siteverify returned {}", response.status()),
            ));
        }

        let body: SiteverifyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::transient("turnstile", e.to_string()))?;

        if body.success {
            debug!("Turnstile token accepted");
        } else {
            warn!(error_codes = ?body.error_codes, "Turnstile token rejected");
        }
        Ok(body.success)
    }
}
