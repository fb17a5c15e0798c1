//! JSON API under `/api/v1`

pub mod error;
pub mod handlers;
pub mod models;

use actix_middleware::{serve_metrics, RateLimitMiddleware};
use actix_web::web;
use std::net::IpAddr;

pub use error::{json_error_handler, ApiError};

/// Maximum accepted JSON body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Per-route buckets; build once and clone into every worker
#[derive(Clone)]
pub struct RateLimits {
    pub submit: RateLimitMiddleware,
    pub access: RateLimitMiddleware,
    pub decrypt: RateLimitMiddleware,
    pub health: RateLimitMiddleware,
}

impl RateLimits {
    /// Hourly budgets per client IP; `trusted_proxies` may set the client
    /// address through `X-Forwarded-For`
    pub fn new(trusted_proxies: &[IpAddr]) -> Self {
        let bucket = |per_hour| RateLimitMiddleware::per_hour(per_hour).trusting(trusted_proxies);
        Self {
            submit: bucket(10),
            access: bucket(100),
            decrypt: bucket(20),
            health: bucket(300),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new(&[])
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, limits: &RateLimits) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(
                web::JsonConfig::default()
                    .limit(MAX_BODY_BYTES)
                    .error_handler(json_error_handler),
            )
            .service(
                web::resource("/messages")
                    .wrap(limits.submit.clone())
                    .route(web::post().to(handlers::submit_message)),
            )
            .service(
                web::resource("/messages/{id}")
                    .wrap(limits.access.clone())
                    .route(web::get().to(handlers::get_message_info)),
            )
            .service(
                web::resource("/messages/{id}/decrypt")
                    .wrap(limits.decrypt.clone())
                    .route(web::post().to(handlers::decrypt_message)),
            )
            .service(
                web::resource("/health")
                    .wrap(limits.health.clone())
                    .route(web::get().to(handlers::health)),
            )
            .route("/info", web::get().to(handlers::info))
            .route("/metrics", web::get().to(serve_metrics)),
    );
}
