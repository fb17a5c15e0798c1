//! Frontend service
//!
//! HTTP ingress for Password Exchange: the browser pages, the JSON API under
//! `/api/v1`, and the message lifecycle engine both of them drive. Storage
//! and Encryption are reached over gRPC; notifications go out through AMQP.

pub mod anti_spam;
pub mod api;
pub mod clients;
pub mod config;
pub mod hasher;
pub mod health;
pub mod metrics;
pub mod service;
pub mod state;
pub mod turnstile;
pub mod web;

pub mod pb {
    pub mod storage {
        tonic::include_proto!("passwordexchange.storage.v1");
    }

    pub mod encryption {
        tonic::include_proto!("passwordexchange.encryption.v1");
    }
}

pub use api::RateLimits;
pub use service::MessageService;
pub use state::AppState;

/// Mount every route; shared by `main` and the integration tests
pub fn configure(cfg: &mut actix_web::web::ServiceConfig, limits: &RateLimits) {
    api::configure(cfg, limits);
    web::configure(cfg, limits);
    cfg.default_service(actix_web::web::to(web::not_found));
}
