//! # Actix Middleware Library
//!
//! Shared middleware for the Password Exchange HTTP surfaces
//!
//! ## Modules
//! - `correlation_id`: request correlation IDs, echoed and propagated to gRPC
//! - `rate_limit`: per-IP token bucket limiting with a JSON 429 body
//! - `metrics`: Prometheus request metrics labelled by route pattern
//! - `logging`: access log without raw paths
//! - `cors`: permissive CORS with preflight handling
//! - `timeout`: whole-request deadline

pub mod correlation_id;
pub mod cors;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod timeout;

pub use correlation_id::{
    current_correlation_id, get_correlation_id, with_correlation_id, CorrelationId,
    CorrelationIdMiddleware, GRPC_CORRELATION_ID_KEY, HTTP_CORRELATION_ID_HEADER,
};
pub use cors::CorsMiddleware;
pub use logging::Logging;
pub use metrics::{serve_metrics, MetricsMiddleware};
pub use rate_limit::{extract_client_ip, RateLimitConfig, RateLimitMiddleware};
pub use timeout::{RequestTimeoutMiddleware, DEFAULT_REQUEST_TIMEOUT};
