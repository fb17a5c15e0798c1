//! Per-IP token bucket rate limiting
//!
//! Each limited route group gets its own [`RateLimitMiddleware`]; build it
//! once outside the `HttpServer` factory and clone it into every worker so
//! all workers share the same buckets.
//!
//! The client IP is the connection's peer address. `X-Forwarded-For` is
//! only consulted when that peer is one of the configured trusted proxies,
//! and then the rightmost hop that is not itself a trusted proxy wins.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use serde::Serialize;
use std::future::{ready, Ready};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::correlation_id::CorrelationId;

/// Buckets kept before stale entries are pruned
const RETAIN_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per hour per client IP
    pub requests_per_hour: NonZeroU32,
}

impl RateLimitConfig {
    pub fn per_hour(requests: u32) -> Self {
        Self {
            requests_per_hour: NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN),
        }
    }
}

/// Body returned with 429
#[derive(Debug, Serialize)]
pub struct RateLimitExceededBody {
    pub error: &'static str,
    pub message: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub path: String,
    pub correlation_id: String,
    pub rate_limit_remaining: u32,
    /// Seconds until another request is allowed
    pub rate_limit_reset: u64,
    pub rate_limit_limit: u32,
}

struct RateLimitState {
    config: RateLimitConfig,
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    clock: DefaultClock,
}

/// Rate limit middleware factory
#[derive(Clone)]
pub struct RateLimitMiddleware {
    state: Arc<RateLimitState>,
    trusted_proxies: Arc<[IpAddr]>,
}

impl RateLimitMiddleware {
    pub fn new(config: RateLimitConfig) -> Self {
        // Full burst available up front, refilled evenly across the hour
        let quota = Quota::per_hour(config.requests_per_hour);
        Self {
            state: Arc::new(RateLimitState {
                config,
                limiter: RateLimiter::keyed(quota),
                clock: DefaultClock::default(),
            }),
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    pub fn per_hour(requests: u32) -> Self {
        Self::new(RateLimitConfig::per_hour(requests))
    }

    /// Honour `X-Forwarded-For` from these peers
    pub fn trusting(mut self, proxies: &[IpAddr]) -> Self {
        self.trusted_proxies = Arc::from(proxies);
        self
    }
}

impl RateLimitState {
    /// `Ok` when allowed, otherwise the wait before the next token
    fn check(&self, ip: &IpAddr) -> Result<(), Duration> {
        if self.limiter.len() > RETAIN_THRESHOLD {
            self.limiter.retain_recent();
        }
        self.limiter
            .check_key(ip)
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service,
            state: self.state.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: S,
    state: Arc<RateLimitState>,
    trusted_proxies: Arc<[IpAddr]>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let ip = extract_client_ip(&req, &self.trusted_proxies);

        if let Err(wait) = self.state.check(&ip) {
            let limit = self.state.config.requests_per_hour.get();
            warn!(client_ip = %ip, path = %req.path(), "Rate limit exceeded");

            let correlation_id = req
                .extensions()
                .get::<CorrelationId>()
                .map(|id| id.0.clone())
                .unwrap_or_default();
            let reset = wait.as_secs().max(1);
            let body = RateLimitExceededBody {
                error: "rate_limit_exceeded",
                message: "Rate limit exceeded. Please try again later.",
                timestamp: chrono::Utc::now(),
                path: req.path().to_string(),
                correlation_id,
                rate_limit_remaining: 0,
                rate_limit_reset: reset,
                rate_limit_limit: limit,
            };
            let response = HttpResponse::TooManyRequests()
                .insert_header(("X-RateLimit-Limit", limit.to_string()))
                .insert_header(("X-RateLimit-Remaining", "0"))
                .insert_header(("Retry-After", reset.to_string()))
                .json(body);

            let (http_req, _) = req.into_parts();
            let res = ServiceResponse::new(http_req, response).map_into_right_body();
            return Box::pin(async move { Ok(res) });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}

/// Address a request is billed to.
///
/// Without a trusted peer the forwarding headers are ignored, since any
/// client can set them.
pub fn extract_client_ip(req: &ServiceRequest, trusted_proxies: &[IpAddr]) -> IpAddr {
    let peer = match req.peer_addr() {
        Some(addr) => addr.ip(),
        None => return IpAddr::from([127, 0, 0, 1]),
    };
    if !trusted_proxies.contains(&peer) {
        return peer;
    }

    req.headers()
        .get_all("X-Forwarded-For")
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find(|hop| !trusted_proxies.contains(hop))
        .unwrap_or(peer)
}
