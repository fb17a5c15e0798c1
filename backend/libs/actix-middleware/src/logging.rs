//! Access logging
//!
//! Requests are logged by route pattern. Decrypt URLs embed the key, so the
//! raw path never reaches the log. Probe endpoints log at debug.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::time::Instant;

use crate::correlation_id::{current_correlation_id, CorrelationId};

const PROBE_ROUTES: &[&str] = &["/health", "/metrics"];

/// Route label for an unmatched request
pub const UNMATCHED_ROUTE: &str = "unmatched";

#[derive(Clone, Default)]
pub struct Logging;

impl<S, B> Transform<S, ServiceRequest> for Logging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessLog<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessLog { inner: service }))
    }
}

pub struct AccessLog<S> {
    inner: S,
}

/// What gets written for one request
#[derive(Debug)]
struct AccessRecord {
    method: String,
    route: String,
    correlation_id: Option<String>,
}

impl AccessRecord {
    fn capture(req: &ServiceRequest) -> Self {
        let correlation_id = req
            .extensions()
            .get::<CorrelationId>()
            .map(|id| id.0.clone())
            .or_else(current_correlation_id);

        Self {
            method: req.method().as_str().to_owned(),
            route: req
                .match_pattern()
                .unwrap_or_else(|| UNMATCHED_ROUTE.to_owned()),
            correlation_id,
        }
    }

    fn is_probe(&self) -> bool {
        PROBE_ROUTES.contains(&self.route.as_str())
    }

    fn emit(&self, status: StatusCode, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let correlation_id = self.correlation_id.as_deref().unwrap_or("-");
        let status = status.as_u16();

        if status >= 500 {
            tracing::warn!(method = %self.method, route = %self.route, status, elapsed_ms, correlation_id, "request failed");
        } else if self.is_probe() {
            tracing::debug!(method = %self.method, route = %self.route, status, elapsed_ms, "probe served");
        } else {
            tracing::info!(method = %self.method, route = %self.route, status, elapsed_ms, correlation_id, "request served");
        }
    }
}

impl<S, B> Service<ServiceRequest> for AccessLog<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let record = AccessRecord::capture(&req);
        let pending = self.inner.call(req);

        Box::pin(async move {
            match pending.await {
                Ok(res) => {
                    record.emit(res.status(), started);
                    Ok(res)
                }
                Err(err) => {
                    let status = err.as_response_error().status_code();
                    record.emit(status, started);
                    Err(err)
                }
            }
        })
    }
}
