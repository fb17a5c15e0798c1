//! Whole-request deadline
//!
//! A handler that runs past the deadline is dropped and the client gets
//! `504` with the standard error body.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use error_types::StandardErrorResponse;
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RequestTimeoutMiddleware {
    timeout: Duration,
}

impl RequestTimeoutMiddleware {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RequestTimeoutMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestTimeoutMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestTimeoutService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestTimeoutService {
            service,
            timeout: self.timeout,
        }))
    }
}

pub struct RequestTimeoutService<S> {
    service: S,
    timeout: Duration,
}

impl<S, B> Service<ServiceRequest> for RequestTimeoutService<S>
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
        // Keep a handle to the request so a response can still be built
        // after the inner future is dropped
        let http_req = req.request().clone();
        let path = req.path().to_string();
        let timeout = self.timeout;
        let fut = self.service.call(req);

        Box::pin(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(res) => res.map(ServiceResponse::map_into_left_body),
                Err(_) => {
                    tracing::warn!(timeout_secs = timeout.as_secs(), "Request deadline exceeded");
                    let body = StandardErrorResponse::new(
                        "request_timeout",
                        "The request took too long to complete",
                        path,
                    );
                    let response = HttpResponse::GatewayTimeout().json(body);
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
            }
        })
    }
}
