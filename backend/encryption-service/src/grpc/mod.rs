pub mod server;

pub use server::EncryptionServiceImpl;

use tonic::{Request, Status};
use uuid::Uuid;

pub const CORRELATION_ID_KEY: &str = "correlation-id";

#[derive(Debug, Clone)]
pub struct RequestCorrelationId(pub String);

/// Server interceptor: keep the caller's correlation ID or mint one
pub fn correlation_interceptor(mut req: Request<()>) -> Result<Request<()>, Status> {
    let id = req
        .metadata()
        .get(CORRELATION_ID_KEY)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestCorrelationId(id));
    Ok(req)
}

pub(crate) fn correlation_id<T>(req: &Request<T>) -> String {
    req.extensions()
        .get::<RequestCorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}
