pub mod server;

pub use server::DbServiceImpl;

use tonic::{metadata::MetadataValue, Request, Status};
use uuid::Uuid;

/// Metadata key shared with the callers' client interceptors
pub const CORRELATION_ID_KEY: &str = "correlation-id";

/// Correlation ID attached to a request by [`correlation_interceptor`]
#[derive(Debug, Clone)]
pub struct RequestCorrelationId(pub String);

/// Server interceptor: keep the caller's correlation ID or mint one
pub fn correlation_interceptor(mut req: Request<()>) -> Result<Request<()>, Status> {
    let id = match req
        .metadata()
        .get(CORRELATION_ID_KEY)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        Some(existing) => existing.to_string(),
        None => {
            let generated = Uuid::new_v4().to_string();
            let value = MetadataValue::try_from(generated.as_str())
                .map_err(|_| Status::internal("failed to set correlation id"))?;
            req.metadata_mut().insert(CORRELATION_ID_KEY, value);
            generated
        }
    };
    req.extensions_mut().insert(RequestCorrelationId(id));
    Ok(req)
}

pub(crate) fn correlation_id<T>(req: &Request<T>) -> String {
    req.extensions()
        .get::<RequestCorrelationId>()
        .map(|id| id.0.clone())
        .or_else(|| {
            req.metadata()
                .get(CORRELATION_ID_KEY)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default()
}
