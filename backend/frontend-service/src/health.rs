//! Downstream health probes for `GET /api/v1/health`

use std::time::Duration;

use async_trait::async_trait;
use error_types::{ServiceError, ServiceResult};
use tonic::transport::Channel;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use tracing::warn;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> ServiceResult<()>;
}

/// Asks a peer's `grpc.health.v1.Health` for the overall server status
pub struct GrpcHealthProbe {
    service: &'static str,
    channel: Channel,
}

impl GrpcHealthProbe {
    pub fn new(service: &'static str, channel: Channel) -> Self {
        Self { service, channel }
    }
}

#[async_trait]
impl HealthCheck for GrpcHealthProbe {
    async fn check(&self) -> ServiceResult<()> {
        let mut client = HealthClient::new(self.channel.clone());
        let call = client.check(HealthCheckRequest {
            service: String::new(),
        });

        let response = tokio::time::timeout(PROBE_TIMEOUT, call)
            .await
            .map_err(|_| ServiceError::transient(self.service, "health probe timed out"))?
            .map_err(|status| ServiceError::from_status(self.service, status))?;

        if response.into_inner().status == ServingStatus::Serving as i32 {
            Ok(())
        } else {
            Err(ServiceError::transient(self.service, "not serving"))
        }
    }
}

pub struct HealthChecker {
    database: Box<dyn HealthCheck>,
    encryption: Box<dyn HealthCheck>,
    email_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub database: bool,
    pub encryption: bool,
    pub email_enabled: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.database && self.encryption
    }
}

impl HealthChecker {
    pub fn new(
        database: Box<dyn HealthCheck>,
        encryption: Box<dyn HealthCheck>,
        email_enabled: bool,
    ) -> Self {
        Self {
            database,
            encryption,
            email_enabled,
        }
    }

    pub async fn report(&self) -> HealthReport {
        let (database, encryption) = tokio::join!(self.database.check(), self.encryption.check());

        if let Err(e) = &database {
            warn!(error = %e, "Storage health probe failed");
        }
        if let Err(e) = &encryption {
            warn!(error = %e, "Encryption health probe failed");
        }

        HealthReport {
            database: database.is_ok(),
            encryption: encryption.is_ok(),
            email_enabled: self.email_enabled,
        }
    }
}
