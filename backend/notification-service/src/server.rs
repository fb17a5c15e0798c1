//! `/health` and `/metrics` while consuming

use actix_middleware::{serve_metrics, Logging, MetricsMiddleware};
use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::json;

use crate::consumer::ConsumerStatus;

async fn health(status: web::Data<ConsumerStatus>) -> HttpResponse {
    if status.is_connected() {
        HttpResponse::Ok().json(json!({"status": "healthy", "amqp": "connected"}))
    } else {
        HttpResponse::ServiceUnavailable().json(json!({"status": "degraded", "amqp": "disconnected"}))
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(serve_metrics));
}

pub fn build(status: ConsumerStatus, host: &str, port: u16) -> std::io::Result<Server> {
    let status = web::Data::new(status);
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(status.clone())
            .wrap(Logging)
            .wrap(MetricsMiddleware)
            .configure(configure)
    })
    .workers(1)
    .bind((host, port))?
    .disable_signals()
    .run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_web::test]
    async fn test_health_reflects_consumer_state() {
        let status = ConsumerStatus::default();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(status.clone()))
                .configure(configure),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), 503);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert!(resp.status().is_success());
    }
}
