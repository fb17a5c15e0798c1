use actix_middleware::{CorrelationIdMiddleware, RateLimitMiddleware};
use actix_web::{test, web, App, HttpResponse};

async fn test_handler() -> HttpResponse {
    HttpResponse::Ok().body("success")
}

#[actix_web::test]
async fn test_rate_limit_exceeded() {
    let app = test::init_service(
        App::new()
            .service(
                web::scope("/limited")
                    .wrap(RateLimitMiddleware::per_hour(2))
                    .route("", web::get().to(test_handler)),
            )
            .wrap(CorrelationIdMiddleware),
    )
    .await;

    for _ in 0..2 {
        let req = test::TestRequest::get().uri("/limited").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    let req = test::TestRequest::get()
        .uri("/limited")
        .insert_header(("X-Correlation-ID", "trace-42"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 429);
    assert_eq!(resp.headers().get("X-RateLimit-Limit").unwrap(), "2");
    assert_eq!(resp.headers().get("X-RateLimit-Remaining").unwrap(), "0");
    assert!(resp.headers().get("Retry-After").is_some());
    assert_eq!(resp.headers().get("x-correlation-id").unwrap(), "trace-42");

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["correlation_id"], "trace-42");
    assert_eq!(body["path"], "/limited");
    assert_eq!(body["message"], "Rate limit exceeded. Please try again later.");
}

#[actix_web::test]
async fn test_limiters_are_independent_per_group() {
    // One limiter per route group, each built once and shared
    let submit = RateLimitMiddleware::per_hour(1);
    let health = RateLimitMiddleware::per_hour(5);

    let app = test::init_service(
        App::new()
            .service(
                web::scope("/submit")
                    .wrap(submit.clone())
                    .route("", web::post().to(test_handler)),
            )
            .service(
                web::scope("/health")
                    .wrap(health.clone())
                    .route("", web::get().to(test_handler)),
            ),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::post().uri("/submit").to_request()).await;
    assert!(resp.status().is_success());
    let resp = test::call_service(&app, test::TestRequest::post().uri("/submit").to_request()).await;
    assert_eq!(resp.status().as_u16(), 429);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());
}
