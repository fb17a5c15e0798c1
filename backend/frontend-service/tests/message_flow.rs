//! End-to-end HTTP flows against in-process Storage and Encryption servers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actix_middleware::{CorrelationIdMiddleware, HTTP_CORRELATION_ID_HEADER};
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use encryption_service::grpc::{
    correlation_interceptor as encryption_interceptor, EncryptionServiceImpl,
};
use encryption_service::pb::encryption_service_server::EncryptionServiceServer;
use frontend_service::clients::{connect_channel, GrpcEncryptionClient, GrpcStorageClient};
use frontend_service::config::MessageSettings;
use frontend_service::health::{GrpcHealthProbe, HealthChecker};
use frontend_service::web::templates::Pages;
use frontend_service::{AppState, MessageService, RateLimits};
use message_queue::MemoryPublisher;
use serde_json::{json, Value};
use storage_service::config::RetentionSettings;
use storage_service::db::InMemoryMessageRepository;
use storage_service::grpc::{correlation_interceptor as storage_interceptor, DbServiceImpl};
use storage_service::pb::db_service_server::DbServiceServer;
use storage_service::StorageService;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

const BASE_URL: &str = "https://password.exchange";

struct Harness {
    state: web::Data<AppState>,
    repo: Arc<InMemoryMessageRepository>,
    publisher: Arc<MemoryPublisher>,
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn harness(default_max_view_count: i32) -> Harness {
    let repo = Arc::new(InMemoryMessageRepository::new());

    let (storage_listener, storage_addr) = bind().await;
    let store = StorageService::new(repo.clone(), RetentionSettings::default());
    tokio::spawn(async move {
        let (_reporter, health) = tonic_health::server::health_reporter();
        Server::builder()
            .add_service(health)
            .add_service(DbServiceServer::with_interceptor(
                DbServiceImpl::new(store),
                storage_interceptor,
            ))
            .serve_with_incoming(TcpListenerStream::new(storage_listener))
            .await
            .unwrap();
    });

    let (encryption_listener, encryption_addr) = bind().await;
    tokio::spawn(async move {
        let (_reporter, health) = tonic_health::server::health_reporter();
        Server::builder()
            .add_service(health)
            .add_service(EncryptionServiceServer::with_interceptor(
                EncryptionServiceImpl::new(),
                encryption_interceptor,
            ))
            .serve_with_incoming(TcpListenerStream::new(encryption_listener))
            .await
            .unwrap();
    });

    let timeout = Duration::from_secs(5);
    let storage = GrpcStorageClient::new(
        connect_channel(&format!("http://{}", storage_addr), timeout, timeout).unwrap(),
    );
    let encryption = GrpcEncryptionClient::new(
        connect_channel(&format!("http://{}", encryption_addr), timeout, timeout).unwrap(),
    );
    let health = HealthChecker::new(
        Box::new(GrpcHealthProbe::new("storage", storage.channel())),
        Box::new(GrpcHealthProbe::new("encryption", encryption.channel())),
        true,
    );

    let publisher = Arc::new(MemoryPublisher::new());
    let settings = MessageSettings {
        default_max_view_count,
        bcrypt_cost: 4,
        ..MessageSettings::default()
    };
    let messages = MessageService::new(Arc::new(storage), Arc::new(encryption), BASE_URL, settings)
        .with_publisher(publisher.clone());

    Harness {
        state: web::Data::new(AppState {
            messages,
            health,
            pages: Pages::new().unwrap(),
            site_key: None,
            default_max_view_count,
        }),
        repo,
        publisher,
    }
}

fn routes(cfg: &mut web::ServiceConfig) {
    frontend_service::configure(cfg, &RateLimits::default());
}

macro_rules! init_app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data($harness.state.clone())
                .wrap(CorrelationIdMiddleware)
                .configure(routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_submit_then_retrieve_once() {
    let h = harness(1).await;
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/messages")
            .set_json(json!({"content": "hello", "sendNotification": false}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let submitted: Value = test::read_body_json(resp).await;

    let id = submitted["messageId"].as_str().unwrap().to_string();
    let key = submitted["key"].as_str().unwrap().to_string();
    assert_eq!(
        submitted["decryptUrl"],
        format!("{}/decrypt/{}/{}", BASE_URL, id, key)
    );
    assert_eq!(submitted["webUrl"], submitted["decryptUrl"]);
    assert_eq!(submitted["notificationSent"], false);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/messages/{}", id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let info: Value = test::read_body_json(resp).await;
    assert_eq!(info["exists"], true);
    assert_eq!(info["requiresPassphrase"], false);
    assert_eq!(info["hasBeenAccessed"], false);

    let decrypt = || {
        test::TestRequest::post()
            .uri(&format!("/api/v1/messages/{}/decrypt", id))
            .set_json(json!({"decryptionKey": key}))
            .to_request()
    };

    let resp = test::call_service(&app, decrypt()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["content"], "hello");
    assert_eq!(body["viewCount"], 1);
    assert_eq!(body["maxViewCount"], 1);

    let resp = test::call_service(&app, decrypt()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "message_not_found");

    // Ciphertext is all Storage ever saw
    let row = h.repo.raw_message(&id).unwrap();
    assert!(!row.content.contains("hello"));
}

#[actix_web::test]
async fn test_wrong_passphrase_does_not_consume_view() {
    let h = harness(10).await;
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/messages")
            .set_json(json!({"content": "top secret", "passphrase": "s3cret", "maxViewCount": 1}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let submitted: Value = test::read_body_json(resp).await;
    let id = submitted["messageId"].as_str().unwrap().to_string();
    let key = submitted["key"].as_str().unwrap().to_string();

    let decrypt = |passphrase: &str| {
        test::TestRequest::post()
            .uri(&format!("/api/v1/messages/{}/decrypt", id))
            .set_json(json!({"decryptionKey": key, "passphrase": passphrase}))
            .to_request()
    };

    let resp = test::call_service(&app, decrypt("wrong")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_passphrase");
    assert_eq!(h.repo.raw_message(&id).unwrap().view_count, 0);

    let resp = test::call_service(&app, decrypt("s3cret")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["content"], "top secret");

    let resp = test::call_service(&app, decrypt("s3cret")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let row = h.repo.raw_message(&id).unwrap();
    assert_eq!(row.view_count, 1);
    assert!(row.passphrase_hash.starts_with("$2"));
}

#[actix_web::test]
async fn test_notification_is_queued_with_decrypt_url() {
    let h = harness(10).await;
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/messages")
            .set_json(json!({
                "content": "hello",
                "sendNotification": true,
                "sender": {"name": "Alice", "email": "alice@example.com"},
                "recipient": {"name": "Bob", "email": "bob@example.com"},
                "antiSpamAnswer": " Four ",
                "questionId": 1
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let submitted: Value = test::read_body_json(resp).await;
    assert_eq!(submitted["notificationSent"], true);

    let sent = h.publisher.published();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, submitted["decryptUrl"].as_str().unwrap());
    assert_eq!(sent[0].recipient_email, "bob@example.com");

    let id = submitted["messageId"].as_str().unwrap();
    assert_eq!(h.repo.raw_message(id).unwrap().recipient_email, "bob@example.com");
}

#[actix_web::test]
async fn test_validation_errors_are_reported_per_field() {
    let h = harness(10).await;
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/messages")
            .set_json(json!({"content": "hello", "sendNotification": true}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation_failed");
    assert!(body["details"]["sender"].is_string());
    assert!(body["details"]["recipient"].is_string());
    assert_eq!(h.publisher.count(), 0);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/messages")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Invalid request format");
    assert!(body["details"]["parse_error"].is_string());
}

#[actix_web::test]
async fn test_malformed_key_is_rejected_before_lookup() {
    let h = harness(10).await;
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/messages/anything/decrypt")
            .set_json(json!({"decryptionKey": "%%%"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_key_format");
    assert_eq!(body["message"], "Invalid decryption key format");
}

#[actix_web::test]
async fn test_browser_flow() {
    let h = harness(10).await;
    let app = init_app!(h);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/")
            .set_form([("content", "from the browser"), ("other_lastname", "pw")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let encoded = location.strip_prefix("/confirmation?content=").unwrap();
    let decrypt_url = urlencoding::decode(encoded).unwrap().into_owned();
    let path = decrypt_url.strip_prefix(BASE_URL).unwrap().to_string();

    let resp = test::call_service(&app, test::TestRequest::get().uri(&path).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("name=\"passphrase\""));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&path)
            .set_form([("passphrase", "nope")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("Wrong Passphrase/Lastname"));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&path)
            .set_form([("passphrase", "pw")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("from the browser"));
}

#[actix_web::test]
async fn test_invalid_form_rerenders_home() {
    let h = harness(10).await;
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/")
            .set_form([("content", "hello"), ("max_view_count", "500")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("Max view count must be between 1 and 100"));
}

#[actix_web::test]
async fn test_unknown_message_page_is_404() {
    let h = harness(10).await;
    let app = init_app!(h);

    let key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/decrypt/missing/{}", key))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/nowhere").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_health_and_correlation_header() {
    let h = harness(10).await;
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/health")
            .insert_header((HTTP_CORRELATION_ID_HEADER, "trace-me"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(HTTP_CORRELATION_ID_HEADER).unwrap(),
        "trace-me"
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], "1.0.0");
    assert_eq!(body["services"]["database"], "healthy");
    assert_eq!(body["services"]["encryption"], "healthy");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/info").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["endpoints"]["submit"], "POST /api/v1/messages");
    assert_eq!(body["features"]["emailNotifications"], true);
}

#[actix_web::test]
async fn test_form_posts_share_api_rate_limits() {
    let h = harness(10).await;
    let app = init_app!(h);

    let api_submit = || {
        test::TestRequest::post()
            .uri("/api/v1/messages")
            .set_json(json!({"content": "guarded", "passphrase": "s3cret"}))
            .to_request()
    };
    let form_submit = || {
        test::TestRequest::post()
            .uri("/")
            .set_form([("content", "from the form")])
            .to_request()
    };

    let resp = test::call_service(&app, api_submit()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let submitted: Value = test::read_body_json(resp).await;
    let id = submitted["messageId"].as_str().unwrap().to_string();
    let key = submitted["key"].as_str().unwrap().to_string();

    // Ten submissions an hour per client, whichever surface they use
    for _ in 0..9 {
        let resp = test::call_service(&app, form_submit()).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }
    let resp = test::call_service(&app, form_submit()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let resp = test::call_service(&app, api_submit()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    // Twenty passphrase guesses an hour, form and API together
    let page = format!("/decrypt/{}/{}", id, key);
    for _ in 0..20 {
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&page)
                .set_form([("passphrase", "wrong")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&page)
            .set_form([("passphrase", "wrong")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "rate_limit_exceeded");

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/messages/{}/decrypt", id))
            .set_json(json!({"decryptionKey": key, "passphrase": "s3cret"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(h.repo.raw_message(&id).unwrap().view_count, 0);

    // Reading pages is budgeted separately
    let resp = test::call_service(&app, test::TestRequest::get().uri(&page).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
