//! Pipeline tests that run without a database: the pool is created lazily and
//! never reached by these requests.

use actix_http::Request;
use actix_web::http::{header, StatusCode};
use actix_web::test;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use taskminder::auth::TokenService;
use taskminder::{build_app, AppState, Config, Database};

fn test_state(config: Config) -> AppState {
    let db = Database::connect_lazy(&config.database_url).expect("lazy pool");
    AppState::new(config, db)
}

fn get(uri: &str) -> Request {
    test::TestRequest::get().uri(uri).to_request()
}

fn get_with_token(uri: &str, token: &str) -> Request {
    test::TestRequest::get()
        .uri(uri)
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request()
}

#[test_log::test(actix_rt::test)]
async fn test_health_reports_disconnected_database() {
    let state = test_state(Config::for_tests());
    let app = test::init_service(build_app(&state)).await;

    let resp = test::call_service(&app, get("/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "disconnected");
    assert!(body["memory"]["rss"].is_u64());
}

#[actix_rt::test]
async fn test_unknown_route_lists_available_endpoints() {
    let state = test_state(Config::for_tests());
    let app = test::init_service(build_app(&state)).await;

    for uri in [
        "/does-not-exist",
        "/api/unknown",
        "/api/auth/unknown",
        "/api/items/a/b/c",
        "/api/reminders/x/y/z",
        "/api/notifications/a/b/c",
    ] {
        let resp = test::call_service(&app, get(uri)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "API endpoint not found");
        assert_eq!(body["availableEndpoints"].as_array().unwrap().len(), 7);
    }
}

#[actix_rt::test]
async fn test_root_and_api_index() {
    let state = test_state(Config::for_tests());
    let app = test::init_service(build_app(&state)).await;

    let body: Value = test::call_and_read_body_json(&app, get("/")).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["environment"], "test");
    assert!(body["endpoints"]["items"]["GET /api/items"].is_string());

    let resp = test::call_service(&app, get("/api")).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/");
}

#[actix_rt::test]
async fn test_security_headers_on_success_and_rejection() {
    let state = test_state(Config::for_tests());
    let app = test::init_service(build_app(&state)).await;

    for uri in ["/health", "/api/items"] {
        let resp = test::call_service(&app, get(uri)).await;
        let headers = resp.headers();
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff", "{}", uri);
        assert_eq!(headers.get("x-frame-options").unwrap(), "SAMEORIGIN", "{}", uri);
        assert!(headers.contains_key("strict-transport-security"), "{}", uri);
        assert!(headers.contains_key("x-ratelimit-limit"), "{}", uri);
    }
}

#[actix_rt::test]
async fn test_rate_limit_rejects_excess_requests() {
    let mut config = Config::for_tests();
    config.rate_limit_max = 2;
    let state = test_state(config);
    let app = test::init_service(build_app(&state)).await;

    for _ in 0..2 {
        let resp = test::call_service(&app, get("/health")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = test::call_service(&app, get("/health")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body,
        json!({"success": false, "message": "Too many requests, please try again later."})
    );
}

#[actix_rt::test]
async fn test_static_files_do_not_count_against_rate_limit() {
    let mut config = Config::for_tests();
    config.rate_limit_max = 1;
    let state = test_state(config);
    let app = test::init_service(build_app(&state)).await;

    for _ in 0..3 {
        let resp = test::call_service(&app, get("/index.html")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!resp.headers().contains_key("x-ratelimit-limit"));
    }

    let resp = test::call_service(&app, get("/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = test::call_service(&app, get("/health")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[actix_rt::test]
async fn test_huge_page_number_is_rejected() {
    let config = Config::for_tests();
    let token = TokenService::from_config(&config).generate(1).unwrap();
    let state = test_state(config);
    let app = test::init_service(build_app(&state)).await;

    for uri in [
        "/api/items?page=9223372036854775807",
        "/api/reminders?page=9223372036854775807&limit=100",
        "/api/notifications?page=9223372036854775807",
    ] {
        let resp = test::call_service(&app, get_with_token(uri, &token)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["errors"], json!(["Page is out of range"]), "{}", uri);
    }
}

#[actix_rt::test]
async fn test_malformed_snooze_body_is_rejected() {
    let config = Config::for_tests();
    let token = TokenService::from_config(&config).generate(1).unwrap();
    let state = test_state(config);
    let app = test::init_service(build_app(&state)).await;

    let req = test::TestRequest::put()
        .uri("/api/reminders/5f0c6f1e-2b8e-4d7a-9c51-0c9b7e2d4a10/snooze")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .insert_header(header::ContentType::json())
        .set_payload(r#"{"minutes":"abc"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().starts_with("Invalid JSON body"));
}

#[actix_rt::test]
async fn test_oversized_json_body_is_rejected() {
    let state = test_state(Config::for_tests());
    let app = test::init_service(build_app(&state)).await;

    let payload = vec![b' '; 11 * 1024 * 1024];
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .insert_header(header::ContentType::json())
        .set_payload(payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[actix_rt::test]
async fn test_register_validation_errors() {
    let state = test_state(Config::for_tests());
    let app = test::init_service(build_app(&state)).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({"username": "a!", "email": "not-an-email", "password": "123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Validation failed");
    let errors = body["errors"].as_array().unwrap();
    assert!(errors.contains(&json!("A valid email address is required")));
    assert!(errors.contains(&json!("Password must be at least 6 characters")));

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .insert_header(header::ContentType::json())
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_protected_routes_require_valid_token() {
    let config = Config::for_tests();
    let tokens = TokenService::from_config(&config);
    let state = test_state(config);
    let app = test::init_service(build_app(&state)).await;

    for uri in [
        "/api/items",
        "/api/reminders",
        "/api/notifications",
        "/api/auth/profile",
    ] {
        let resp = test::call_service(&app, get(uri)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Access token is required", "{}", uri);
    }

    let resp = test::call_service(&app, get_with_token("/api/items", "not.a.token")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Invalid token");

    let expired = tokens
        .generate_at(1, Utc::now() - Duration::hours(48))
        .unwrap();
    let resp = test::call_service(&app, get_with_token("/api/reminders", &expired)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Token has expired");

    let foreign = TokenService::new("some-other-secret", Duration::hours(1))
        .generate(1)
        .unwrap();
    let resp = test::call_service(&app, get_with_token("/api/notifications", &foreign)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Invalid token");
}

#[actix_rt::test]
async fn test_cors_allows_configured_origin() {
    let config = Config::for_tests();
    let origin = config.cors_origin.clone();
    let state = test_state(config);
    let app = test::init_service(build_app(&state)).await;

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/api/items")
        .insert_header((header::ORIGIN, origin.as_str()))
        .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        origin.as_str()
    );

    let req = test::TestRequest::get()
        .uri("/health")
        .insert_header((header::ORIGIN, origin.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        origin.as_str()
    );
}
