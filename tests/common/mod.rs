//! Helpers for tests that need a live PostgreSQL (`DATABASE_URL`).
#![allow(dead_code)]

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::{header, StatusCode};
use actix_web::test;
use dotenv::dotenv;
use serde_json::{json, Value};

use taskminder::{AppState, Config, Database};

pub struct TestUser {
    pub id: i64,
    pub token: String,
    pub email: String,
}

/// Connects to `DATABASE_URL`, applies migrations and builds the state.
pub async fn state() -> AppState {
    dotenv().ok();
    let mut config = Config::for_tests();
    config.database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    let db = Database::connect(&config)
        .await
        .expect("Failed to connect to test DB");
    db.migrate().await.expect("Failed to apply migrations");
    AppState::new(config, db)
}

pub async fn cleanup_user(db: &Database, email: &str) {
    // Items, reminders, comments, likes and notifications cascade.
    let _ = sqlx::query("DELETE FROM users WHERE email = $1")
        .bind(email)
        .execute(db.pool())
        .await;
}

pub async fn register<S, B>(app: &S, username: &str, email: &str) -> TestUser
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": username,
            "email": email,
            "password": "Password123!"
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED, "registration failed");
    let body: Value = test::read_body_json(resp).await;
    TestUser {
        id: body["data"]["user"]["id"].as_i64().expect("user id"),
        token: body["data"]["token"].as_str().expect("token").to_string(),
        email: email.to_string(),
    }
}

pub fn bearer(user: &TestUser) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", user.token))
}
