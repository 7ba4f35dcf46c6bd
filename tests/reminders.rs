mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{bearer, cleanup_user, register};
use taskminder::build_app;

fn parse_time(value: &Value) -> DateTime<Utc> {
    value.as_str().unwrap().parse().unwrap()
}

#[actix_rt::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_reminder_lifecycle() {
    let state = common::state().await;
    let email = "reminders-flow@example.com";
    cleanup_user(&state.db, email).await;
    let app = test::init_service(build_app(&state)).await;
    let user = register(&app, "reminders_flow_user", email).await;

    let req = test::TestRequest::post()
        .uri("/api/reminders")
        .insert_header(bearer(&user))
        .set_json(json!({"title": "Too late", "remind_at": Utc::now() - Duration::minutes(5)}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["errors"], json!(["Reminder time must be in the future"]));

    let req = test::TestRequest::post()
        .uri("/api/reminders")
        .insert_header(bearer(&user))
        .set_json(json!({
            "title": "Stand-up",
            "remind_at": Utc::now() + Duration::hours(2),
            "recurrence": "daily"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["recurrence"], "daily");

    let req = test::TestRequest::post()
        .uri("/api/reminders")
        .insert_header(bearer(&user))
        .set_json(json!({"title": "Next week", "remind_at": Utc::now() + Duration::days(7)}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri("/api/reminders/upcoming?hours=24")
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let upcoming = body["data"].as_array().unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0]["title"], "Stand-up");

    let before = Utc::now();
    let req = test::TestRequest::put()
        .uri(&format!("/api/reminders/{}/snooze", id))
        .insert_header(bearer(&user))
        .set_json(json!({"minutes": 30}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Reminder snoozed for 30 minutes");
    assert_eq!(body["data"]["snooze_count"], 1);
    assert!(parse_time(&body["data"]["remind_at"]) >= before + Duration::minutes(30));

    // No body: default snooze.
    let req = test::TestRequest::put()
        .uri(&format!("/api/reminders/{}/snooze", id))
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["snooze_count"], 2);

    let req = test::TestRequest::put()
        .uri(&format!("/api/reminders/{}/complete", id))
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "completed");

    let req = test::TestRequest::get()
        .uri("/api/reminders/active")
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/reminders?status=completed")
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/reminders/{}", id))
        .insert_header(bearer(&user))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    let req = test::TestRequest::get()
        .uri(&format!("/api/reminders/{}", id))
        .insert_header(bearer(&user))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    cleanup_user(&state.db, email).await;
}

#[actix_rt::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_reminder_item_must_belong_to_caller() {
    let state = common::state().await;
    let owner_email = "reminders-owner@example.com";
    let other_email = "reminders-other@example.com";
    cleanup_user(&state.db, owner_email).await;
    cleanup_user(&state.db, other_email).await;
    let app = test::init_service(build_app(&state)).await;
    let owner = register(&app, "reminders_owner", owner_email).await;
    let other = register(&app, "reminders_other", other_email).await;

    let req = test::TestRequest::post()
        .uri("/api/items")
        .insert_header(bearer(&owner))
        .set_json(json!({"title": "Owner's item", "is_public": true}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let item_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/reminders")
        .insert_header(bearer(&other))
        .set_json(json!({
            "title": "Not mine",
            "remind_at": Utc::now() + Duration::hours(1),
            "item_id": item_id
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Item not found");

    cleanup_user(&state.db, owner_email).await;
    cleanup_user(&state.db, other_email).await;
}
