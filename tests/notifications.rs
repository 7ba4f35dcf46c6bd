mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration as StdDuration;

use common::{bearer, cleanup_user, register};
use taskminder::build_app;
use taskminder::services::NotificationService;

#[actix_rt::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_due_reminders_become_notifications() {
    let state = common::state().await;
    let email = "notifications-flow@example.com";
    cleanup_user(&state.db, email).await;
    let app = test::init_service(build_app(&state)).await;
    let user = register(&app, "notifications_user", email).await;

    let mut reminder_ids = Vec::new();
    for (title, recurrence) in [("Water plants", "weekly"), ("Call bank", "none")] {
        let req = test::TestRequest::post()
            .uri("/api/reminders")
            .insert_header(bearer(&user))
            .set_json(json!({
                "title": title,
                "remind_at": Utc::now() + Duration::hours(1),
                "recurrence": recurrence
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        reminder_ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }

    // Fire both as if an hour had passed.
    let service = NotificationService::new(state.db.clone(), StdDuration::from_secs(60), 30);
    let fired_at = Utc::now() + Duration::hours(2);
    let dispatched = service.dispatch_due(fired_at).await.unwrap();
    assert!(dispatched >= 2);
    // Already fired for this occurrence: a second pass leaves them alone.
    service.dispatch_due(fired_at).await.unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/reminders/{}", reminder_ids[0]))
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["trigger_count"], 1);
    let next: chrono::DateTime<Utc> = body["data"]["remind_at"].as_str().unwrap().parse().unwrap();
    assert!(next > fired_at);

    let req = test::TestRequest::get()
        .uri("/api/notifications?kind=reminder")
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let notifications = body["data"]["notifications"].as_array().unwrap().clone();
    assert_eq!(notifications.len(), 2);
    assert_eq!(body["data"]["unread_count"], 2);
    let first_id = notifications[0]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri(&format!("/api/notifications/{}/read", first_id))
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["is_read"], true);

    let req = test::TestRequest::get()
        .uri("/api/notifications?unread_only=true")
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let req = test::TestRequest::put()
        .uri("/api/notifications/mark-all-read")
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["updated"], 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/notifications/{}", first_id))
        .insert_header(bearer(&user))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    let req = test::TestRequest::delete()
        .uri(&format!("/api/notifications/{}", first_id))
        .insert_header(bearer(&user))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    // Everything left is read; a cutoff in the future purges it.
    let purged = service
        .purge_read(Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert!(purged >= 1);
    let req = test::TestRequest::get()
        .uri("/api/notifications/unread-count")
        .insert_header(bearer(&user))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["unread_count"], 0);

    cleanup_user(&state.db, email).await;
}
