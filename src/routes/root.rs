use actix_web::{get, http::header, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::app::ServerInfo;

const FEATURES: &[&str] = &[
    "CRUD for items (create, read, update, delete)",
    "User registration and JWT authentication",
    "One-off and recurring reminders",
    "In-app notifications",
    "Search and filtering by text, category, priority and tags",
    "Item statistics",
    "Tags and categories",
    "Comments",
    "Like/unlike",
    "Progress tracking",
    "Priority levels",
    "Due dates and overdue tracking",
    "Security: rate limiting, CORS, security headers",
];

const AUTH_ENDPOINTS: &[(&str, &str)] = &[
    ("POST /api/auth/register", "Register a new account"),
    ("POST /api/auth/login", "Log in"),
    ("GET /api/auth/profile", "Current user's profile"),
    ("PUT /api/auth/profile", "Update profile"),
    ("POST /api/auth/change-password", "Change password"),
];

const ITEM_ENDPOINTS: &[(&str, &str)] = &[
    ("GET /api/items", "List items (filter, search, pagination)"),
    ("GET /api/items/{id}", "Get one item"),
    ("POST /api/items", "Create an item"),
    ("PUT /api/items/{id}", "Update an item"),
    ("DELETE /api/items/{id}", "Delete an item"),
    ("POST /api/items/{id}/comments", "Add a comment"),
    ("POST /api/items/{id}/like", "Like or unlike"),
    ("GET /api/items/stats/overview", "Statistics"),
];

const REMINDER_ENDPOINTS: &[(&str, &str)] = &[
    ("GET /api/reminders", "List reminders"),
    ("GET /api/reminders/upcoming", "Upcoming reminders"),
    ("GET /api/reminders/active", "Active reminders"),
    ("GET /api/reminders/{id}", "Get one reminder"),
    ("POST /api/reminders", "Create a reminder"),
    ("PUT /api/reminders/{id}", "Update a reminder"),
    ("PUT /api/reminders/{id}/complete", "Mark a reminder completed"),
    ("PUT /api/reminders/{id}/snooze", "Snooze a reminder"),
    ("DELETE /api/reminders/{id}", "Delete a reminder"),
];

const NOTIFICATION_ENDPOINTS: &[(&str, &str)] = &[
    ("GET /api/notifications", "List notifications"),
    ("GET /api/notifications/unread-count", "Unread notification count"),
    ("PUT /api/notifications/{id}/read", "Mark one as read"),
    ("PUT /api/notifications/mark-all-read", "Mark all as read"),
    ("DELETE /api/notifications/{id}", "Delete a notification"),
];

const TECHNOLOGIES: &[&str] = &[
    "Rust + actix-web",
    "PostgreSQL + sqlx",
    "JWT authentication (jsonwebtoken)",
    "bcrypt password hashing",
    "validator",
    "tokio background tasks",
    "CORS",
    "Rate limiting",
];

fn catalog(entries: &[(&str, &str)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(route, description)| (route.to_string(), Value::from(*description)))
        .collect()
}

/// API overview: features, endpoint catalog and technologies.
#[get("/")]
pub async fn index(info: web::Data<ServerInfo>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Taskminder API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": info.mode.as_str(),
        "timestamp": Utc::now().to_rfc3339(),
        "features": FEATURES,
        "endpoints": {
            "auth": catalog(AUTH_ENDPOINTS),
            "items": catalog(ITEM_ENDPOINTS),
            "reminders": catalog(REMINDER_ENDPOINTS),
            "notifications": catalog(NOTIFICATION_ENDPOINTS),
        },
        "technologies": TECHNOLOGIES,
    }))
}

/// `GET /api` points clients at the overview.
#[get("/api")]
pub async fn api_index() -> impl Responder {
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/"))
        .finish()
}
