use actix_web::HttpResponse;
use serde_json::json;

/// Routes listed in every 404 body.
pub const AVAILABLE_ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /health",
    "POST /api/auth/register",
    "POST /api/auth/login",
    "GET /api/items",
    "GET /api/reminders",
    "GET /api/notifications",
];

/// Catch-all for unmatched routes and missing static files.
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "success": false,
        "message": "API endpoint not found",
        "availableEndpoints": AVAILABLE_ENDPOINTS,
    }))
}
