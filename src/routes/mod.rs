pub mod auth;
pub mod fallback;
pub mod health;
pub mod items;
pub mod notifications;
pub mod reminders;
pub mod root;

use actix_web::web;

use crate::auth::AuthMiddleware;

/// Auth endpoints reachable without a token.
const PUBLIC_AUTH_PATHS: &[&str] = &["/auth/login", "/auth/register"];

/// Mounts the route groups. Registered under the `/api` scope.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .wrap(AuthMiddleware::with_public(PUBLIC_AUTH_PATHS))
            .configure(auth::config),
    )
    .service(
        web::scope("/items")
            .wrap(AuthMiddleware::new())
            .configure(items::config),
    )
    .service(
        web::scope("/reminders")
            .wrap(AuthMiddleware::new())
            .configure(reminders::config),
    )
    .service(
        web::scope("/notifications")
            .wrap(AuthMiddleware::new())
            .configure(notifications::config),
    );
}
