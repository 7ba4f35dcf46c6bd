//! Application composition: shared state and the middleware pipeline.
//!
//! `build_app` is called once per worker by `HttpServer::new` and by the
//! integration tests, so the request path is identical in both.

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    guard,
    http::StatusCode,
    middleware::{ErrorHandlers, Logger},
    web, App,
};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::TokenService;
use crate::config::{Config, RuntimeMode};
use crate::db::Database;
use crate::error;
use crate::middleware::{security_headers, RateLimit, RateLimiter};
use crate::routes;

/// Ceiling for JSON and URL-encoded request bodies.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Process-level facts reported by the informational endpoints.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub started_at: Instant,
    pub mode: RuntimeMode,
}

impl ServerInfo {
    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

/// Everything the workers share. Cloned into each worker's `App`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub tokens: TokenService,
    pub limiter: Arc<RateLimiter>,
    pub info: ServerInfo,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        let tokens = TokenService::from_config(&config);
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max,
            config.rate_limit_window,
        ));
        let info = ServerInfo {
            started_at: Instant::now(),
            mode: config.mode,
        };
        Self {
            config: Arc::new(config),
            db,
            tokens,
            limiter,
            info,
        }
    }
}

fn cors(config: &Config) -> Cors {
    let cors = if config.cors_origin.trim() == "*" {
        Cors::default().allow_any_origin().send_wildcard()
    } else {
        Cors::default()
            .allowed_origin(config.cors_origin.trim())
            .supports_credentials()
    };
    cors.allow_any_method().allow_any_header().max_age(3600)
}

/// Builds the application: middleware, body limits, routes, static files and
/// the 404 fallback.
///
/// Middleware runs outermost first: request logger, security headers, CORS,
/// the rate limiter, then the 500-detail hook. Files under the static
/// directory are exempt from rate limiting.
pub fn build_app(
    state: &AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = actix_web::Error,
    >,
> {
    let static_dir = state.config.static_dir.clone();
    let mut rate_limit = RateLimit::new(Arc::clone(&state.limiter));
    if static_dir.is_dir() {
        rate_limit = rate_limit.exempt_static(static_dir.clone());
    }

    App::new()
        .app_data(web::Data::new(state.db.clone()))
        .app_data(web::Data::new(state.tokens.clone()))
        .app_data(web::Data::new(state.info.clone()))
        .app_data(
            web::JsonConfig::default()
                .limit(MAX_BODY_BYTES)
                .error_handler(error::json_error_handler),
        )
        .app_data(
            web::FormConfig::default()
                .limit(MAX_BODY_BYTES)
                .error_handler(error::form_error_handler),
        )
        .app_data(web::QueryConfig::default().error_handler(error::query_error_handler))
        .app_data(web::PathConfig::default().error_handler(error::path_error_handler))
        .wrap(ErrorHandlers::new().handler(
            StatusCode::INTERNAL_SERVER_ERROR,
            error::expose_internal_detail,
        ))
        .wrap(rate_limit)
        .wrap(cors(&state.config))
        .wrap(security_headers())
        .wrap(Logger::default())
        .service(routes::root::index)
        .service(routes::root::api_index)
        .service(routes::health::health)
        .service(web::scope("/api").configure(routes::config))
        .configure(move |cfg| {
            if static_dir.is_dir() {
                cfg.service(
                    Files::new("/", static_dir)
                        .guard(guard::Any(guard::Get()).or(guard::Head()))
                        .default_handler(web::to(routes::fallback::not_found)),
                );
            } else {
                log::debug!("Static directory {:?} not found; skipping", static_dir);
            }
        })
        .default_service(web::to(routes::fallback::not_found))
}
