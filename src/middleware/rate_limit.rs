use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        header::{self, HeaderName, HeaderValue},
        Method,
    },
    Error, HttpResponse,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Expired windows are swept once the table grows past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { limit: u32, remaining: u32 },
    Limited { retry_after: Duration },
}

/// Fixed-window request counter keyed by client address.
///
/// One instance is shared by every worker through an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now()).await
    }

    /// Counts one request from `key` at `now`.
    pub async fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut clients = self.clients.lock().await;

        if clients.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            let before = clients.len();
            clients.retain(|_, w| now.duration_since(w.started) < window);
            log::debug!("Swept {} expired rate limit windows", before - clients.len());
        }

        let entry = clients.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            return RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
        }
    }

}

/// Middleware applying a shared `RateLimiter` to every request.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    static_dir: Option<Rc<PathBuf>>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            static_dir: None,
        }
    }

    /// GET and HEAD requests for files that exist under `dir` are served
    /// without counting against the client's allowance.
    pub fn exempt_static(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(Rc::new(dir.into()));
        self
    }
}

/// Maps a request path onto an existing file below `dir`. Paths with `..`,
/// roots or prefixes never match.
fn static_file(dir: &Path, path: &str) -> Option<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));
    let plain = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !plain || relative.as_os_str().is_empty() {
        return None;
    }
    let file = dir.join(relative);
    file.is_file().then_some(file)
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Rc::new(service),
            limiter: Arc::clone(&self.limiter),
            static_dir: self.static_dir.clone(),
        }))
    }
}

pub struct RateLimitService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    static_dir: Option<Rc<PathBuf>>,
}

impl<S> RateLimitService<S> {
    fn is_static_asset(&self, req: &ServiceRequest) -> bool {
        let method = req.method();
        if *method != Method::GET && *method != Method::HEAD {
            return false;
        }
        self.static_dir
            .as_deref()
            .map_or(false, |dir| static_file(dir, req.path()).is_some())
    }
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        if self.is_static_asset(&req) {
            return Box::pin(async move { Ok(service.call(req).await?.map_into_left_body()) });
        }

        let limiter = Arc::clone(&self.limiter);

        Box::pin(async move {
            let key = client_key(&req);
            match limiter.check(&key).await {
                RateDecision::Allowed { limit, remaining } => {
                    let mut res = service.call(req).await?;
                    let headers = res.headers_mut();
                    headers.insert(HeaderName::from_static(LIMIT_HEADER), HeaderValue::from(limit));
                    headers.insert(
                        HeaderName::from_static(REMAINING_HEADER),
                        HeaderValue::from(remaining),
                    );
                    Ok(res.map_into_left_body())
                }
                RateDecision::Limited { retry_after } => {
                    log::warn!("Rate limit exceeded for client {}", key);
                    let retry_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
                    let response = HttpResponse::TooManyRequests()
                        .insert_header((header::RETRY_AFTER, retry_secs.to_string()))
                        .json(json!({
                            "success": false,
                            "message": "Too many requests, please try again later.",
                        }));
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}

fn client_key(req: &ServiceRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App};
    use pretty_assertions::assert_eq;

    #[actix_rt::test]
    async fn test_window_counts_down_then_limits() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(
            limiter.check_at("10.0.0.1", now).await,
            RateDecision::Allowed { limit: 2, remaining: 1 }
        );
        assert_eq!(
            limiter.check_at("10.0.0.1", now).await,
            RateDecision::Allowed { limit: 2, remaining: 0 }
        );
        match limiter.check_at("10.0.0.1", now + Duration::from_secs(15)).await {
            RateDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(45))
            }
            other => panic!("expected limit, got {:?}", other),
        }

        // Other clients have their own window.
        assert!(matches!(
            limiter.check_at("10.0.0.2", now).await,
            RateDecision::Allowed { .. }
        ));
    }

    #[actix_rt::test]
    async fn test_window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let now = Instant::now();

        assert!(matches!(limiter.check_at("c", now).await, RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at("c", now).await, RateDecision::Limited { .. }));
        assert_eq!(
            limiter.check_at("c", now + Duration::from_secs(10)).await,
            RateDecision::Allowed { limit: 1, remaining: 0 }
        );
        assert_eq!(limiter.clients.lock().await.len(), 1);
    }

    #[actix_rt::test]
    async fn test_middleware_rejects_with_payload() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let app = test::init_service(
            App::new()
                .wrap(RateLimit::new(limiter))
                .route("/", web::get().to(|| async { "ok" })),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(LIMIT_HEADER).unwrap(), "1");
        assert_eq!(resp.headers().get(REMAINING_HEADER).unwrap(), "0");

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key(header::RETRY_AFTER));
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({"success": false, "message": "Too many requests, please try again later."})
        );
    }

    #[::core::prelude::v1::test]
    fn test_static_file_stays_inside_directory() {
        let dir = Path::new("public");
        assert_eq!(static_file(dir, "/index.html"), Some(dir.join("index.html")));
        assert_eq!(static_file(dir, "/"), None);
        assert_eq!(static_file(dir, "/missing.css"), None);
        assert_eq!(static_file(dir, "/../Cargo.toml"), None);
        assert_eq!(static_file(dir, "/./index.html"), None);
    }
}
