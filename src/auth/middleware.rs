use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::auth::token::TokenService;
use crate::error::AppError;

/// Requires a valid `Authorization: Bearer <token>` header on every routed
/// request in the wrapped scope, except for the public path suffixes it was
/// built with. Unrouted paths pass through so they answer 404, not 401.
///
/// On success the decoded `Claims` are stored in the request extensions for
/// `AuthenticatedUser` to pick up. Rejections are rendered here, so outer
/// middleware still sees a response.
#[derive(Clone, Default)]
pub struct AuthMiddleware {
    public_suffixes: &'static [&'static str],
}

impl AuthMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves requests whose path ends with one of `suffixes` unauthenticated.
    pub fn with_public(suffixes: &'static [&'static str]) -> Self {
        Self {
            public_suffixes: suffixes,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            public_suffixes: self.public_suffixes,
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    public_suffixes: &'static [&'static str],
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let path = req.path().trim_end_matches('/');
        let public = self
            .public_suffixes
            .iter()
            .any(|suffix| path.ends_with(suffix));
        // Paths no route claims fall through to the 404 handler untouched.
        if public || req.match_pattern().is_none() {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        let verified = match (token, req.app_data::<web::Data<TokenService>>()) {
            (None, _) => Err(AppError::Unauthorized("Access token is required".into())),
            (Some(token), Some(tokens)) => tokens.verify(token),
            (Some(_), None) => Err(AppError::Internal("Token service is not configured".into())),
        };

        match verified {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
            }
            Err(app_err) => {
                log::debug!("Rejected request to {}: {}", req.path(), app_err);
                let res = req.error_response(app_err).map_into_right_body();
                Box::pin(async move { Ok(res) })
            }
        }
    }
}
