//!
//! # Error Translation
//!
//! This module defines `AppError`, the single error type returned by every
//! handler, extractor and middleware in the service. Each layer produces a
//! tagged variant, and `ResponseError::error_response` turns it into the JSON
//! envelope (`success`, `message`, plus `errors` or `error` depending on the
//! kind) with the matching HTTP status code.
//!
//! `From` implementations exist for `sqlx::Error`, `validator::ValidationErrors`,
//! `jsonwebtoken::errors::Error` and `bcrypt::BcryptError` so handlers can use `?`.

use actix_web::{
    dev::ServiceResponse,
    error::{JsonPayloadError, PathError, QueryPayloadError, ResponseError, UrlencodedError},
    http::StatusCode,
    middleware::ErrorHandlerResponse,
    web, HttpRequest, HttpResponse,
};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use serde_json::json;
use std::fmt;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::app::ServerInfo;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

/// Represents all possible errors that can occur within the application.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Input failed validation (HTTP 400). Carries one message per failing rule.
    Validation(Vec<String>),
    /// Malformed or otherwise unacceptable request (HTTP 400).
    BadRequest(String),
    /// A unique constraint was violated on `field` (HTTP 400).
    Conflict { field: String },
    /// Bearer token could not be decoded or its signature is wrong (HTTP 401).
    InvalidToken,
    /// Bearer token decoded but its `exp` is in the past (HTTP 401).
    TokenExpired,
    /// Authentication missing or credentials rejected (HTTP 401).
    Unauthorized(String),
    /// Resource does not exist or is not visible to the caller (HTTP 404).
    NotFound(String),
    /// Request body exceeded the configured ceiling (HTTP 413).
    PayloadTooLarge,
    /// Error originating from database operations (HTTP 500).
    Database(String),
    /// Any other unexpected server-side failure (HTTP 500).
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Validation(errors) => write!(f, "Validation Error: {}", errors.join("; ")),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::Conflict { field } => write!(f, "Conflict: {} already exists", field),
            AppError::InvalidToken => write!(f, "Unauthorized: invalid token"),
            AppError::TokenExpired => write!(f, "Unauthorized: token expired"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::PayloadTooLarge => write!(f, "Payload Too Large"),
            AppError::Database(msg) => write!(f, "Database Error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Shorthand for a validation failure with a single message.
    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::Validation(vec![message.into()])
    }

    /// Raw detail of a server-side failure, `None` for client errors.
    pub fn internal_detail(&self) -> Option<&str> {
        match self {
            AppError::Database(detail) | AppError::Internal(detail) => Some(detail),
            _ => None,
        }
    }
}

fn internal_body(error: &str) -> serde_json::Value {
    json!({
        "success": false,
        "message": "Something went wrong on the server",
        "error": error,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// `ErrorHandlers` hook for 500 responses.
///
/// `error_response` never reveals the raw detail. When the app's
/// `ServerInfo` mode allows it, this rebuilds the body with the detail of the
/// `AppError` that produced the response.
pub fn expose_internal_detail<B>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let exposes = res
        .request()
        .app_data::<web::Data<ServerInfo>>()
        .map_or(false, |info| info.mode.exposes_error_details());
    let detail = res
        .response()
        .error()
        .and_then(|err| err.as_error::<AppError>())
        .and_then(AppError::internal_detail)
        .map(str::to_owned);

    match detail {
        Some(detail) if exposes => {
            let (req, res) = res.into_parts();
            let body = HttpResponse::build(res.status()).json(internal_body(&detail));
            let res = ServiceResponse::new(req, body).map_into_right_body();
            Ok(ErrorHandlerResponse::Response(res))
        }
        _ => Ok(ErrorHandlerResponse::Response(res.map_into_left_body())),
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Conflict { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::InvalidToken | AppError::TokenExpired | AppError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            AppError::Validation(errors) => json!({
                "success": false,
                "message": "Validation failed",
                "errors": errors,
            }),
            AppError::Conflict { field } => json!({
                "success": false,
                "message": format!("{} already exists", field),
                "field": field,
            }),
            AppError::InvalidToken => json!({
                "success": false,
                "message": "Invalid token",
            }),
            AppError::TokenExpired => json!({
                "success": false,
                "message": "Token has expired",
            }),
            AppError::PayloadTooLarge => json!({
                "success": false,
                "message": "Request body is too large",
            }),
            AppError::BadRequest(msg) | AppError::Unauthorized(msg) | AppError::NotFound(msg) => {
                json!({
                    "success": false,
                    "message": msg,
                })
            }
            AppError::Database(_) | AppError::Internal(_) => {
                log::error!("{}", self);
                internal_body(GENERIC_INTERNAL_MESSAGE)
            }
        };
        HttpResponse::build(status).json(body)
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// `RowNotFound` becomes `NotFound`, unique violations become `Conflict`
/// naming the offending column, and everything else is a `Database` error.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match &error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    let pg_err = db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>();
                    let field = pg_err
                        .and_then(|e| e.detail())
                        .and_then(field_from_detail)
                        .or_else(|| {
                            db_err.constraint().map(|constraint| {
                                field_from_constraint(
                                    constraint,
                                    pg_err.and_then(|e| e.table()),
                                )
                            })
                        })
                        .unwrap_or_else(|| "value".to_string());
                    AppError::Conflict { field }
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    AppError::BadRequest("Referenced record does not exist".into())
                }
                _ => AppError::Database(error.to_string()),
            },
            _ => AppError::Database(error.to_string()),
        }
    }
}

/// Pulls the column list out of a PostgreSQL unique-violation detail,
/// e.g. `Key (email)=(a@b.c) already exists.` yields `email`.
pub fn field_from_detail(detail: &str) -> Option<String> {
    let rest = detail.strip_prefix("Key (")?;
    let end = rest.find(")=(")?;
    let columns = &rest[..end];
    let first = columns.split(',').next()?.trim().trim_matches('"');
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

/// Derives a field name from a constraint named `<table>_<column>_key`.
pub fn field_from_constraint(constraint: &str, table: Option<&str>) -> String {
    let trimmed = constraint
        .strip_suffix("_key")
        .or_else(|| constraint.strip_suffix("_idx"))
        .unwrap_or(constraint);
    let without_table = table
        .and_then(|t| trimmed.strip_prefix(t))
        .and_then(|rest| rest.strip_prefix('_'));
    match without_table {
        Some(field) if !field.is_empty() => field.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Converts `validator::ValidationErrors` into `AppError::Validation`,
/// flattening nested struct and list errors into one message per rule.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> AppError {
        let mut messages = Vec::new();
        collect_validation_messages(&errors, None, &mut messages);
        if messages.is_empty() {
            messages.push("Invalid input".to_string());
        }
        messages.sort();
        AppError::Validation(messages)
    }
}

fn collect_validation_messages(
    errors: &ValidationErrors,
    prefix: Option<&str>,
    out: &mut Vec<String>,
) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, field),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for err in field_errors {
                    let message = match &err.message {
                        Some(message) => message.to_string(),
                        None => format!("{} is invalid ({})", path, err.code),
                    };
                    out.push(message);
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                collect_validation_messages(nested, Some(&path), out)
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    let indexed = format!("{}[{}]", path, index);
                    collect_validation_messages(nested, Some(&indexed), out);
                }
            }
        }
    }
}

/// Converts `jsonwebtoken::errors::Error` into the two token variants.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        match error.kind() {
            JwtErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        }
    }
}

/// Converts `bcrypt::BcryptError` into `AppError::Internal`.
impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::Internal(format!("Password hashing failed: {}", error))
    }
}

/// Error handler for `web::JsonConfig`.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            AppError::PayloadTooLarge
        }
        JsonPayloadError::ContentType => {
            AppError::BadRequest("Content-Type must be application/json".into())
        }
        other => AppError::BadRequest(format!("Invalid JSON body: {}", other)),
    };
    app_err.into()
}

/// Error handler for `web::FormConfig`.
pub fn form_error_handler(err: UrlencodedError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        UrlencodedError::Overflow { .. } => AppError::PayloadTooLarge,
        other => AppError::BadRequest(format!("Invalid form body: {}", other)),
    };
    app_err.into()
}

/// Error handler for `web::QueryConfig`.
pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid query string: {}", err)).into()
}

/// Error handler for `web::PathConfig`.
pub fn path_error_handler(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid path parameter: {}", err)).into()
}
