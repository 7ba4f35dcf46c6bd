#![doc = "The `taskminder` library crate."]
#![doc = ""]
#![doc = "Domain models, authentication, the middleware pipeline, route groups,"]
#![doc = "the reminder notifier and process lifecycle for the TaskMinder API."]
#![doc = "The binary (`main.rs`) only wires configuration and calls `lifecycle::serve`."]

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;

pub use crate::app::{build_app, AppState};
pub use crate::config::Config;
pub use crate::db::Database;
pub use crate::error::AppError;
