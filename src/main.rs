use dotenv::dotenv;
use env_logger::Env;
use std::io;
use std::net::TcpListener;

use taskminder::config::RuntimeMode;
use taskminder::services::NotificationService;
use taskminder::{lifecycle, AppState, Config, Database};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let db = Database::connect(&config).await.map_err(|e| {
        log::error!("Failed to connect to database: {}", e);
        io::Error::new(io::ErrorKind::ConnectionRefused, e)
    })?;
    db.migrate().await.map_err(|e| {
        log::error!("Failed to apply migrations: {}", e);
        io::Error::new(io::ErrorKind::Other, e)
    })?;

    let listener = TcpListener::bind((config.server_host.as_str(), config.server_port))?;
    log::info!(
        "Starting TaskMinder server at {} ({})",
        config.server_url(),
        config.mode.as_str()
    );

    let notifier = match config.mode {
        RuntimeMode::Test => None,
        _ => Some(NotificationService::from_config(db.clone(), &config).start()),
    };

    let state = AppState::new(config, db);
    lifecycle::serve(listener, state, notifier, lifecycle::shutdown_signal()).await
}
