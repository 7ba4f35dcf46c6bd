//! Database connector.
//!
//! `Database` owns the PostgreSQL pool for the lifetime of the process. It is
//! opened once by the composition root, injected into handlers as
//! `web::Data<Database>`, and closed exactly once at shutdown.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
    closed: Arc<AtomicBool>,
}

impl Database {
    /// Opens the pool and verifies the server is reachable. The pool keeps
    /// at least one connection open so readiness reflects the server.
    pub async fn connect(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await?;
        log::info!(
            "Connected to PostgreSQL (max {} connections)",
            config.database_max_connections
        );
        Ok(Self::from_pool(pool))
    }

    /// Builds a pool without touching the network. The handle reports
    /// itself as disconnected until a connection has been opened.
    pub fn connect_lazy(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy(database_url)?;
        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Applies the embedded migrations in `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        log::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Readiness reported by `/health`: the pool is open and holds at least
    /// one live connection. Connections that fail are dropped from the pool.
    pub fn is_connected(&self) -> bool {
        !self.is_closed() && !self.pool.is_closed() && self.pool.size() > 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the pool. Only the first call across all clones does any work;
    /// it returns `true`, later calls return `false`.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.pool.close().await;
        log::info!("Database connection closed");
        true
    }
}
