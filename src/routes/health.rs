use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sysinfo::System;

use crate::app::ServerInfo;
use crate::db::Database;

/// Resident and virtual memory of this process, in bytes.
#[derive(Debug, Default, Serialize)]
pub struct MemoryUsage {
    pub rss: u64,
    pub virtual_memory: u64,
}

fn memory_usage() -> MemoryUsage {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(e) => {
            log::warn!("Cannot determine current pid: {}", e);
            return MemoryUsage::default();
        }
    };
    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        return MemoryUsage::default();
    }
    sys.process(pid)
        .map(|process| MemoryUsage {
            rss: process.memory(),
            virtual_memory: process.virtual_memory(),
        })
        .unwrap_or_default()
}

/// Health check endpoint
///
/// Reports uptime, process memory and whether the database pool is usable.
/// Always answers 200; `database` is `"connected"` or `"disconnected"`.
#[get("/health")]
pub async fn health(db: web::Data<Database>, info: web::Data<ServerInfo>) -> impl Responder {
    let database = if db.is_connected() {
        "connected"
    } else {
        "disconnected"
    };

    HttpResponse::Ok().json(json!({
        "success": true,
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime": info.uptime_secs(),
        "memory": memory_usage(),
        "database": database,
    }))
}
