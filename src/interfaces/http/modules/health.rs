//! Health check handler

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde::Serialize;

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    /// `None` when running on the in-memory store
    pub db: Option<DatabaseConnection>,
    pub started_at: Arc<Instant>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub storage: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub backend: &'static str,
    pub status: &'static str,
    pub latency_ms: Option<u64>,
}

/// `GET /health`
pub async fn health_check(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = match &state.db {
        None => ComponentHealth {
            backend: "memory",
            status: "ok",
            latency_ms: None,
        },
        Some(db) => {
            let started = Instant::now();
            let ping = db
                .execute(Statement::from_string(db.get_database_backend(), "SELECT 1"))
                .await;
            ComponentHealth {
                backend: "database",
                status: if ping.is_ok() { "ok" } else { "error" },
                latency_ms: ping.ok().map(|_| started.elapsed().as_millis() as u64),
            }
        }
    };

    let (status, code) = if storage.status == "ok" {
        ("ok", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            storage,
        }),
    )
}
