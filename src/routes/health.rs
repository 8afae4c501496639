//! Health check endpoints
//!
//! `/health` is the liveness check: it answers 200 while the process runs. The
//! session count and storage backend are informational.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::{json_response, text_response};
use crate::server::AppState;
use crate::session::registry::RegistryStats;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always "OK" while the process is up
    pub status: &'static str,
    pub version: &'static str,
    /// Current timestamp
    pub time: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
    /// Document store backend ("memory" or "file")
    pub backend: &'static str,
    pub sessions: RegistryStats,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let registry = state.relay.registry();
    HealthResponse {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
        time: chrono::Utc::now().to_rfc3339(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_sessions: registry.len(),
        backend: state.relay.store().backend(),
        sessions: registry.stats(),
    }
}

/// Handle liveness check (/health, /healthz)
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state))
}

/// `GET /`
pub fn root_banner() -> Response<Full<Bytes>> {
    text_response(StatusCode::OK, "Signer relay running")
}
