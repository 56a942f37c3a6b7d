// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers for the meeting directory.

pub mod meetings;

use axum::http::StatusCode;

/// Liveness probe
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
