// ============================
// crates/backend-lib/src/handlers/meetings.rs
// ============================
//! REST surface of the meeting directory and scheduler.
//!
//! Caller identity arrives in `x-user-id` / `x-user-role` headers set
//! by the authenticating proxy; an unknown role is denied outright.
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use campusmeet_common::{Meeting, RecurrenceRequest};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::directory::Caller;
use crate::error::AppError;
use crate::permissions::{self, Role};
use crate::scheduler::{self, ScheduleOutcome};
use crate::store::MeetingStore;
use crate::AppState;

/// Create the REST router for meetings
pub fn create_router<S: MeetingStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/healthz", get(super::healthz))
        .route("/meetings", post(schedule_meeting).get(list_meetings))
        .route("/meetings/{id}", get(get_meeting))
        .route("/meetings/{id}", delete(delete_meeting))
        .route("/meetings/{id}/start", post(start_meeting))
        .route("/meetings/{id}/complete", post(complete_meeting))
        .route("/meetings/{id}/cancel", post(cancel_meeting))
        .with_state(state)
}

// Row-level security is enforced by the data service using this
// identity; the handlers never bypass it.
fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, AppError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Validation("missing x-user-id header".to_string()))?;

    let role = headers
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse)
        // unknown roles fail closed
        .ok_or_else(|| AppError::PermissionDenied {
            role: "unknown".to_string(),
            action: "any".to_string(),
        })?;

    Ok(Caller::new(user_id, role))
}

async fn schedule_meeting<S: MeetingStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(request): Json<RecurrenceRequest>,
) -> Result<(StatusCode, Json<ScheduleOutcome>), AppError> {
    let caller = caller_from_headers(&headers)?;
    let outcome = scheduler::schedule(
        &state.directory,
        Arc::clone(&state.mailer),
        &state.settings,
        &caller,
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn list_meetings<S: MeetingStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Value>>, AppError> {
    let caller = caller_from_headers(&headers)?;
    let meetings = state.directory.list_for(&caller).await?;

    let rows = meetings
        .iter()
        .map(|meeting| permissions::redact_meeting(meeting, caller.role))
        .collect();
    Ok(Json(rows))
}

async fn get_meeting<S: MeetingStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_headers(&headers)?;
    let meeting = state.directory.get(&caller, id).await?;
    Ok(Json(permissions::redact_meeting(&meeting, caller.role)))
}

async fn delete_meeting<S: MeetingStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let caller = caller_from_headers(&headers)?;
    state.directory.delete(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_meeting<S: MeetingStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Meeting>, AppError> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.directory.start(&caller, id).await?))
}

async fn complete_meeting<S: MeetingStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Meeting>, AppError> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.directory.complete(&caller, id).await?))
}

async fn cancel_meeting<S: MeetingStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Meeting>, AppError> {
    let caller = caller_from_headers(&headers)?;
    Ok(Json(state.directory.cancel(&caller, id).await?))
}
