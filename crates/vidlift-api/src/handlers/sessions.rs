//! Upload session handlers.
//!
//! Proxied clients PUT raw part bodies here; direct clients upload through the signed
//! URLs returned at initiation and acknowledge each part's ETag.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use uuid::Uuid;
use vidlift_core::models::{AcknowledgePartRequest, InitiateSessionRequest};

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

pub async fn initiate_session(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitiateSessionRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let ticket = state.coordinator.initiate_upload(&request).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn session_progress(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(Json(state.coordinator.progress(session_id).await?))
}

pub async fn abort_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    state.coordinator.abort(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_part(
    State(state): State<Arc<AppState>>,
    Path((session_id, index)): Path<(Uuid, u32)>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let receipt = state.coordinator.submit_part(session_id, index, body).await?;
    Ok(Json(receipt))
}

pub async fn acknowledge_part(
    State(state): State<Arc<AppState>>,
    Path((session_id, index)): Path<(Uuid, u32)>,
    ValidatedJson(request): ValidatedJson<AcknowledgePartRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let etag = request.etag.trim().trim_matches('"').to_string();
    let receipt = state
        .coordinator
        .acknowledge_part(session_id, index, etag)
        .await?;
    Ok(Json(receipt))
}

pub async fn finalize_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(Json(state.coordinator.finalize(session_id).await?))
}
