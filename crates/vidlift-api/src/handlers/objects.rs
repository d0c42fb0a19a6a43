use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use validator::Validate;
use vidlift_core::models::{
    ListObjectsQuery, ListObjectsResponse, ObjectSizeResponse, PresignQuery, SignedMethod,
};
use vidlift_core::TransferError;
use vidlift_storage::parse_range_header;

use super::object_body;
use crate::error::HttpAppError;
use crate::state::AppState;

pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListObjectsQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let prefix = query.prefix.unwrap_or_default();
    let objects = state.coordinator.list_objects(&prefix).await?;
    Ok(Json(ListObjectsResponse { objects }))
}

/// Whole object, or a single byte range when a `Range` header is present.
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpAppError> {
    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    match range_header {
        Some(value) => {
            let size = state.coordinator.object_size(&name).await?;
            let range = parse_range_header(value, size).ok_or_else(|| {
                TransferError::InvalidArgument(format!("Malformed Range header: {}", value))
            })?;
            let data = state.coordinator.fetch_part(&name, range.clone()).await?;
            Ok(object_body(data, Some((range, size))))
        }
        None => {
            let data = state.coordinator.fetch_object(&name).await?;
            Ok(object_body(data, None))
        }
    }
}

pub async fn object_size(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let size = state.coordinator.object_size(&name).await?;
    Ok(Json(ObjectSizeResponse { name, size }))
}

/// Delete from every backend. 404 when no backend had the object, 502 when any backend
/// failed; the body always carries the per-backend report.
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let report = state.coordinator.delete_object(&name).await?;
    let status = if !report.failed.is_empty() {
        StatusCode::BAD_GATEWAY
    } else if !report.removed_anywhere() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}

pub async fn presign(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PresignQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    query.validate()?;
    let method = query.method.unwrap_or(SignedMethod::Get);
    let response = state
        .coordinator
        .presign_object(&query.name, method, None)
        .await?;
    Ok(Json(response))
}
