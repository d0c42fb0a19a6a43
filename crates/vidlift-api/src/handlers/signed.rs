//! Signed-URL endpoint for backends without native presigning (local disk, memory).
//!
//! The signature and expiry are verified before any storage call. A PUT carrying
//! `uploadId` and `partNumber` stores one multipart part; any other PUT writes the whole
//! object.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;
use vidlift_core::models::SignedMethod;
use vidlift_storage::{execute_signed_get, execute_signed_put, SignedRequest};

use super::object_body;
use crate::error::HttpAppError;
use crate::state::AppState;

pub async fn signed_put(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let request = SignedRequest::from_query(SignedMethod::Put, key, params)?;
    let size = body.len();
    let etag = execute_signed_put(state.storage().as_ref(), state.signer(), &request, body).await?;

    tracing::debug!(key = %request.key, size_bytes = size, "Signed upload stored");

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
        headers.insert(header::ETAG, value);
    }
    Ok((StatusCode::OK, headers))
}

pub async fn signed_get(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpAppError> {
    let request = SignedRequest::from_query(SignedMethod::Get, key, params)?;
    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let read =
        execute_signed_get(state.storage().as_ref(), state.signer(), &request, range_header).await?;
    Ok(object_body(read.data, read.range))
}
