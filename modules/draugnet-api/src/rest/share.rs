use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use draugnet_core::normalize::FreetextRequest;
use draugnet_core::{DraugnetError, OptionalFields, ShareReceipt};

use super::{parse_json, TokenQuery};
use crate::auth::Authorized;
use crate::error::ApiError;
use crate::AppState;

type ShareResult = Result<Json<ShareReceipt>, ApiError>;

// --- Structured records ---

pub async fn share_misp(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> ShareResult {
    let body = parse_json(&body)?;
    let receipt = state.share.share_event(&body, query.token()).await?;
    Ok(Json(receipt))
}

pub async fn share_misp_token(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Bytes,
) -> ShareResult {
    let body = parse_json(&body)?;
    let receipt = state.share.share_event(&body, Some(&token)).await?;
    Ok(Json(receipt))
}

// --- Freetext ---

pub async fn share_raw(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> ShareResult {
    let body = parse_json(&body)?;
    let request = FreetextRequest::from_value(&body).map_err(DraugnetError::from)?;
    let receipt = state
        .share
        .share_freetext(&request.text, request.optional, query.token())
        .await?;
    Ok(Json(receipt))
}

/// Appends the raw request body to an existing submission.
pub async fn update_raw(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: String,
) -> ShareResult {
    let receipt = state
        .share
        .share_freetext(body.trim(), OptionalFields::default(), Some(&token))
        .await?;
    Ok(Json(receipt))
}

// --- Objects ---

pub async fn share_objects(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> ShareResult {
    let body = parse_json(&body)?;
    let receipt = state.share.share_object(&body, query.token()).await?;
    Ok(Json(receipt))
}

pub async fn share_objects_token(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Bytes,
) -> ShareResult {
    let body = parse_json(&body)?;
    let receipt = state.share.share_object(&body, Some(&token)).await?;
    Ok(Json(receipt))
}
