use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use draugnet_core::DraugnetError;
use misp_client::{ExportFormat, Exported};
use serde::Deserialize;

use super::{non_empty, parse_json};
use crate::auth::Authorized;
use crate::error::ApiError;
use crate::AppState;

// --- Query structs ---

#[derive(Debug, Default, Deserialize)]
pub struct RetrieveQuery {
    pub token: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// Missing or empty means JSON.
pub(crate) fn parse_format(format: Option<&str>) -> Result<ExportFormat, ApiError> {
    match non_empty(format) {
        None => Ok(ExportFormat::Json),
        Some(f) => f
            .to_ascii_lowercase()
            .parse()
            .map_err(|e: String| ApiError::from(DraugnetError::Validation(e))),
    }
}

fn export_response(exported: Exported) -> Response {
    match exported {
        Exported::Json(value) => Json(value).into_response(),
        Exported::Text(text) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
    }
}

async fn retrieve(state: &AppState, token: Option<&str>, format: Option<&str>) -> Result<Response, ApiError> {
    let token = non_empty(token)
        .ok_or_else(|| ApiError::from(DraugnetError::Validation("Missing token.".into())))?;
    let format = parse_format(format)?;
    let exported = state.share.retrieve(token, format).await?;
    Ok(export_response(exported))
}

// --- Handlers ---

pub async fn retrieve_by_path(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, ApiError> {
    retrieve(&state, Some(&token), query.format.as_deref()).await
}

pub async fn retrieve_by_query(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RetrieveQuery>,
) -> Result<Response, ApiError> {
    retrieve(&state, query.token.as_deref(), query.format.as_deref()).await
}

/// `POST /retrieve` with `{token, format?}`.
pub async fn retrieve_by_body(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = parse_json(&body)?;
    let field = |key: &str| body.get(key).and_then(|v| v.as_str()).map(String::from);
    let (token, format) = (field("token"), field("format"));
    retrieve(&state, token.as_deref(), format.as_deref()).await
}

/// `POST /retrieve/{token}`. The format comes from the query string or an
/// optional `{format}` body.
pub async fn retrieve_by_path_post(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<FormatQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let format = match query.format {
        Some(format) => Some(format),
        None if body.is_empty() => None,
        None => parse_json(&body)?
            .get("format")
            .and_then(|v| v.as_str())
            .map(String::from),
    };
    retrieve(&state, Some(&token), format.as_deref()).await
}

pub async fn timestamp(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<String, ApiError> {
    let ts = state.share.last_touch(&token).await?;
    Ok(ts.to_string())
}
