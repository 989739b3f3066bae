pub mod retrieve;
pub mod share;
pub mod templates;

use axum::body::Bytes;
use axum::Json;
use draugnet_core::DraugnetError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Authorized;
use crate::error::ApiError;

// --- Query structs ---

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

impl TokenQuery {
    /// `?token=` with an empty value counts as absent.
    pub fn token(&self) -> Option<&str> {
        non_empty(self.token.as_deref())
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Bodies are parsed by hand so a missing `Content-Type` header from a plain
/// HTML form still gets through.
pub(crate) fn parse_json(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        ApiError::from(DraugnetError::Validation(format!("Invalid JSON body: {e}")))
    })
}

// --- Index ---

pub async fn index(_auth: Authorized) -> Json<Value> {
    Json(json!({ "message": "Draugnet is running" }))
}

/// Submission formats and the endpoint that accepts each.
pub async fn share_formats(_auth: Authorized) -> Json<Value> {
    Json(json!({
        "formats": {
            "misp": {
                "name": "MISP",
                "description": "MISP format",
                "url": "/share/misp",
                "method": "POST",
            },
            "raw": {
                "name": "Raw",
                "description": "Raw format for freetext parsing",
                "url": "/share/raw",
                "method": "POST",
            },
            "objects": {
                "name": "Objects",
                "description": "Data encoded as MISP Objects",
                "url": "/share/objects",
                "method": "POST",
            },
        }
    }))
}
