use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::AppState;

/// Decides whether a request may reach a handler.
///
/// Deployments put submitter checks (captcha, rate limits, network ranges)
/// behind this hook. The default lets everything through.
pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, parts: &Parts) -> bool;
}

pub struct OpenAccess;

impl AccessPolicy for OpenAccess {
    fn authorize(&self, _parts: &Parts) -> bool {
        true
    }
}

/// Marker extractor. Put it first in every handler's argument list.
pub struct Authorized;

impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.access.authorize(parts) {
            Ok(Authorized)
        } else {
            tracing::info!(method = %parts.method, "Request denied by access policy");
            Err(ApiError::Forbidden)
        }
    }
}
