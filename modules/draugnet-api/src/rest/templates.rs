use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::non_empty;
use crate::auth::Authorized;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TemplateQuery {
    pub template: Option<String>,
}

/// Without `?template` lists the offered template names, with it returns
/// that template's definition.
pub async fn object_templates(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<Value>, ApiError> {
    match non_empty(query.template.as_deref()) {
        Some(name) => Ok(Json(state.share.template_definition(name).await?)),
        None => {
            let names = state.share.list_templates().await?;
            Ok(Json(Value::from(names)))
        }
    }
}
