//! Request-level error taxonomy.
//!
//! Module dispatch failures never appear here: they are collected as
//! per-module reports and returned alongside a successful receipt.

use thiserror::Error;

use crate::normalize::NormalizeError;
use crate::store::StoreError;
use crate::templates::TemplateError;

#[derive(Debug, Error)]
pub enum DraugnetError {
    /// Malformed body or invalid template name.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authorized")]
    Forbidden,

    /// Unknown token or template.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A structured object could not be built from the submitted fields.
    #[error("Object creation failed: {0}")]
    ObjectBuild(String),

    /// Repository or store unreachable, or the repository refused the write.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, DraugnetError>;

impl From<StoreError> for DraugnetError {
    fn from(err: StoreError) -> Self {
        DraugnetError::Upstream(err.to_string())
    }
}

impl From<misp_client::MispError> for DraugnetError {
    fn from(err: misp_client::MispError) -> Self {
        DraugnetError::Upstream(err.to_string())
    }
}

impl From<NormalizeError> for DraugnetError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::ObjectBuild { .. } => DraugnetError::ObjectBuild(err.to_string()),
            other => DraugnetError::Validation(other.to_string()),
        }
    }
}

impl From<TemplateError> for DraugnetError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::InvalidName(_) => DraugnetError::Validation(err.to_string()),
            TemplateError::NotFound(name) => DraugnetError::NotFound(format!("template {name}")),
            TemplateError::Io(_) | TemplateError::Parse(_) => {
                DraugnetError::Upstream(err.to_string())
            }
        }
    }
}
