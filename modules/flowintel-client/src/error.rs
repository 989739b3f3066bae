use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowintelError>;

#[derive(Debug, Error)]
pub enum FlowintelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Case response carried no case_id")]
    MissingCaseId,
}

impl From<reqwest::Error> for FlowintelError {
    fn from(err: reqwest::Error) -> Self {
        FlowintelError::Network(err.to_string())
    }
}
