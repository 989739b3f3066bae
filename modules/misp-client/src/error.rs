use thiserror::Error;

pub type Result<T> = std::result::Result<T, MispError>;

#[derive(Debug, Error)]
pub enum MispError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// MISP answered 2xx but the body carried an `errors` member.
    #[error("MISP rejected the request: {0}")]
    Rejected(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for MispError {
    fn from(err: reqwest::Error) -> Self {
        MispError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for MispError {
    fn from(err: serde_json::Error) -> Self {
        MispError::Parse(err.to_string())
    }
}
