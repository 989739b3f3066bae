use thiserror::Error;

pub type Result<T> = std::result::Result<T, RtirError>;

#[derive(Debug, Error)]
pub enum RtirError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Ticket response carried no id")]
    MissingTicketId,
}

impl From<reqwest::Error> for RtirError {
    fn from(err: reqwest::Error) -> Self {
        RtirError::Network(err.to_string())
    }
}
