use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchAdError>;

#[derive(Debug, Error)]
pub enum SearchAdError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Signing error: {0}")]
    Signing(String),
}

impl From<reqwest::Error> for SearchAdError {
    fn from(err: reqwest::Error) -> Self {
        SearchAdError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SearchAdError {
    fn from(err: serde_json::Error) -> Self {
        SearchAdError::Parse(err.to_string())
    }
}
