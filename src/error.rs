use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExplorerError>;

/// Outcome of a failed lookup against one of the data sources.
///
/// Every asynchronous operation resolves to a value or one of these; nothing
/// escapes to the rendering layer as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("invalid request: {0}")]
    ValidationFailure(String),
}

impl FetchError {
    /// Malformed identifiers and queries are shown to the user as plain absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound | FetchError::ValidationFailure(_))
    }

    pub fn transport(error: impl std::fmt::Display) -> Self {
        FetchError::TransportFailure(error.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            FetchError::NotFound
        } else if error.is_decode() {
            FetchError::ValidationFailure(error.to_string())
        } else {
            FetchError::TransportFailure(error.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Error: {0}")]
    Generic(String),
}

impl From<String> for ExplorerError {
    fn from(error: String) -> Self {
        ExplorerError::Generic(error)
    }
}

impl From<&str> for ExplorerError {
    fn from(error: &str) -> Self {
        ExplorerError::Generic(error.to_string())
    }
}
