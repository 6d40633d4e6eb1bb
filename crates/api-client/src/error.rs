// In crates/api-client/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build the API client: {0}")]
    ClientBuildError(String),
    /// Built with [`Error::request`], which drops the URL: it can carry an API key.
    #[error("Request failed: {0}")]
    RequestFailed(reqwest::Error),
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("API error: status {status}, msg: {msg}")]
    ApiError { status: u16, msg: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl Error {
    pub(crate) fn request(e: reqwest::Error) -> Self {
        Error::RequestFailed(e.without_url())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
