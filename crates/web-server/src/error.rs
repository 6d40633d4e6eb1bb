// In crates/web-server/src/error.rs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Trading(#[from] execution::Error),

    #[error(transparent)]
    Pricing(#[from] pricing::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("Failed to bind server address: {0}")]
    ServerBindError(std::io::Error),

    #[error("Server error: {0}")]
    ServeError(std::io::Error),
}

impl From<core_types::Error> for Error {
    fn from(e: core_types::Error) -> Self {
        Error::BadRequest(e.to_string())
    }
}

impl Error {
    fn kind(&self) -> &'static str {
        match self {
            Error::Trading(e) => e.kind(),
            Error::Pricing(_) => "upstream_unavailable",
            Error::BadRequest(_) => "invalid_request",
            Error::ServerBindError(_) | Error::ServeError(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            "insufficient_balance" | "insufficient_quantity" | "invalid_order" | "invalid_request" => {
                StatusCode::BAD_REQUEST
            }
            "order_not_found" | "holding_not_found" | "account_not_found"
            | "transaction_not_found" | "not_watched" => StatusCode::NOT_FOUND,
            "conflict" | "already_watched" => StatusCode::CONFLICT,
            "upstream_unavailable" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Rejections are JSON: `{ "error": kind, "message": text }`.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed.");
        } else {
            tracing::debug!(error = %self, "Request rejected.");
        }
        let body = json!({ "error": self.kind(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
