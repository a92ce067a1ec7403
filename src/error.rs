use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::registry::ValidationError;

/// Failures while assembling configuration at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error("Private key is not valid base64: {0}")]
    PrivateKeyEncoding(#[from] base64::DecodeError),

    #[error("Private key is not valid UTF-8: {0}")]
    PrivateKeyUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid sheet registry entry '{entry}': {reason}")]
    Registry { entry: String, reason: String },

    #[error("Failed to read registry file '{path}': {source}")]
    RegistryFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures reported by the spreadsheet backend.
#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Sheets API request failed: {0}")]
    Transport(String),

    #[error("Sheets API did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Sheets API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Spreadsheet backend is not configured")]
    NotConfigured,
}

/// Everything a row submission can fail with.
#[derive(Error, Debug)]
pub enum AddRowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] SheetsError),
}

/// Errors surfaced to HTTP clients.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not Found")]
    Validation(#[source] ValidationError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid boolean path parameter: {0}")]
    InvalidFlag(String),

    #[error("Spreadsheet backend failure")]
    Upstream(#[source] SheetsError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidFlag(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AddRowError> for ApiError {
    fn from(err: AddRowError) -> Self {
        match err {
            AddRowError::Validation(e) => ApiError::Validation(e),
            AddRowError::Upstream(e) => ApiError::Upstream(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));

        match self {
            ApiError::RateLimited { retry_after_secs } => {
                let mut response = (status, body).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            _ => (status, body).into_response(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
