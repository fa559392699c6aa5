use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::{debug, error};
use serde::Serialize;
use thiserror::Error;

/// Result type used by every request handler and store call.
pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Failures a request can end in. Each kind maps to exactly one HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized access")]
    Unauthorized,

    #[error("forbidden access")]
    Forbidden,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            message: self.to_string(),
        })
    }
}

impl From<mongodb::error::Error> for ApiError {
    fn from(err: mongodb::error::Error) -> Self {
        error!("database error: {}", err);
        ApiError::UpstreamUnavailable("database error".to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ApiError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ApiError::UpstreamUnavailable("operation timed out".to_string())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        error!("payment gateway error: {}", err);
        ApiError::UpstreamUnavailable("payment gateway error".to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        debug!("rejected token: {}", err);
        ApiError::Unauthorized
    }
}

/// Failures while bringing a service up. These never reach a client.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid environment: {0}")]
    Environment(#[from] envy::Error),

    #[error("{0} must be set")]
    MissingSetting(&'static str),

    #[error("database unavailable: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("could not build http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("could not prepare store: {0}")]
    Store(#[from] ApiError),
}
