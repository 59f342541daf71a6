/// Unified error handling module
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Unified error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Failure talking to the ephemeris service. Never escapes the client as anything else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("unexpected upstream status {0}")]
    Status(u16),
    #[error("could not decode upstream response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

/// Why an observation was not accepted. Every pipeline exit that is not an
/// enriched observation is one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error(
        "Satellite position check failed - check your data. Missing or incorrect fields: {}",
        .fields.join(", ")
    )]
    InputIncomplete { fields: Vec<&'static str> },
    #[error("Satellite position check failed - try again later.")]
    TransportFailure,
    #[error("Satellite with this ID not visible at this time and location")]
    NotVisible,
    #[error("Satellite name and number do not match")]
    NameMismatch,
    #[error("Satellite below horizon at this time and location")]
    BelowHorizon,
    #[error("Satellite info check failed - no name records found for this catalog number")]
    SatelliteInfoUnavailable,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::InputIncomplete { .. } => "INPUT_INCOMPLETE",
            RejectionReason::TransportFailure => "TRANSPORT_FAILURE",
            RejectionReason::NotVisible => "NOT_VISIBLE",
            RejectionReason::NameMismatch => "NAME_MISMATCH",
            RejectionReason::BelowHorizon => "BELOW_HORIZON",
            RejectionReason::SatelliteInfoUnavailable => "SATELLITE_INFO_UNAVAILABLE",
        }
    }
}

/// Persistence failure
#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StoreError(#[from] pub sqlx::Error);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Observation turned away by the pipeline, carrying its reason code
    #[error("{message}")]
    Rejected { reason: String, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Database(err.0)
    }
}

impl ApiError {
    fn code(&self) -> String {
        match self {
            ApiError::Database(_) => "DATABASE_ERROR".to_string(),
            ApiError::Rejected { reason, .. } => format!("REJECTED_{}", reason),
            ApiError::NotFound(_) => "NOT_FOUND".to_string(),
            ApiError::Internal(_) => "INTERNAL_ERROR".to_string(),
            ApiError::InvalidInput(_) => "INVALID_INPUT".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };

        // errors travel in the body; the HTTP status stays 200
        (StatusCode::OK, Json(error_response)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
