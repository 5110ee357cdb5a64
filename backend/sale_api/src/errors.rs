//! Error types for the sale service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Sale(#[from] crowdsale::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt stored state: {0}")]
    Corrupt(String),

    #[error("Settlement error: {0}")]
    Settlement(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable numeric code for sale rule violations; absent otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use crowdsale::Error as E;
        match self {
            ApiError::Sale(e) => match e {
                E::UnknownPhase => StatusCode::NOT_FOUND,
                E::NotAuthorized => StatusCode::FORBIDDEN,
                E::SaleNotStarted | E::AlreadyStarted | E::SaleEnded | E::StalePlan => {
                    StatusCode::CONFLICT
                }
                E::MinCap | E::ExceedIcoSupply | E::InvalidAmount => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                E::PaymentFailed => StatusCode::PAYMENT_REQUIRED,
                E::IssuanceFailed => StatusCode::BAD_GATEWAY,
                E::InvalidConfig | E::Overflow => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Settlement(_) | ApiError::Network(_) => StatusCode::BAD_GATEWAY,
            ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Migration(_)
            | ApiError::Corrupt(_)
            | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            ApiError::Sale(e) => Some(e.code()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}
