//! Application error type shared by the core services and the HTTP surface.
//!
//! Business-rule rejections carry the numeric context the caller needs to
//! correct the request (available, contracted, attempted figures); the HTTP
//! mapping serializes those figures into the response body verbatim.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Allocations plus direct consumption would claim {attempted}, exceeding the contracted quantity {contracted}")]
    AllocationExceedsContract {
        contracted: Decimal,
        attempted: Decimal,
    },

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Consumption event {0} not found")]
    EventNotFound(Uuid),

    #[error("Consumption event {0} is already reversed")]
    EventAlreadyReversed(Uuid),

    #[error("Contract line {0} has modality allocations; consumption must target an allocation")]
    LineHasAllocations(Uuid),

    #[error("Contract line {0} not found")]
    LineNotFound(Uuid),

    #[error("Modality allocation {0} not found")]
    AllocationNotFound(Uuid),

    #[error("Bill {0} not found")]
    BillNotFound(Uuid),

    #[error("Billing split {0} not found")]
    SplitNotFound(Uuid),

    #[error("Billing split {0} already has its consumption confirmed")]
    SplitAlreadyConfirmed(Uuid),

    #[error("Billing split {0} has no confirmed consumption to reverse")]
    SplitNotConfirmed(Uuid),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            requested: Option<Decimal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            available: Option<Decimal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            contracted: Option<Decimal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            attempted: Option<Decimal>,
        }

        let mut body = ErrorResponse {
            error: self.to_string(),
            requested: None,
            available: None,
            contracted: None,
            attempted: None,
        };

        let status = match self {
            AppError::InvalidQuantity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AllocationExceedsContract {
                contracted,
                attempted,
            } => {
                body.contracted = Some(contracted);
                body.attempted = Some(attempted);
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InsufficientBalance {
                requested,
                available,
            } => {
                body.requested = Some(requested);
                body.available = Some(available);
                StatusCode::CONFLICT
            }
            AppError::EventAlreadyReversed(_)
            | AppError::LineHasAllocations(_)
            | AppError::SplitAlreadyConfirmed(_)
            | AppError::SplitNotConfirmed(_) => StatusCode::CONFLICT,
            AppError::EventNotFound(_)
            | AppError::LineNotFound(_)
            | AppError::AllocationNotFound(_)
            | AppError::BillNotFound(_)
            | AppError::SplitNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InternalError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %body.error, "Request failed");
            body.error = "Internal server error".to_string();
        }

        (status, Json(body)).into_response()
    }
}
