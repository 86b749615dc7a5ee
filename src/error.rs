use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::CartState;
use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Cart is not ready for checkout: {0}")]
    CartNotReady(CartState),

    #[error("Insufficient stock for product {name}")]
    InsufficientStock { product_id: Uuid, name: String },

    #[error("Cart has already been converted to an order")]
    CartAlreadyConverted,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(rename = "productId", skip_serializing_if = "Option::is_none")]
    product_id: Option<Uuid>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::CartNotReady(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InsufficientStock { .. } | AppError::CartAlreadyConverted => {
                StatusCode::CONFLICT
            }
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code, so clients can direct the user to fix
    /// their cart instead of showing a generic failure.
    fn code(&self) -> Option<&'static str> {
        match self {
            AppError::CartNotReady(state) => Some(state.code()),
            AppError::InsufficientStock { .. } => Some("INSUFFICIENT_STOCK"),
            AppError::CartAlreadyConverted => Some("ALREADY_CONVERTED"),
            _ => None,
        }
    }

    fn product_id(&self) -> Option<Uuid> {
        match self {
            AppError::CartNotReady(state) => state.blocking_product(),
            AppError::InsufficientStock { product_id, .. } => Some(*product_id),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
                code: self.code(),
                product_id: self.product_id(),
            }),
            meta: Some(Meta::empty()),
        };

        (self.status(), axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
