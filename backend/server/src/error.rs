use axum::{
    http::{HeaderName, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use bank::{store::StoreError, surveys::SurveyShapeError};
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;

pub const AUTH_CODE: HeaderName = HeaderName::from_static("x-auth-code");

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0}")]
    Validation(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Redirecting to {0}")]
    Redirect(&'static str),

    #[error("Unauthorized access")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    InvalidSurvey(#[from] SurveyShapeError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedPayload | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Redirect(location) => {
                return (StatusCode::SEE_OTHER, [(LOCATION, *location)]).into_response();
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::CONFLICT,
            AppError::InvalidSurvey(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Auth(e) => {
                return (e.status(), [(AUTH_CODE, e.code())], e.to_string()).into_response();
            }
            AppError::Storage(_) | AppError::InternalError(_) => {
                error!("{self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}
