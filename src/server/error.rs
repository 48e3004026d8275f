use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::database::catalog::MembershipTier;

pub type AppResult<T> = Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication is required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("membership tier {0} is required")]
    UpgradeRequired(MembershipTier),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    // the context only ever reaches the logs
    #[error("unexpected error occurred: {0}")]
    InternalServerErrorWithContext(String),

    #[error(transparent)]
    AnyhowError(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::UpgradeRequired(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InternalServerErrorWithContext(_) | Self::AnyhowError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::UpgradeRequired(tier) => json!({
                "error": "upgrade_required",
                "message": self.to_string(),
                "required_tier": tier,
            }),
            Self::Unauthorized => json!({
                "error": "unauthorized",
                "message": self.to_string(),
                "login_required": true,
            }),
            Self::InternalServerErrorWithContext(context) => {
                error!("internal error: {}", context);
                json!({ "error": "internal_error", "message": "unexpected error occurred" })
            }
            Self::AnyhowError(e) => {
                error!("internal error: {:#}", e);
                json!({ "error": "internal_error", "message": "unexpected error occurred" })
            }
            _ => json!({ "error": status.canonical_reason().unwrap_or("error"), "message": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
