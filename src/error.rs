use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::lease_pool::ReleaseError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("参数错误: {0}")]
    BadRequest(String),

    #[error("未知的 service: {0}")]
    UnknownService(String),

    #[error("凭证不在已配置的凭证列表中")]
    UnknownCredential,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorBodyInner,
}

#[derive(Debug, Serialize)]
struct ErrorBodyInner {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#type: Option<String>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::UnknownService(_) | AppError::UnknownCredential => {
                StatusCode::BAD_REQUEST
            }
            AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::UnknownService(_) => "unknown_service",
            AppError::UnknownCredential => "unknown_credential",
            AppError::Anyhow(_) => "internal",
        }
    }
}

impl From<ReleaseError> for AppError {
    fn from(err: ReleaseError) -> Self {
        match err {
            ReleaseError::UnknownService(s) => AppError::UnknownService(s),
            ReleaseError::UnknownCredential => AppError::UnknownCredential,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: ErrorBodyInner {
                message: self.to_string(),
                r#type: Some(self.kind().to_string()),
            },
        };

        (status, Json(body)).into_response()
    }
}
