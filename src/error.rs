// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Validation(String),
    #[error("{message}")]
    UnknownChoice {
        message: String,
        available: Vec<String>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    UpstreamAuth(String),
    #[error("{0}")]
    UpstreamRequest(String),
    #[error("{0}")]
    UpstreamUnavailable(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<Vec<String>>,
    timestamp: DateTime<Utc>,
}

impl AppError {
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    pub fn unknown_choice<T, I, S>(message: T, available: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UnknownChoice {
            message: message.into(),
            available: available.into_iter().map(Into::into).collect(),
        }
    }

    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found<T: Into<String>>(message: T) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::UnknownChoice { .. }
            | AppError::UpstreamRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::UpstreamAuth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Configuration(_)
            | AppError::UpstreamUnavailable(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(error: UpstreamError) -> Self {
        match error {
            UpstreamError::Unauthenticated(message) => AppError::UpstreamAuth(message),
            UpstreamError::InvalidRequest(message) => AppError::UpstreamRequest(message),
            UpstreamError::Unavailable(message) => AppError::UpstreamUnavailable(message),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Internal(source) => {
                tracing::error!(error = ?source, "request failed with internal error");
            }
            AppError::Configuration(message) => {
                tracing::error!(%message, "request failed on missing configuration");
            }
            AppError::UpstreamAuth(message)
            | AppError::UpstreamRequest(message)
            | AppError::UpstreamUnavailable(message) => {
                tracing::warn!(%status, %message, "upstream call failed");
            }
            _ => {}
        }

        let error = self.to_string();
        let available = match self {
            AppError::UnknownChoice { available, .. } => Some(available),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            error,
            available,
            timestamp: Utc::now(),
        };

        (status, Json(body)).into_response()
    }
}
