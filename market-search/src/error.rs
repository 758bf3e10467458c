// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Error type shared by the search layer and its HTTP adapters.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Malformed client input, reported per field.
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Hosted search vendor failure after retries.
    #[error("Search engine error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

impl SearchError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SearchError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            SearchError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SearchError::Validation { .. } => StatusCode::BAD_REQUEST,
            SearchError::NotFound(_) => StatusCode::NOT_FOUND,
            SearchError::Unauthorized => StatusCode::UNAUTHORIZED,
            SearchError::Forbidden => StatusCode::FORBIDDEN,
            SearchError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            SearchError::Upstream(_) => StatusCode::BAD_GATEWAY,
            SearchError::Database(_) | SearchError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for SearchError {
    fn from(e: sqlx::Error) -> Self {
        SearchError::Database(e.to_string())
    }
}

impl From<meilisearch_sdk::errors::Error> for SearchError {
    fn from(e: meilisearch_sdk::errors::Error) -> Self {
        SearchError::Upstream(e.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Internal(format!("serialization failed: {e}"))
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Store and vendor details stay in the logs.
            SearchError::Database(detail) | SearchError::Internal(detail) => {
                tracing::error!("Request failed: {}", detail);
                "Internal server error".to_string()
            }
            SearchError::Upstream(detail) => {
                tracing::error!("Search engine request failed: {}", detail);
                "Search service is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            success: false,
            message,
            field: self.field().map(str::to_string),
        };

        let mut response = (status, Json(body)).into_response();
        if let SearchError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            SearchError::validation("q", "bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SearchError::NotFound("Saved search".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SearchError::Upstream("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            SearchError::Database("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            SearchError::RateLimited { retry_after_secs: 3 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_validation_body_carries_field() {
        let response = SearchError::validation("maxPrice", "must be a number").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.field.as_deref(), Some("maxPrice"));
    }

    #[tokio::test]
    async fn test_database_details_are_not_leaked() {
        let response = SearchError::Database("relation products missing".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.message, "Internal server error");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = SearchError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.headers()[axum::http::header::RETRY_AFTER], "7");
    }
}
