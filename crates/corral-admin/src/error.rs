// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failure modes surfaced by the filter and drain admin handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// Malformed request body or query, missing required field, or a
    /// disallowed filter key. Surfaced as `400`.
    #[error("{0}")]
    InvalidInput(String),
    /// `Start` while active, or `Cancel` while not active. Surfaced as
    /// `409`.
    #[error("{0}")]
    Conflict(String),
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            AdminError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AdminError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({"code": status.as_u16(), "message": self.to_string()}));
        (status, body).into_response()
    }
}
