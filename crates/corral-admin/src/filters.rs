// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use corral_filter::{FilterSet, FilterValue};
use serde::Deserialize;

use crate::error::AdminError;
use crate::AppState;

/// Body shape for `SetFilter`/`DeleteFilter`.
#[derive(Debug, Deserialize)]
struct FilterRequest {
    key: Option<String>,
    values: Option<Vec<FilterValue>>,
}

/// Marks a response as having mutated the gate, so [`log_filters`] knows to
/// replace its body with the updated `FilterGate` JSON.
#[derive(Clone)]
struct GateUpdated;

/// Builds the `/filters` route group: `GET` returns the gate, `POST`/`PUT`
/// replace a filter, `DELETE` removes one. `POST`/`PUT` responses are
/// rewritten by the [`log_filters`] middleware to carry the updated gate.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/filters",
            get(get_filters).post(set_filter).put(set_filter).delete(delete_filter),
        )
        .layer(middleware::from_fn_with_state(state.clone(), log_filters))
        .with_state(state)
}

async fn get_filters(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gate.to_wire())
}

async fn set_filter(
    State(state): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<Response, AdminError> {
    let key = request
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AdminError::InvalidInput("missing or empty key".to_string()))?;
    let values = request
        .values
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AdminError::InvalidInput("missing or empty values".to_string()))?;

    if !state.gate.is_key_allowed(&key) {
        return Err(AdminError::InvalidInput(format!("key {key:?} is not an allowed filter")));
    }

    let (_old, created) = state.gate.set_filter(key, FilterSet::new(values));
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };

    let mut response = (status, ()).into_response();
    response.extensions_mut().insert(GateUpdated);
    Ok(response)
}

async fn delete_filter(
    State(state): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<StatusCode, AdminError> {
    let key = request
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AdminError::InvalidInput("missing or empty key".to_string()))?;
    state.gate.delete_filter(&key);
    Ok(StatusCode::OK)
}

/// After the inner handler returns, marshals the updated gate to JSON and
/// writes it as the response body with `Content-Type: application/json`,
/// and logs the new state. No-op when the handler didn't mark the gate as
/// updated.
async fn log_filters(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let gate = Arc::clone(&state.gate);
    let response = next.run(request).await;
    if response.extensions().get::<GateUpdated>().is_none() {
        return response;
    }

    let wire = gate.to_wire();
    let body = match serde_json::to_vec(&wire) {
        Ok(body) => body,
        Err(_) => return response,
    };
    tracing::info!(filters = %String::from_utf8_lossy(&body), "filters updated");

    let (mut parts, _) = response.into_parts();
    parts.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Response::from_parts(parts, Body::from(body))
}
