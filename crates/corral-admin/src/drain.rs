// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use corral_drain::{DrainError, DrainFilter, Job, Status};
use corral_filter::{FilterSet, FilterValue};
use serde::{Deserialize, Serialize};

use crate::error::AdminError;
use crate::AppState;

/// Query parameters accepted by `POST /drain`.
#[derive(Debug, Default, Deserialize)]
struct StartQuery {
    count: Option<u64>,
    percent: Option<u8>,
    rate: Option<u64>,
    tick: Option<String>,
}

/// Optional body for `POST /drain`: a filter restricting which devices are
/// drained. Absent or empty is tolerated and means "no filter".
#[derive(Debug, Default, Deserialize)]
struct FilterRequest {
    key: Option<String>,
    values: Option<Vec<FilterValue>>,
}

#[derive(Debug, Serialize)]
struct StatusWire {
    active: bool,
    job: Job,
    progress: corral_drain::Progress,
}

impl From<Status> for StatusWire {
    fn from(status: Status) -> Self {
        Self {
            active: status.active,
            job: status.job.unwrap_or_default(),
            progress: status.progress.unwrap_or_default(),
        }
    }
}

/// Builds the `/drain` route group.
pub fn router() -> Router<AppState> {
    Router::new().route("/drain", get(status).post(start).delete(cancel))
}

fn parse_tick(raw: &str) -> Result<Duration, AdminError> {
    let digits_end = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    if digits_end == 0 {
        return Err(AdminError::InvalidInput(format!("invalid tick {raw:?}")));
    }
    let value: u64 = raw[..digits_end]
        .parse()
        .map_err(|_| AdminError::InvalidInput(format!("invalid tick {raw:?}")))?;
    match &raw[digits_end..] {
        "ms" => Ok(Duration::from_millis(value)),
        "s" | "" => Ok(Duration::from_secs(value)),
        unit => Err(AdminError::InvalidInput(format!("unsupported tick unit {unit:?}"))),
    }
}

async fn start(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Option<Json<FilterRequest>>,
) -> Result<Json<Job>, AdminError> {
    let query: StartQuery = match query {
        Some(raw) => serde_urlencoded::from_str(&raw)
            .map_err(|err| AdminError::InvalidInput(format!("invalid query: {err}")))?,
        None => StartQuery::default(),
    };

    let tick = match query.tick {
        Some(raw) => parse_tick(&raw)?,
        None => Duration::ZERO,
    };

    let drain_filter = match body {
        Some(Json(request)) => match (request.key, request.values) {
            (Some(key), Some(values)) if !key.is_empty() && !values.is_empty() => {
                Some(DrainFilter { key, values: FilterSet::new(values) })
            }
            // A partial body (only one of `key`/`values` set) is tolerated
            // the same as an absent or empty one: it degrades to no filter.
            _ => None,
        },
        None => None,
    };

    let job = Job {
        count: query.count.unwrap_or(0),
        percent: query.percent.unwrap_or(0),
        rate: query.rate.unwrap_or(0),
        tick,
        drain_filter,
    };

    let (normalized, _done) = state.drainer.start(job).map_err(map_drain_error)?;
    Ok(Json(normalized))
}

async fn status(State(state): State<AppState>) -> Json<StatusWire> {
    Json(state.drainer.status().into())
}

async fn cancel(State(state): State<AppState>) -> Result<StatusCode, AdminError> {
    let done = state.drainer.cancel().map_err(map_drain_error)?;
    done.cancelled().await;
    Ok(StatusCode::OK)
}

fn map_drain_error(err: DrainError) -> AdminError {
    AdminError::Conflict(err.to_string())
}
