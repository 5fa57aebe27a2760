//! `GET /api/metrics/{query,range,services,targets}`.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{ServicesResponse, TargetsResponse};
use crate::shared::model::{DataPoint, QueryRangeResponse};
use crate::shared::util::{parse_relative_duration, parse_time_param};
use crate::storage::{RangeQuery, Scope};

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    name: String,
    service: Option<String>,
    target: Option<String>,
    duration: Option<String>,
}

/// `duration` present is equivalent to `/range` with `start = -duration`,
/// `end = now`; absent, returns the single latest sample or 404.
pub async fn query_latest(
    State(state): State<ApiState>,
    Query(params): Query<LatestParams>,
) -> ApiResult<Response> {
    if let Some(duration) = params.duration {
        let now = Utc::now();
        let offset = parse_relative_duration(&format!("-{duration}")).ok_or_else(|| {
            ApiError::InvalidRequest(format!("invalid duration: {duration}"))
        })?;

        let response = run_range_query(
            &state,
            params.name,
            params.service,
            params.target,
            now - offset,
            now,
        )
        .await?;

        return Ok(Json(response).into_response());
    }

    let scope = Scope {
        service: params.service,
        target: params.target,
    };

    let sample = state
        .storage
        .query_latest(&params.name, &scope)
        .await?
        .ok_or_else(|| ApiError::NotFound("no data found".to_string()))?;

    Ok(Json(sample).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    name: String,
    service: Option<String>,
    target: Option<String>,
    start: Option<String>,
    end: Option<String>,
    #[allow(dead_code)]
    step: Option<String>,
}

pub async fn query_range(
    State(state): State<ApiState>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Json<QueryRangeResponse>> {
    let now = Utc::now();

    let start = match params.start {
        Some(raw) => parse_time_param(&raw, now)
            .ok_or_else(|| ApiError::InvalidRequest(format!("invalid start time: {raw}")))?,
        None => now - chrono::Duration::hours(1),
    };

    let end = match params.end {
        Some(raw) => parse_time_param(&raw, now)
            .ok_or_else(|| ApiError::InvalidRequest(format!("invalid end time: {raw}")))?,
        None => now,
    };

    let response = run_range_query(&state, params.name, params.service, params.target, start, end)
        .await?;

    Ok(Json(response))
}

async fn run_range_query(
    state: &ApiState,
    name: String,
    service: Option<String>,
    target: Option<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ApiResult<QueryRangeResponse> {
    let scope = Scope {
        service: service.clone(),
        target: target.clone(),
    };

    let data: Vec<DataPoint> = state
        .storage
        .query_range(&RangeQuery {
            name: name.clone(),
            scope,
            start,
            end,
        })
        .await?;

    Ok(QueryRangeResponse {
        service: service.unwrap_or_default(),
        target: target.unwrap_or_default(),
        name,
        data,
    })
}

pub async fn list_services(State(state): State<ApiState>) -> ApiResult<Json<ServicesResponse>> {
    let services = state.storage.list_services().await?;
    Ok(Json(ServicesResponse { services }))
}

#[derive(Debug, Deserialize)]
pub struct TargetsParams {
    service: String,
}

pub async fn list_targets(
    State(state): State<ApiState>,
    Query(params): Query<TargetsParams>,
) -> ApiResult<Json<TargetsResponse>> {
    let targets = state.storage.list_targets(&params.service).await?;
    Ok(Json(TargetsResponse {
        service: params.service,
        targets,
    }))
}
