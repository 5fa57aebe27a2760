//! `GET /health` — degraded if nothing has been ingested in 5 minutes.

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::shared::model::HealthResponse;
use crate::shared::util::format_uptime;

const DEGRADED_AFTER: chrono::Duration = chrono::Duration::minutes(5);

pub async fn health(State(state): State<ApiState>) -> ApiResult<Json<HealthResponse>> {
    let metrics_count = state.storage.metrics_count().await?;
    let last_ingest = state.storage.last_ingest().await?;

    let status = match last_ingest {
        Some(ts) if Utc::now() - ts <= DEGRADED_AFTER => "ok",
        _ => "degraded",
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        uptime: format_uptime(Utc::now() - state.started_at),
        metrics_count,
        last_ingest,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
