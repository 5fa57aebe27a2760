//! `POST /ingest` — the agent push endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::Json as ReqJson;
use crate::api::state::ApiState;
use crate::api::types::IngestResponse;
use crate::shared::model::Batch;

pub async fn ingest(
    State(state): State<ApiState>,
    ReqJson(batch): ReqJson<Batch>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    if batch.items.is_empty() {
        return Err(ApiError::InvalidRequest("empty batch".to_string()));
    }

    state.storage.insert_batch(&batch.agent_id, &batch.items).await?;
    info!("received {} metrics from agent {}", batch.items.len(), batch.agent_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status: "accepted",
            count: batch.items.len(),
            agent_id: batch.agent_id,
        }),
    ))
}
