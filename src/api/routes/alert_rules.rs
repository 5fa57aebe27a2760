//! `/api/alert-rules` CRUD and `/api/alerts/active`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::Json as ReqJson;
use crate::api::state::ApiState;
use crate::api::types::{ActiveAlertsResponse, AlertRulesResponse};
use crate::shared::model::{AlertRule, AlertRuleInput};

pub async fn list_rules(State(state): State<ApiState>) -> ApiResult<Json<AlertRulesResponse>> {
    let rules = state.storage.list_rules().await?;
    Ok(Json(AlertRulesResponse {
        count: rules.len(),
        rules,
    }))
}

pub async fn get_rule(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AlertRule>> {
    let rule = state
        .storage
        .get_rule(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("alert rule {id} not found")))?;
    Ok(Json(rule))
}

pub async fn create_rule(
    State(state): State<ApiState>,
    ReqJson(input): ReqJson<AlertRuleInput>,
) -> ApiResult<(StatusCode, Json<AlertRule>)> {
    validate(&input)?;
    let rule = state.storage.create_rule(input).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    ReqJson(input): ReqJson<AlertRuleInput>,
) -> ApiResult<Json<AlertRule>> {
    validate(&input)?;
    let rule = state.storage.update_rule(id, input).await?;
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.storage.delete_rule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn active_alerts(
    State(state): State<ApiState>,
) -> ApiResult<Json<ActiveAlertsResponse>> {
    let alerts = state.storage.get_active_alerts().await?;
    Ok(Json(ActiveAlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

fn validate(input: &AlertRuleInput) -> ApiResult<()> {
    if input.name.is_empty() {
        return Err(ApiError::InvalidRequest("name is required".to_string()));
    }
    if input.expr.is_empty() {
        return Err(ApiError::InvalidRequest("expr is required".to_string()));
    }
    if input.email_to.is_empty() {
        return Err(ApiError::InvalidRequest(
            "at least one email recipient is required".to_string(),
        ));
    }
    Ok(())
}
