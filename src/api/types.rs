//! Response envelopes for endpoints whose payload isn't a bare model type.

use serde::Serialize;

use crate::shared::model::{ActiveAlert, AlertRule};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub count: usize,
    pub agent_id: String,
}

#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub services: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TargetsResponse {
    pub service: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AlertRulesResponse {
    pub rules: Vec<AlertRule>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ActiveAlertsResponse {
    pub alerts: Vec<ActiveAlert>,
    pub count: usize,
}
