//! Canonical on-the-wire data model: samples, batches, data points, and
//! alert rules/records. These are the only types that cross the agent →
//! API → evaluator boundaries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single labeled observation. Immutable once produced; the only
/// mutation the system performs on a sample is appending it to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub service: String,
    pub target: String,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub ts: DateTime<Utc>,
}

/// A group of samples pushed together by one agent at one tick.
/// Boundary type only — never persisted as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub agent_id: String,
    pub items: Vec<Sample>,
}

/// One point of an aggregated range-query result: bucket start (unix
/// seconds) and the bucket's average value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// Response envelope for `GET /api/metrics/range`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRangeResponse {
    pub service: String,
    pub target: String,
    pub name: String,
    pub data: Vec<DataPoint>,
}

/// Alert severity. Ordering is lexical-by-variant-order, not used for
/// comparison anywhere in this spec — severities are only ever displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Warning
    }
}

/// Persistent alert rule, as stored by the API and evaluated by the alert
/// engine. `name` is unique across enabled rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub for_duration: String,
    pub severity: Severity,
    pub email_to: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload accepted by `POST`/`PUT /api/alert-rules`. Distinct from
/// [`AlertRule`] because id/timestamps are server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRuleInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expr: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub for_duration: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub email_to: Vec<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// One row per currently-firing rule. Resolved alerts (`resolved_at` set)
/// are never returned from the active-alerts endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub name: String,
    pub rule: String,
    pub severity: Severity,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub message: String,
    pub fired_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Response envelope for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime: String,
    pub metrics_count: i64,
    pub last_ingest: Option<DateTime<Utc>>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_round_trips_through_json() {
        let sample = Sample {
            service: "web".into(),
            target: "edge-1".into(),
            name: "http_up".into(),
            value: 1.0,
            labels: HashMap::from([("url".to_string(), "https://example.com".to_string())]),
            ts: Utc::now(),
        };

        let json = serde_json::to_string(&sample).unwrap();
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(sample, back);
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
    }
}
