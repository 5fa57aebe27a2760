//! Persistence boundary: the `metrics`, `alert_rules`, and `alerts` tables,
//! and the queries the API and alert engine issue against them.

pub mod error;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::model::{ActiveAlert, AlertRule, AlertRuleInput, DataPoint, Sample};

/// Optional scope filter shared by the latest-value and range queries.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub service: Option<String>,
    pub target: Option<String>,
}

/// Parameters for a time-bucketed range query. `step` is accepted for API
/// compatibility but the implemented bucket width is always one minute
/// (see `DESIGN.md`, open question #2).
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub name: String,
    pub scope: Scope,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Everything the ingest/query API and the alert engine's evaluator need
/// from the relational store. One implementation (SQLite) ships today;
/// the trait boundary is what a Postgres-backed deployment would satisfy
/// next.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert an entire batch in one transaction. Either all samples are
    /// durable or none are.
    async fn insert_batch(&self, agent_id: &str, samples: &[Sample]) -> StorageResult<()>;

    /// Most recent sample matching `name` and the optional scope filters.
    /// `None` distinguishes "no data" from an error.
    async fn query_latest(&self, name: &str, scope: &Scope) -> StorageResult<Option<Sample>>;

    /// Minute-bucketed average of `name` between `start` and `end`,
    /// ascending by bucket. Empty is a valid result.
    async fn query_range(&self, query: &RangeQuery) -> StorageResult<Vec<DataPoint>>;

    /// Distinct service classes, sorted ascending.
    async fn list_services(&self) -> StorageResult<Vec<String>>;

    /// Distinct targets for a service, sorted ascending.
    async fn list_targets(&self, service: &str) -> StorageResult<Vec<String>>;

    /// Total number of samples ever ingested (used for the health endpoint
    /// and stats reporting).
    async fn metrics_count(&self) -> StorageResult<i64>;

    /// Timestamp of the most recently ingested sample, if any.
    async fn last_ingest(&self) -> StorageResult<Option<DateTime<Utc>>>;

    /// Create a rule. Returns the stored row including assigned id and
    /// timestamps. Fails with `StorageError::Conflict` on a duplicate name.
    async fn create_rule(&self, input: AlertRuleInput) -> StorageResult<AlertRule>;

    /// Fetch a single rule by id.
    async fn get_rule(&self, id: i64) -> StorageResult<Option<AlertRule>>;

    /// List all rules, ordered by id.
    async fn list_rules(&self) -> StorageResult<Vec<AlertRule>>;

    /// Update a rule in place. Fails with `StorageError::NotFound` if the
    /// row does not exist.
    async fn update_rule(&self, id: i64, input: AlertRuleInput) -> StorageResult<AlertRule>;

    /// Delete a rule by id. Fails with `StorageError::NotFound` if no row
    /// matched.
    async fn delete_rule(&self, id: i64) -> StorageResult<()>;

    /// Upsert the active-alert row for `name` (called on the PENDING→FIRING
    /// transition, and to refresh `labels`/`message` while still firing).
    async fn upsert_active_alert(&self, alert: &ActiveAlert) -> StorageResult<()>;

    /// Mark the active-alert row for `name` as resolved (`resolved_at =
    /// now`). A no-op if no row exists.
    async fn resolve_alert(&self, name: &str) -> StorageResult<()>;

    /// Rows with a null `resolved_at`, ordered by `fired_at` desc.
    async fn get_active_alerts(&self) -> StorageResult<Vec<ActiveAlert>>;
}
