//! SQLite implementation of [`Storage`].
//!
//! WAL journal mode and a busy timeout let the ingest writer and the API's
//! readers share one file without lock contention. SQLite has no
//! `date_trunc`, so the minute bucket `query_range` groups by is computed
//! as `(ts_millis / 60000) * 60000` — integer-division truncation to the
//! start of the containing minute.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::error::{StorageError, StorageResult};
use super::{RangeQuery, Scope, Storage};
use crate::shared::model::{ActiveAlert, AlertRule, AlertRuleInput, DataPoint, Sample, Severity};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();
        info!("opening SQLite store at {db_path_str}");

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(25)
            .min_connections(5)
            .idle_timeout(std::time::Duration::from_secs(300))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}

fn labels_to_json(labels: &HashMap<String, String>) -> String {
    serde_json::to_string(labels).unwrap_or_else(|_| "{}".to_string())
}

fn labels_from_json(raw: &str) -> HashMap<String, String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn severity_from_str(raw: &str) -> Severity {
    match raw {
        "info" => Severity::Info,
        "critical" => Severity::Critical,
        _ => Severity::Warning,
    }
}

fn row_to_rule(row: sqlx::sqlite::SqliteRow) -> AlertRule {
    let email_to: String = row.get("email_to");
    AlertRule {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        expr: row.get("expr"),
        service: row.get("service"),
        target: row.get("target"),
        for_duration: row.get("for_duration"),
        severity: severity_from_str(&row.get::<String, _>("severity")),
        email_to: serde_json::from_str(&email_to).unwrap_or_default(),
        enabled: row.get("enabled"),
        created_at: from_millis(row.get::<i64, _>("created_at")),
        updated_at: from_millis(row.get::<i64, _>("updated_at")),
    }
}

#[async_trait]
impl Storage for SqliteStore {
    #[instrument(skip(self, samples))]
    async fn insert_batch(&self, agent_id: &str, samples: &[Sample]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        for sample in samples {
            sqlx::query(
                "INSERT INTO metrics (ts, service, target, name, value, labels, agent_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(to_millis(sample.ts))
            .bind(&sample.service)
            .bind(&sample.target)
            .bind(&sample.name)
            .bind(sample.value)
            .bind(labels_to_json(&sample.labels))
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query_latest(&self, name: &str, scope: &Scope) -> StorageResult<Option<Sample>> {
        let mut sql = String::from(
            "SELECT ts, service, target, name, value, labels FROM metrics WHERE name = ?",
        );
        if scope.service.is_some() {
            sql.push_str(" AND service = ?");
        }
        if scope.target.is_some() {
            sql.push_str(" AND target = ?");
        }
        sql.push_str(" ORDER BY ts DESC LIMIT 1");

        let mut query = sqlx::query(&sql).bind(name);
        if let Some(service) = &scope.service {
            query = query.bind(service);
        }
        if let Some(target) = &scope.target {
            query = query.bind(target);
        }

        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|row| Sample {
            ts: from_millis(row.get::<i64, _>("ts")),
            service: row.get("service"),
            target: row.get("target"),
            name: row.get("name"),
            value: row.get("value"),
            labels: labels_from_json(&row.get::<String, _>("labels")),
        }))
    }

    async fn query_range(&self, query: &RangeQuery) -> StorageResult<Vec<DataPoint>> {
        let mut sql = String::from(
            "SELECT (ts / 60000) * 60000 AS bucket, AVG(value) AS avg_value
             FROM metrics WHERE name = ? AND ts >= ? AND ts <= ?",
        );
        if query.scope.service.is_some() {
            sql.push_str(" AND service = ?");
        }
        if query.scope.target.is_some() {
            sql.push_str(" AND target = ?");
        }
        sql.push_str(" GROUP BY bucket ORDER BY bucket ASC");

        let mut q = sqlx::query(&sql)
            .bind(&query.name)
            .bind(to_millis(query.start))
            .bind(to_millis(query.end));
        if let Some(service) = &query.scope.service {
            q = q.bind(service);
        }
        if let Some(target) = &query.scope.target {
            q = q.bind(target);
        }

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| DataPoint {
                timestamp: row.get::<i64, _>("bucket") / 1000,
                value: row.get("avg_value"),
            })
            .collect())
    }

    async fn list_services(&self) -> StorageResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT service FROM metrics ORDER BY service ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("service")).collect())
    }

    async fn list_targets(&self, service: &str) -> StorageResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT target FROM metrics WHERE service = ? ORDER BY target ASC",
        )
        .bind(service)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("target")).collect())
    }

    async fn metrics_count(&self) -> StorageResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    async fn last_ingest(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(ts) AS max_ts FROM metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<Option<i64>, _>("max_ts").map(from_millis))
    }

    async fn create_rule(&self, input: AlertRuleInput) -> StorageResult<AlertRule> {
        let now = Utc::now();
        let for_duration = input.for_duration.clone().unwrap_or_else(|| "1m".to_string());
        let severity = input.severity.unwrap_or_default();
        let enabled = input.enabled.unwrap_or(true);
        let email_to_json = serde_json::to_string(&input.email_to).unwrap();

        let row = sqlx::query(
            "INSERT INTO alert_rules
                (name, description, expr, service, target, for_duration, severity, email_to, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.expr)
        .bind(&input.service)
        .bind(&input.target)
        .bind(&for_duration)
        .bind(severity.as_str())
        .bind(&email_to_json)
        .bind(enabled)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");

        Ok(AlertRule {
            id,
            name: input.name,
            description: input.description,
            expr: input.expr,
            service: input.service,
            target: input.target,
            for_duration,
            severity,
            email_to: input.email_to,
            enabled,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_rule(&self, id: i64) -> StorageResult<Option<AlertRule>> {
        let row = sqlx::query(
            "SELECT id, name, description, expr, service, target, for_duration, severity,
                    email_to, enabled, created_at, updated_at
             FROM alert_rules WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_rule))
    }

    async fn list_rules(&self) -> StorageResult<Vec<AlertRule>> {
        let rows = sqlx::query(
            "SELECT id, name, description, expr, service, target, for_duration, severity,
                    email_to, enabled, created_at, updated_at
             FROM alert_rules ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_rule).collect())
    }

    async fn update_rule(&self, id: i64, input: AlertRuleInput) -> StorageResult<AlertRule> {
        let existing = self
            .get_rule(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("alert rule {id} not found")))?;

        let now = Utc::now();
        let for_duration = input.for_duration.clone().unwrap_or(existing.for_duration);
        let severity = input.severity.unwrap_or(existing.severity);
        let enabled = input.enabled.unwrap_or(existing.enabled);
        let email_to_json = serde_json::to_string(&input.email_to).unwrap();

        sqlx::query(
            "UPDATE alert_rules
             SET name = ?, description = ?, expr = ?, service = ?, target = ?,
                 for_duration = ?, severity = ?, email_to = ?, enabled = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.expr)
        .bind(&input.service)
        .bind(&input.target)
        .bind(&for_duration)
        .bind(severity.as_str())
        .bind(&email_to_json)
        .bind(enabled)
        .bind(to_millis(now))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(AlertRule {
            id,
            name: input.name,
            description: input.description,
            expr: input.expr,
            service: input.service,
            target: input.target,
            for_duration,
            severity,
            email_to: input.email_to,
            enabled,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    async fn delete_rule(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("alert rule {id} not found")));
        }
        Ok(())
    }

    async fn upsert_active_alert(&self, alert: &ActiveAlert) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO alerts (name, rule, severity, service, target, labels, message, fired_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
             ON CONFLICT(name) WHERE resolved_at IS NULL DO UPDATE SET
                 rule = excluded.rule,
                 severity = excluded.severity,
                 labels = excluded.labels,
                 message = excluded.message",
        )
        .bind(&alert.name)
        .bind(&alert.rule)
        .bind(alert.severity.as_str())
        .bind(&alert.service)
        .bind(&alert.target)
        .bind(labels_to_json(&alert.labels))
        .bind(&alert.message)
        .bind(to_millis(alert.fired_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn resolve_alert(&self, name: &str) -> StorageResult<()> {
        sqlx::query("UPDATE alerts SET resolved_at = ? WHERE name = ? AND resolved_at IS NULL")
            .bind(to_millis(Utc::now()))
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_active_alerts(&self) -> StorageResult<Vec<ActiveAlert>> {
        let rows = sqlx::query(
            "SELECT name, rule, severity, service, target, labels, message, fired_at
             FROM alerts WHERE resolved_at IS NULL ORDER BY fired_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ActiveAlert {
                name: row.get("name"),
                rule: row.get("rule"),
                severity: severity_from_str(&row.get::<String, _>("severity")),
                service: row.get("service"),
                target: row.get("target"),
                labels: labels_from_json(&row.get::<String, _>("labels")),
                message: row.get("message"),
                fired_at: from_millis(row.get::<i64, _>("fired_at")),
                resolved_at: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        (SqliteStore::new(&path).await.unwrap(), dir)
    }

    fn sample(name: &str, value: f64, ts: DateTime<Utc>) -> Sample {
        Sample {
            service: "web".into(),
            target: "edge-1".into(),
            name: name.into(),
            value,
            labels: HashMap::new(),
            ts,
        }
    }

    #[tokio::test]
    async fn insert_then_query_latest_returns_max_ts() {
        let (store, _dir) = store().await;
        let now = Utc::now();

        store
            .insert_batch(
                "agent-1",
                &[
                    sample("http_up", 0.0, now - Duration::minutes(5)),
                    sample("http_up", 1.0, now),
                ],
            )
            .await
            .unwrap();

        let latest = store
            .query_latest("http_up", &Scope::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.value, 1.0);
    }

    #[tokio::test]
    async fn query_latest_with_no_data_is_none() {
        let (store, _dir) = store().await;
        assert!(store
            .query_latest("missing", &Scope::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn query_range_is_ascending_by_bucket() {
        let (store, _dir) = store().await;
        let now = Utc::now();

        store
            .insert_batch(
                "agent-1",
                &[
                    sample("http_latency_ms", 30.0, now - Duration::minutes(10)),
                    sample("http_latency_ms", 40.0, now - Duration::minutes(8)),
                    sample("http_latency_ms", 50.0, now - Duration::minutes(5)),
                    sample("http_latency_ms", 60.0, now - Duration::minutes(2)),
                ],
            )
            .await
            .unwrap();

        let points = store
            .query_range(&RangeQuery {
                name: "http_latency_ms".to_string(),
                scope: Scope::default(),
                start: now - Duration::minutes(15),
                end: now,
            })
            .await
            .unwrap();

        assert!(points.len() >= 4);
        assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn create_rule_rejects_duplicate_name() {
        let (store, _dir) = store().await;
        let input = AlertRuleInput {
            name: "dup".into(),
            description: String::new(),
            expr: "last(1m, http_up) == 0".into(),
            service: None,
            target: None,
            for_duration: None,
            severity: None,
            email_to: vec!["oncall@example.com".into()],
            enabled: None,
        };

        store.create_rule(input.clone()).await.unwrap();
        let err = store.create_rule(input).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_missing_rule_is_not_found() {
        let (store, _dir) = store().await;
        let input = AlertRuleInput {
            name: "ghost".into(),
            description: String::new(),
            expr: "last(1m, http_up) == 0".into(),
            service: None,
            target: None,
            for_duration: None,
            severity: None,
            email_to: vec!["oncall@example.com".into()],
            enabled: None,
        };

        let err = store.update_rule(999, input).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_missing_rule_is_not_found() {
        let (store, _dir) = store().await;
        let err = store.delete_rule(999).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn firing_then_resolving_removes_active_alert() {
        let (store, _dir) = store().await;
        let alert = ActiveAlert {
            name: "high-latency".into(),
            rule: "avg_over(5m, http_latency_ms) > 500".into(),
            severity: Severity::Critical,
            service: "web".into(),
            target: "edge-1".into(),
            labels: HashMap::new(),
            message: "latency high".into(),
            fired_at: Utc::now(),
            resolved_at: None,
        };

        store.upsert_active_alert(&alert).await.unwrap();
        assert_eq!(store.get_active_alerts().await.unwrap().len(), 1);

        store.resolve_alert("high-latency").await.unwrap();
        assert!(store.get_active_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_while_firing_refreshes_message_without_new_row() {
        let (store, _dir) = store().await;
        let mut alert = ActiveAlert {
            name: "high-latency".into(),
            rule: "avg_over(5m, http_latency_ms) > 500".into(),
            severity: Severity::Warning,
            service: "web".into(),
            target: "edge-1".into(),
            labels: HashMap::new(),
            message: "latency at 510ms".into(),
            fired_at: Utc::now(),
            resolved_at: None,
        };

        store.upsert_active_alert(&alert).await.unwrap();
        alert.message = "latency at 900ms".into();
        alert.severity = Severity::Critical;
        store.upsert_active_alert(&alert).await.unwrap();

        let active = store.get_active_alerts().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "latency at 900ms");
        assert_eq!(active[0].severity, Severity::Critical);
    }
}
