//! SQL-ping probe: connects via a DSN, runs a configurable ping query,
//! and best-effort reads the database's own activity view. Generalizes
//! the reference agent's Postgres-only probe (`lib/pq`) to any backend
//! `sqlx::Any` supports, since the wire format of the pinged database is
//! not part of this system's contract.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::Row;

use super::{elapsed_ms, Probe};
use crate::agent::config::ResolvedSqlTarget;
use crate::shared::model::Sample;

pub struct SqlProbe {
    name: String,
    dsn: String,
    ping_sql: String,
    slow_ms: u64,
}

impl SqlProbe {
    pub fn new(target: &ResolvedSqlTarget) -> Self {
        Self {
            name: target.name.clone(),
            dsn: target.dsn.clone(),
            ping_sql: target.ping_sql.clone(),
            slow_ms: target.slow_ms,
        }
    }

    fn sample(&self, name: &str, value: f64, labels: &HashMap<String, String>) -> Sample {
        Sample {
            service: "db".to_string(),
            target: self.name.clone(),
            name: name.to_string(),
            value,
            labels: labels.clone(),
            ts: Utc::now(),
        }
    }

    async fn ping(&self) -> anyhow::Result<(sqlx::AnyPool, f64)> {
        let pool = AnyPoolOptions::new().max_connections(1).connect(&self.dsn).await?;

        let start = Instant::now();
        sqlx::query(&self.ping_sql).fetch_one(&pool).await?;
        let latency = elapsed_ms(start);

        Ok((pool, latency))
    }
}

async fn scalar_count(pool: &sqlx::AnyPool, query: &str) -> Option<f64> {
    let row: AnyRow = sqlx::query(query).fetch_one(pool).await.ok()?;
    row.try_get::<i64, _>(0).ok().map(|n| n as f64)
}

#[async_trait]
impl Probe for SqlProbe {
    async fn collect(&self) -> Vec<Sample> {
        let labels = HashMap::new();

        let (pool, latency) = match self.ping().await {
            Ok(result) => result,
            Err(_) => return vec![self.sample("db_up", 0.0, &labels)],
        };

        let mut samples = vec![
            self.sample("db_up", 1.0, &labels),
            self.sample("db_query_ms", latency, &labels),
        ];

        if let Some(connections) =
            scalar_count(&pool, "SELECT count(*) FROM pg_stat_activity").await
        {
            samples.push(self.sample("db_connections", connections, &labels));
        }

        let slow_query = format!(
            "SELECT count(*) FROM pg_stat_activity WHERE state = 'active' AND query_start < NOW() - INTERVAL '{} milliseconds'",
            self.slow_ms
        );
        if let Some(slow) = scalar_count(&pool, &slow_query).await {
            samples.push(self.sample("db_slow_queries", slow, &labels));
        }

        pool.close().await;
        samples
    }
}
