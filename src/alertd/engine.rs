//! Alert engine: single-evaluator-owns-state-map actor (DESIGN.md, open
//! question #3). Each 30s tick fans out one task per rule to compute
//! `(triggered, value)` against the query API; those tasks report back
//! over an mpsc channel to this actor, which applies the PENDING/FIRING
//! transition and the notifier call serially, so the state map is never
//! touched from more than one place at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::alertd::config::{EmailConfig, Rule};
use crate::alertd::evaluator::Evaluator;
use crate::alertd::notifier::Notifier;
use crate::shared::model::ActiveAlert;
use crate::storage::Storage;

const TICK_PERIOD: Duration = Duration::from_secs(30);

struct PendingState {
    fired_at: DateTime<Utc>,
    notified: bool,
    value: f64,
}

pub struct Engine {
    rules: Vec<Rule>,
    evaluator: Arc<Evaluator>,
    notifier: Arc<Notifier>,
    storage: Arc<dyn Storage>,
    state: HashMap<String, PendingState>,
}

enum EvalOutcome {
    Ok { triggered: bool, value: f64 },
    Err(anyhow::Error),
}

impl Engine {
    pub fn new(
        rules: Vec<Rule>,
        api_url: String,
        email: EmailConfig,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            rules,
            evaluator: Arc::new(Evaluator::new(api_url)),
            notifier: Arc::new(Notifier::new(email)),
            storage,
            state: HashMap::new(),
        }
    }

    /// Runs until cancelled by ctrl_c or SIGTERM, evaluating immediately
    /// and then every [`TICK_PERIOD`].
    pub async fn run(mut self) {
        info!("alert engine started, evaluating rules every {:?}", TICK_PERIOD);

        let mut ticker = tokio::time::interval(TICK_PERIOD);
        #[cfg(unix)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        self.evaluate_all().await;

        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = ticker.tick() => self.evaluate_all().await,
                    _ = tokio::signal::ctrl_c() => {
                        info!("received ctrl_c, shutting down alert engine");
                        break;
                    }
                    _ = sigterm.recv() => {
                        info!("received SIGTERM, shutting down alert engine");
                        break;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                tokio::select! {
                    _ = ticker.tick() => self.evaluate_all().await,
                    _ = tokio::signal::ctrl_c() => {
                        info!("received ctrl_c, shutting down alert engine");
                        break;
                    }
                }
            }
        }
    }

    async fn evaluate_all(&mut self) {
        let (tx, mut rx) = mpsc::channel(self.rules.len().max(1));

        for rule in self.rules.clone() {
            let evaluator = Arc::clone(&self.evaluator);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = match evaluator.evaluate(&rule).await {
                    Ok((triggered, value)) => EvalOutcome::Ok { triggered, value },
                    Err(e) => EvalOutcome::Err(e),
                };
                let _ = tx.send((rule, outcome)).await;
            });
        }
        drop(tx);

        while let Some((rule, outcome)) = rx.recv().await {
            match outcome {
                EvalOutcome::Ok { triggered, value } => {
                    self.apply_transition(&rule, triggered, value).await;
                }
                EvalOutcome::Err(e) => {
                    error!("error evaluating rule {}: {e}", rule.name);
                }
            }
        }
    }

    async fn apply_transition(&mut self, rule: &Rule, triggered: bool, value: f64) {
        let key = rule.name.clone();

        if triggered {
            let for_duration = rule.for_duration();

            let should_notify = match self.state.get(&key) {
                None => {
                    self.state.insert(
                        key.clone(),
                        PendingState { fired_at: Utc::now(), notified: false, value },
                    );
                    info!("[{}] alert triggered: {} (value: {value:.2})", rule.severity, rule.name);
                    false
                }
                Some(existing) => {
                    let dwell = Utc::now() - existing.fired_at;
                    dwell.to_std().unwrap_or(Duration::ZERO) >= for_duration && !existing.notified
                }
            };

            if should_notify {
                info!("[{}] alert firing: {} (value: {value:.2})", rule.severity, rule.name);

                if let Err(e) = self.notifier.send_alert(rule, value).await {
                    error!("failed to send alert notification: {e}");
                    return;
                }

                if let Some(state) = self.state.get_mut(&key) {
                    state.notified = true;
                    state.value = value;
                }

                let alert = ActiveAlert {
                    name: rule.name.clone(),
                    rule: rule.expr.clone(),
                    severity: rule.severity,
                    service: rule.service.clone(),
                    target: rule.target.clone(),
                    labels: Default::default(),
                    message: format!("{} (value: {value:.2})", rule.description),
                    fired_at: self.state.get(&key).map(|s| s.fired_at).unwrap_or_else(Utc::now),
                    resolved_at: None,
                };

                if let Err(e) = self.storage.upsert_active_alert(&alert).await {
                    warn!("failed to record active alert {}: {e}", rule.name);
                }

                info!("alert notification sent for: {}", rule.name);
            } else if let Some(state) = self.state.get_mut(&key) {
                state.value = value;
            }
        } else if let Some(state) = self.state.remove(&key) {
            if state.notified {
                info!("alert resolved: {}", rule.name);
                if let Err(e) = self.storage.resolve_alert(&rule.name).await {
                    warn!("failed to resolve active alert {}: {e}", rule.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::model::Severity;
    use crate::storage::{RangeQuery, Scope, StorageResult};
    use crate::shared::model::{AlertRule, AlertRuleInput, DataPoint, Sample};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStorage {
        active: Mutex<Vec<ActiveAlert>>,
        resolved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Storage for FakeStorage {
        async fn insert_batch(&self, _agent_id: &str, _samples: &[Sample]) -> StorageResult<()> {
            Ok(())
        }
        async fn query_latest(&self, _name: &str, _scope: &Scope) -> StorageResult<Option<Sample>> {
            Ok(None)
        }
        async fn query_range(&self, _query: &RangeQuery) -> StorageResult<Vec<DataPoint>> {
            Ok(vec![])
        }
        async fn list_services(&self) -> StorageResult<Vec<String>> {
            Ok(vec![])
        }
        async fn list_targets(&self, _service: &str) -> StorageResult<Vec<String>> {
            Ok(vec![])
        }
        async fn metrics_count(&self) -> StorageResult<i64> {
            Ok(0)
        }
        async fn last_ingest(&self) -> StorageResult<Option<DateTime<Utc>>> {
            Ok(None)
        }
        async fn create_rule(&self, _input: AlertRuleInput) -> StorageResult<AlertRule> {
            unimplemented!()
        }
        async fn get_rule(&self, _id: i64) -> StorageResult<Option<AlertRule>> {
            Ok(None)
        }
        async fn list_rules(&self) -> StorageResult<Vec<AlertRule>> {
            Ok(vec![])
        }
        async fn update_rule(&self, _id: i64, _input: AlertRuleInput) -> StorageResult<AlertRule> {
            unimplemented!()
        }
        async fn delete_rule(&self, _id: i64) -> StorageResult<()> {
            Ok(())
        }
        async fn upsert_active_alert(&self, alert: &ActiveAlert) -> StorageResult<()> {
            self.active.lock().unwrap().push(alert.clone());
            Ok(())
        }
        async fn resolve_alert(&self, name: &str) -> StorageResult<()> {
            self.resolved.lock().unwrap().push(name.to_string());
            Ok(())
        }
        async fn get_active_alerts(&self) -> StorageResult<Vec<ActiveAlert>> {
            Ok(self.active.lock().unwrap().clone())
        }
    }

    fn rule(for_duration: &str) -> Rule {
        Rule {
            name: "high-cpu".into(),
            description: "cpu is high".into(),
            expr: "last(1m, cpu_pct) > 90".into(),
            service: "web".into(),
            target: "edge-1".into(),
            for_duration: for_duration.into(),
            severity: Severity::Critical,
            email_to: vec!["oncall@example.com".into()],
        }
    }

    fn engine_with(storage: Arc<dyn Storage>) -> Engine {
        Engine::new(vec![], "http://localhost:8081".into(), EmailConfig::default(), storage)
    }

    #[tokio::test]
    async fn first_trigger_enters_pending_without_notifying() {
        let storage: Arc<dyn Storage> = Arc::new(FakeStorage::default());
        let mut engine = engine_with(Arc::clone(&storage));
        let rule = rule("1m");

        engine.apply_transition(&rule, true, 95.0).await;

        assert!(engine.state.contains_key("high-cpu"));
        assert!(!engine.state.get("high-cpu").unwrap().notified);
    }

    #[tokio::test]
    async fn non_trigger_without_prior_state_is_a_no_op() {
        let storage: Arc<dyn Storage> = Arc::new(FakeStorage::default());
        let mut engine = engine_with(storage);
        let rule = rule("1m");

        engine.apply_transition(&rule, false, 0.0).await;

        assert!(engine.state.is_empty());
    }

    #[tokio::test]
    async fn resolving_an_unnotified_pending_state_does_not_resolve_in_storage() {
        let storage: Arc<dyn Storage> = Arc::new(FakeStorage::default());
        let mut engine = engine_with(Arc::clone(&storage));
        let r = rule("1h");

        engine.apply_transition(&r, true, 95.0).await;
        engine.apply_transition(&r, false, 0.0).await;

        assert!(engine.state.is_empty());
    }
}
