//! Tick loop: fan out to every configured probe in parallel, concatenate
//! the results into one batch, push it, log and drop on failure. Mirrors
//! the reference agent's `collectAllMetrics` + ticker loop in `main.go`,
//! generalized from a WaitGroup/channel pair to a `JoinSet`.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::agent::config::ResolvedConfig;
use crate::agent::probes::dns::DnsProbe;
use crate::agent::probes::http::HttpProbe;
use crate::agent::probes::icmp::IcmpProbe;
use crate::agent::probes::smtp::SmtpProbe;
use crate::agent::probes::sql::SqlProbe;
use crate::agent::probes::Probe;
use crate::shared::model::{Batch, Sample};

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Scheduler {
    config: ResolvedConfig,
    probes: Vec<Arc<dyn Probe>>,
    client: reqwest::Client,
}

impl Scheduler {
    pub fn new(config: ResolvedConfig) -> Self {
        let probes = build_probes(&config);
        info!("initialized {} probes", probes.len());

        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            probes,
            client,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.push_interval);
        let mut sigterm = signal(SignalKind::terminate()).ok();

        info!("agent started, collecting metrics...");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let samples = self.collect_all().await;
                    if samples.is_empty() {
                        continue;
                    }

                    match self.push(samples.clone()).await {
                        Ok(()) => info!("pushed {} samples successfully", samples.len()),
                        Err(e) => warn!("failed to push samples: {e}"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received shutdown signal, stopping agent...");
                    return;
                }
                _ = async {
                    match sigterm.as_mut() {
                        Some(s) => { s.recv().await; }
                        None => std::future::pending().await,
                    }
                } => {
                    info!("received SIGTERM, stopping agent...");
                    return;
                }
            }
        }
    }

    /// Collect every probe concurrently. A probe that exceeds its own
    /// internal timeout still returns (its own `Collect` already bounds
    /// itself); this only bounds probes that hang entirely.
    async fn collect_all(&self) -> Vec<Sample> {
        let mut set = JoinSet::new();
        for probe in &self.probes {
            let probe = Arc::clone(probe);
            set.spawn(async move { probe.collect().await });
        }

        let mut samples = Vec::new();
        while let Some(result) = set.join_next().await {
            match result {
                Ok(mut probe_samples) => samples.append(&mut probe_samples),
                Err(e) => error!("probe task panicked: {e}"),
            }
        }
        samples
    }

    async fn push(&self, items: Vec<Sample>) -> anyhow::Result<()> {
        let batch = Batch {
            agent_id: self.config.agent_id.clone(),
            items,
        };

        let response = self
            .client
            .post(&self.config.push_endpoint)
            .json(&batch)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("ingest endpoint returned {}", response.status());
        }
        Ok(())
    }
}

fn build_probes(config: &ResolvedConfig) -> Vec<Arc<dyn Probe>> {
    let mut probes: Vec<Arc<dyn Probe>> = Vec::new();

    for target in &config.http {
        probes.push(Arc::new(HttpProbe::new(target)));
    }
    for target in &config.dns {
        probes.push(Arc::new(DnsProbe::new(target)));
    }
    for target in &config.smtp {
        probes.push(Arc::new(SmtpProbe::new(target)));
    }
    for target in &config.icmp {
        probes.push(Arc::new(IcmpProbe::new(target)));
    }
    for target in &config.sql {
        probes.push(Arc::new(SqlProbe::new(target)));
    }

    probes
}
