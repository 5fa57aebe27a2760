//! HTTP probe: `http_up`, `http_latency_ms`, `http_status_code`, and a
//! 4xx/5xx error counter, grounded on the reference agent's http.go probe.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;

use super::{elapsed_ms, Probe};
use crate::agent::config::ResolvedHttpTarget;
use crate::shared::model::Sample;

pub struct HttpProbe {
    name: String,
    url: String,
    method: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(target: &ResolvedHttpTarget) -> Self {
        let client = reqwest::Client::builder()
            .timeout(target.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: target.name.clone(),
            url: target.url.clone(),
            method: target.method.clone(),
            client,
        }
    }

    fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            ("url".to_string(), self.url.clone()),
            ("method".to_string(), self.method.clone()),
        ])
    }

    fn sample(&self, name: &str, value: f64, labels: &HashMap<String, String>) -> Sample {
        Sample {
            service: "web".to_string(),
            target: self.name.clone(),
            name: name.to_string(),
            value,
            labels: labels.clone(),
            ts: Utc::now(),
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn collect(&self) -> Vec<Sample> {
        let labels = self.labels();
        let method = reqwest::Method::from_bytes(self.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let start = Instant::now();
        let result = self.client.request(method, &self.url).send().await;
        let latency = elapsed_ms(start);

        let response = match result {
            Ok(response) => response,
            Err(_) => {
                return vec![
                    self.sample("http_up", 0.0, &labels),
                    self.sample("http_latency_ms", latency, &labels),
                ];
            }
        };

        let status = response.status();
        let mut samples = vec![
            self.sample("http_up", 1.0, &labels),
            self.sample("http_latency_ms", latency, &labels),
            self.sample("http_status_code", status.as_u16() as f64, &labels),
        ];

        if status.is_client_error() {
            samples.push(self.sample("http_errors_4xx", 1.0, &labels));
        }
        if status.is_server_error() {
            samples.push(self.sample("http_errors_5xx", 1.0, &labels));
        }

        samples
    }
}

