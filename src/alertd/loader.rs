//! Hybrid rule loading: prefer the API's live rule set, fall back to the
//! local YAML file, and always take the mail block from the file — the
//! API has no notion of SMTP credentials.

use std::time::Duration;

use serde::Deserialize;

use crate::alertd::config::{EmailConfig, Rule, RulesConfig};

const API_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiAlertRule {
    name: String,
    #[serde(default)]
    description: String,
    expr: String,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    target: Option<String>,
    for_duration: String,
    severity: crate::shared::model::Severity,
    #[serde(default)]
    email_to: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    rules: Vec<ApiAlertRule>,
}

async fn load_from_api(api_url: &str) -> anyhow::Result<RulesConfig> {
    let client = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;
    let resp = client
        .get(format!("{api_url}/api/alert-rules"))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("failed to fetch rules from API: {e}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("API returned status {}", resp.status());
    }

    let parsed: ApiResponse = resp
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("failed to decode API response: {e}"))?;

    if parsed.rules.is_empty() {
        anyhow::bail!("no rules found in API");
    }

    let rules = parsed
        .rules
        .into_iter()
        .map(|r| Rule {
            name: r.name,
            description: r.description,
            expr: r.expr,
            service: r.service.unwrap_or_default(),
            target: r.target.unwrap_or_default(),
            for_duration: r.for_duration,
            severity: r.severity,
            email_to: r.email_to,
        })
        .collect();

    Ok(RulesConfig {
        rules,
        email: EmailConfig::default(),
    })
}

/// API-first, file-fallback, mail-block-always-from-file. Fails only if
/// both the API fetch and the file read fail.
pub async fn load_hybrid(api_url: &str, yaml_path: &str) -> anyhow::Result<RulesConfig> {
    let file_result = super::config::read_rules_file(yaml_path);

    match load_from_api(api_url).await {
        Ok(mut api_cfg) => {
            if let Ok(ref file_cfg) = file_result {
                api_cfg.email = file_cfg.email.clone();
            }
            Ok(api_cfg)
        }
        Err(api_err) => match file_result {
            Ok(file_cfg) => Ok(file_cfg),
            Err(file_err) => Err(anyhow::anyhow!(
                "failed to load rules from API and YAML: api={api_err}, yaml={file_err}"
            )),
        },
    }
}
