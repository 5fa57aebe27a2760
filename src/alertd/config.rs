//! Rule file shape: `rules.yaml`'s `RulesConfig`/`Rule`/`EmailConfig`, with
//! the same field-level defaults the reference loader applies.

use std::time::Duration;

use serde::Deserialize;

use crate::shared::model::Severity;

const DEFAULT_FOR: &str = "1m";
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expr: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub target: String,
    #[serde(rename = "for", default = "default_for")]
    pub for_duration: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub email_to: Vec<String>,
}

fn default_for() -> String {
    DEFAULT_FOR.to_string()
}

fn default_severity() -> Severity {
    Severity::Warning
}

impl Rule {
    /// The dwell-time the rule must hold `triggered` before it fires.
    /// Falls back to one minute on a malformed `for`, matching the
    /// reference loader's `time.ParseDuration` fallback.
    pub fn for_duration(&self) -> Duration {
        crate::shared::util::parse_relative_duration(&format!("-{}", self.for_duration))
            .and_then(|d| d.to_std().ok())
            .unwrap_or(Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_user: String::new(),
            smtp_password: String::new(),
            from: String::new(),
            use_tls: false,
        }
    }
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

pub fn read_rules_file(path: &str) -> anyhow::Result<RulesConfig> {
    let raw = std::fs::read_to_string(path)?;
    let mut cfg: RulesConfig =
        serde_yaml::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid rules file: {e}"))?;
    if cfg.email.smtp_port == 0 {
        cfg.email.smtp_port = DEFAULT_SMTP_PORT;
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_for_falls_back_to_one_minute() {
        let rule = Rule {
            name: "x".into(),
            description: String::new(),
            expr: "last(cpu) > 1".into(),
            service: String::new(),
            target: String::new(),
            for_duration: "not-a-duration".into(),
            severity: Severity::Warning,
            email_to: vec![],
        };
        assert_eq!(rule.for_duration(), Duration::from_secs(60));
    }

    #[test]
    fn parses_minute_and_hour_suffixes() {
        let mut rule = Rule {
            name: "x".into(),
            description: String::new(),
            expr: "last(cpu) > 1".into(),
            service: String::new(),
            target: String::new(),
            for_duration: "5m".into(),
            severity: Severity::Warning,
            email_to: vec![],
        };
        assert_eq!(rule.for_duration(), Duration::from_secs(300));
        rule.for_duration = "2h".into();
        assert_eq!(rule.for_duration(), Duration::from_secs(7200));
    }
}
