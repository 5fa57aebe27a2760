//! Collector agent configuration: a raw, `Option`-heavy structure loaded
//! from YAML, resolved into fully-defaulted per-family target lists.
//!
//! Mirrors the two-phase `Config`/`ResolvedConfig` split the hub binary
//! uses for server/service configuration, generalized to five probe
//! families instead of two.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_PUSH_INTERVAL_SECS: u64 = 10;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_ICMP_TIMEOUT_SECS: u64 = 2;
const DEFAULT_SQL_SLOW_MS: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub agent_id: String,
    pub push_endpoint: String,
    #[serde(default)]
    pub push_interval_secs: Option<u64>,
    #[serde(default)]
    pub targets: Targets,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Targets {
    #[serde(default)]
    pub http: Vec<HttpTarget>,
    #[serde(default)]
    pub dns: Vec<DnsTarget>,
    #[serde(default)]
    pub smtp: Vec<SmtpTarget>,
    #[serde(default)]
    pub icmp: Vec<IcmpTarget>,
    #[serde(default)]
    pub sql: Vec<SqlTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpTarget {
    pub name: String,
    pub url: String,
    #[serde(default = "default_http_method")]
    pub method: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsTarget {
    pub name: String,
    pub fqdn: String,
    pub server: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpTarget {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub starttls: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IcmpTarget {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqlTarget {
    pub name: String,
    pub dsn: String,
    #[serde(default)]
    pub slow_ms: Option<u64>,
    #[serde(default)]
    pub ping_sql: Option<String>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid agent config: {e}"))
}

/// Fully-defaulted configuration the scheduler consumes.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub agent_id: String,
    pub push_endpoint: String,
    pub push_interval: Duration,
    pub http: Vec<ResolvedHttpTarget>,
    pub dns: Vec<DnsTarget>,
    pub smtp: Vec<ResolvedSmtpTarget>,
    pub icmp: Vec<ResolvedIcmpTarget>,
    pub sql: Vec<ResolvedSqlTarget>,
}

#[derive(Debug, Clone)]
pub struct ResolvedHttpTarget {
    pub name: String,
    pub url: String,
    pub method: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedSmtpTarget {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub starttls: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedIcmpTarget {
    pub name: String,
    pub host: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedSqlTarget {
    pub name: String,
    pub dsn: String,
    pub slow_ms: u64,
    pub ping_sql: String,
}

impl Config {
    pub fn resolve(self) -> ResolvedConfig {
        ResolvedConfig {
            agent_id: self.agent_id,
            push_endpoint: self.push_endpoint,
            push_interval: Duration::from_secs(
                self.push_interval_secs.unwrap_or(DEFAULT_PUSH_INTERVAL_SECS),
            ),
            http: self
                .targets
                .http
                .into_iter()
                .map(|t| ResolvedHttpTarget {
                    name: t.name,
                    url: t.url,
                    method: t.method,
                    timeout: Duration::from_secs(t.timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)),
                })
                .collect(),
            dns: self.targets.dns,
            smtp: self
                .targets
                .smtp
                .into_iter()
                .map(|t| ResolvedSmtpTarget {
                    name: t.name,
                    host: t.host,
                    port: t.port,
                    starttls: t.starttls,
                    timeout: Duration::from_secs(t.timeout_secs.unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS)),
                })
                .collect(),
            icmp: self
                .targets
                .icmp
                .into_iter()
                .map(|t| ResolvedIcmpTarget {
                    name: t.name,
                    host: t.host,
                    timeout: Duration::from_secs(t.timeout_secs.unwrap_or(DEFAULT_ICMP_TIMEOUT_SECS)),
                })
                .collect(),
            sql: self
                .targets
                .sql
                .into_iter()
                .map(|t| ResolvedSqlTarget {
                    name: t.name,
                    dsn: t.dsn,
                    slow_ms: t.slow_ms.unwrap_or(DEFAULT_SQL_SLOW_MS),
                    ping_sql: t.ping_sql.unwrap_or_else(|| "SELECT 1".to_string()),
                })
                .collect(),
        }
    }
}
