//! DNS probe: `dns_up`, `dns_lookup_ms`, resolving against a specific
//! nameserver rather than the system resolver (reference agent's dns.go
//! dials `server` directly over UDP).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

use super::elapsed_ms;
use super::Probe;
use crate::agent::config::DnsTarget;
use crate::shared::model::Sample;

pub struct DnsProbe {
    name: String,
    fqdn: String,
    server: String,
}

impl DnsProbe {
    pub fn new(target: &DnsTarget) -> Self {
        Self {
            name: target.name.clone(),
            fqdn: target.fqdn.clone(),
            server: target.server.clone(),
        }
    }

    fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            ("fqdn".to_string(), self.fqdn.clone()),
            ("server".to_string(), self.server.clone()),
        ])
    }

    fn sample(&self, name: &str, value: f64, labels: &HashMap<String, String>) -> Sample {
        Sample {
            service: "dns".to_string(),
            target: self.name.clone(),
            name: name.to_string(),
            value,
            labels: labels.clone(),
            ts: Utc::now(),
        }
    }
}

#[async_trait]
impl Probe for DnsProbe {
    async fn collect(&self) -> Vec<Sample> {
        let labels = self.labels();

        let server_addr = match resolve_server_addr(&self.server) {
            Some(addr) => addr,
            None => return vec![self.sample("dns_up", 0.0, &labels)],
        };

        let config = ResolverConfig::from_parts(
            None,
            vec![],
            NameServerConfigGroup::from_ips_clear(&[server_addr.ip()], server_addr.port(), true),
        );
        let mut opts = ResolverOpts::default();
        opts.timeout = std::time::Duration::from_secs(5);

        let resolver = TokioAsyncResolver::tokio(config, opts);

        let start = Instant::now();
        let result = resolver.lookup_ip(self.fqdn.as_str()).await;
        let latency = elapsed_ms(start);

        let up = if result.is_ok() { 1.0 } else { 0.0 };

        vec![
            self.sample("dns_up", up, &labels),
            self.sample("dns_lookup_ms", latency, &labels),
        ]
    }
}

fn resolve_server_addr(server: &str) -> Option<SocketAddr> {
    if let Ok(addr) = SocketAddr::from_str(server) {
        return Some(addr);
    }
    IpAddr::from_str(server).ok().map(|ip| SocketAddr::new(ip, 53))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_server_addr_defaults_to_port_53() {
        assert_eq!(
            resolve_server_addr("8.8.8.8"),
            Some(SocketAddr::from_str("8.8.8.8:53").unwrap())
        );
    }

    #[test]
    fn resolve_server_addr_keeps_explicit_port() {
        assert_eq!(
            resolve_server_addr("8.8.8.8:5353"),
            Some(SocketAddr::from_str("8.8.8.8:5353").unwrap())
        );
    }
}
