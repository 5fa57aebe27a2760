//! SMTP probe: TCP connect, handshake read, optional STARTTLS negotiation.
//! `smtp_up` is 0 on any failure at any stage (reference agent's smtp.go
//! short-circuits identically — a failed STARTTLS is as dead as a failed
//! dial). STARTTLS success is judged by the server's `220` response to the
//! command, the same signal a real client uses before handing the socket
//! off to a TLS library.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{elapsed_ms, Probe};
use crate::agent::config::ResolvedSmtpTarget;
use crate::shared::model::Sample;

pub struct SmtpProbe {
    name: String,
    host: String,
    port: u16,
    starttls: bool,
    timeout: std::time::Duration,
}

impl SmtpProbe {
    pub fn new(target: &ResolvedSmtpTarget) -> Self {
        Self {
            name: target.name.clone(),
            host: target.host.clone(),
            port: target.port,
            starttls: target.starttls,
            timeout: target.timeout,
        }
    }

    fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            ("host".to_string(), self.host.clone()),
            ("port".to_string(), self.port.to_string()),
        ])
    }

    fn sample(&self, name: &str, value: f64, labels: &HashMap<String, String>) -> Sample {
        Sample {
            service: "smtp".to_string(),
            target: self.name.clone(),
            name: name.to_string(),
            value,
            labels: labels.clone(),
            ts: Utc::now(),
        }
    }

    async fn handshake(&self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = timeout(self.timeout, TcpStream::connect(&addr)).await??;
        let mut reader = BufReader::new(stream);
        require_2xx(&read_response_line(&mut reader).await?)?;

        if !self.starttls {
            return Ok(());
        }

        let mut stream = reader.into_inner();
        stream.write_all(b"EHLO argos-agent\r\n").await?;
        let mut reader = BufReader::new(stream);
        require_2xx(&read_response_line(&mut reader).await?)?;

        let mut stream = reader.into_inner();
        stream.write_all(b"STARTTLS\r\n").await?;
        let mut reader = BufReader::new(stream);
        require_2xx(&read_response_line(&mut reader).await?)?;

        Ok(())
    }
}

async fn read_response_line<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> anyhow::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.is_empty() {
        anyhow::bail!("connection closed before a response was read");
    }
    Ok(line)
}

fn require_2xx(line: &str) -> anyhow::Result<()> {
    if line.starts_with('2') {
        Ok(())
    } else {
        anyhow::bail!("unexpected SMTP response: {}", line.trim())
    }
}

#[async_trait]
impl Probe for SmtpProbe {
    async fn collect(&self) -> Vec<Sample> {
        let labels = self.labels();
        let start = Instant::now();

        match self.handshake().await {
            Ok(()) => {
                let latency = elapsed_ms(start);
                vec![
                    self.sample("smtp_up", 1.0, &labels),
                    self.sample("smtp_handshake_ms", latency, &labels),
                ]
            }
            Err(_) => vec![self.sample("smtp_up", 0.0, &labels)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_2xx_accepts_2xx_and_rejects_others() {
        assert!(require_2xx("220 mail.example.com ESMTP\r\n").is_ok());
        assert!(require_2xx("250-mail.example.com\r\n").is_ok());
        assert!(require_2xx("421 service not available\r\n").is_err());
    }
}
