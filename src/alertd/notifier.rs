//! SMTP alert delivery. Builds the subject/body the reference notifier
//! produces and sends it over `lettre`, either as a plain unauthenticated
//! relay or STARTTLS + PLAIN auth depending on `EmailConfig::use_tls`.

use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::alertd::config::{EmailConfig, Rule};

pub struct Notifier {
    config: EmailConfig,
}

impl Notifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub async fn send_alert(&self, rule: &Rule, value: f64) -> anyhow::Result<()> {
        let subject = format!("[{}] {}", rule.severity.as_str().to_uppercase(), rule.name);
        let body = build_body(rule, value);

        for recipient in &rule.email_to {
            self.send_email(recipient, &subject, &body)
                .await
                .map_err(|e| anyhow::anyhow!("failed to send to {recipient}: {e}"))?;
        }

        Ok(())
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.config.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        let transport = self.build_transport()?;
        transport.send(message).await?;
        Ok(())
    }

    fn build_transport(&self) -> anyhow::Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.smtp_host)
        };

        let builder = builder.port(self.config.smtp_port);

        let builder = if self.config.smtp_user.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                self.config.smtp_user.clone(),
                self.config.smtp_password.clone(),
            ))
        };

        Ok(builder.build())
    }
}

fn build_body(rule: &Rule, value: f64) -> String {
    let mut body = String::new();
    body.push_str(&format!("Alert: {}\n", rule.name));
    body.push_str(&format!("Severity: {}\n", rule.severity.as_str()));
    body.push_str(&format!("Time: {}\n\n", Utc::now().to_rfc3339()));
    body.push_str(&format!("Description: {}\n\n", rule.description));
    body.push_str(&format!("Expression: {}\n", rule.expr));
    body.push_str(&format!("Current Value: {value:.2}\n\n"));

    if !rule.service.is_empty() {
        body.push_str(&format!("Service: {}\n", rule.service));
    }
    if !rule.target.is_empty() {
        body.push_str(&format!("Target: {}\n", rule.target));
    }

    body.push_str("\n---\n");
    body.push_str("Argos Monitoring System\n");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::model::Severity;

    #[test]
    fn body_includes_service_and_target_when_present() {
        let rule = Rule {
            name: "high-cpu".into(),
            description: "CPU pegged".into(),
            expr: "avg_over(5m, cpu_pct) > 90".into(),
            service: "web".into(),
            target: "edge-1".into(),
            for_duration: "1m".into(),
            severity: Severity::Critical,
            email_to: vec!["oncall@example.com".into()],
        };

        let body = build_body(&rule, 97.3);
        assert!(body.contains("Alert: high-cpu"));
        assert!(body.contains("Severity: critical"));
        assert!(body.contains("Current Value: 97.30"));
        assert!(body.contains("Service: web"));
        assert!(body.contains("Target: edge-1"));
    }

    #[test]
    fn body_omits_service_and_target_when_absent() {
        let rule = Rule {
            name: "db-down".into(),
            description: String::new(),
            expr: "last(1m, db_up) == 0".into(),
            service: String::new(),
            target: String::new(),
            for_duration: "1m".into(),
            severity: Severity::Warning,
            email_to: vec!["oncall@example.com".into()],
        };

        let body = build_body(&rule, 0.0);
        assert!(!body.contains("Service:"));
        assert!(!body.contains("Target:"));
    }
}
