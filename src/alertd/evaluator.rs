//! Expression evaluator: parses `last(d, metric) op threshold`,
//! `avg_over(d, metric) op threshold`, and `zscore(d, metric) op threshold`
//! against the query API, then compares the resulting value to `threshold`.
//!
//! One hand-written tokenizer replaces the reference implementation's three
//! near-identical regexes — the grammar is small enough (function name,
//! parenthesized duration/metric pair, comparison operator, number) that a
//! single pass is clearer than three copies of the same regex.

use crate::alertd::config::Rule;
use crate::shared::model::QueryRangeResponse;
use crate::shared::util::{mean, zscore as population_zscore};

const API_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const COMPARE_EPSILON: f64 = 0.0001;

pub struct Evaluator {
    api_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Last,
    AvgOver,
    ZScore,
}

#[derive(Debug, Clone, PartialEq)]
struct ParsedExpr {
    function: Function,
    /// First parenthesized argument. Present for all three forms; only
    /// `avg_over`/`zscore` actually use it to scope the range query —
    /// `last`'s duration argument is parsed (so a malformed one is still a
    /// parse error) but otherwise ignored, matching the reference.
    duration: String,
    metric: String,
    operator: String,
    threshold: f64,
}

impl Evaluator {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            client: reqwest::Client::builder()
                .timeout(API_TIMEOUT)
                .build()
                .expect("reqwest client"),
        }
    }

    pub async fn evaluate(&self, rule: &Rule) -> anyhow::Result<(bool, f64)> {
        let parsed = parse_expr(&rule.expr)
            .ok_or_else(|| anyhow::anyhow!("unsupported expression: {}", rule.expr))?;

        let value = match parsed.function {
            Function::Last => {
                self.last_metric(&parsed.metric, &rule.service, &rule.target).await?
            }
            Function::AvgOver => {
                let points = self
                    .range_metrics(&parsed.metric, &rule.service, &rule.target, &parsed.duration)
                    .await?;
                if points.is_empty() {
                    0.0
                } else {
                    mean(&points.iter().map(|p| p.value).collect::<Vec<_>>())
                }
            }
            Function::ZScore => {
                let points = self
                    .range_metrics(&parsed.metric, &rule.service, &rule.target, &parsed.duration)
                    .await?;
                if points.len() < 2 {
                    return Ok((false, 0.0));
                }
                let values: Vec<f64> = points.iter().map(|p| p.value).collect();
                let current = *values.last().unwrap();
                population_zscore(current, &values)
            }
        };

        let triggered = compare(value, &parsed.operator, parsed.threshold);
        Ok((triggered, value))
    }

    async fn last_metric(&self, name: &str, service: &str, target: &str) -> anyhow::Result<f64> {
        let mut req = self
            .client
            .get(format!("{}/api/metrics/query", self.api_url))
            .query(&[("name", name)]);
        if !service.is_empty() {
            req = req.query(&[("service", service)]);
        }
        if !target.is_empty() {
            req = req.query(&[("target", target)]);
        }

        let resp = req.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(0.0);
        }
        if !resp.status().is_success() {
            anyhow::bail!("API error: {}", resp.status());
        }

        let sample: crate::shared::model::Sample = resp.json().await?;
        Ok(sample.value)
    }

    async fn range_metrics(
        &self,
        name: &str,
        service: &str,
        target: &str,
        duration: &str,
    ) -> anyhow::Result<Vec<crate::shared::model::DataPoint>> {
        let start = format!("-{duration}");
        let mut req = self
            .client
            .get(format!("{}/api/metrics/range", self.api_url))
            .query(&[("name", name), ("start", &start)]);
        if !service.is_empty() {
            req = req.query(&[("service", service)]);
        }
        if !target.is_empty() {
            req = req.query(&[("target", target)]);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("API error: {}", resp.status());
        }

        let body: QueryRangeResponse = resp.json().await?;
        Ok(body.data)
    }
}

fn compare(value: f64, operator: &str, threshold: f64) -> bool {
    match operator {
        ">" => value > threshold,
        ">=" => value >= threshold,
        "<" => value < threshold,
        "<=" => value <= threshold,
        "==" => (value - threshold).abs() < COMPARE_EPSILON,
        "!=" => (value - threshold).abs() >= COMPARE_EPSILON,
        _ => false,
    }
}

/// Parses `func(arg1, arg2) op number`, where `func` is one of
/// `avg_over`/`last`/`zscore`. A single linear scan: function name up to
/// `(`, split the parenthesized body on the first comma, then the
/// remaining tail is trimmed and split into an operator token and a
/// numeric token.
fn parse_expr(expr: &str) -> Option<ParsedExpr> {
    let expr = expr.trim();
    let open = expr.find('(')?;
    let close = expr[open..].find(')').map(|i| open + i)?;

    let name = expr[..open].trim().to_lowercase();
    let function = if name.contains("avg_over") {
        Function::AvgOver
    } else if name.contains("zscore") {
        Function::ZScore
    } else if name.contains("last") {
        Function::Last
    } else {
        return None;
    };

    let args = &expr[open + 1..close];
    let comma = args.find(',')?;
    let duration = args[..comma].trim().to_string();
    let metric = args[comma + 1..].trim().to_string();

    let tail = expr[close + 1..].trim();
    let op_end = tail.find(|c: char| !matches!(c, '>' | '<' | '=' | '!'))?;
    let operator = tail[..op_end].to_string();
    let threshold: f64 = tail[op_end..].trim().parse().ok()?;

    Some(ParsedExpr {
        function,
        duration,
        metric,
        operator,
        threshold,
    })
}
