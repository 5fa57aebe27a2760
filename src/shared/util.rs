//! Time parsing and numeric aggregation shared by the API's range-query
//! parameter handling and the alert engine's evaluator.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Parse a relative time expression of the form `-<N><unit>`, where unit is
/// one of `s`, `m`, `h`, `d`. `d` is handled explicitly as a multiple of
/// 86,400 seconds since it is not a unit every duration parser accepts;
/// the other three are simple multiples of seconds/minutes/hours.
///
/// Returns `None` if the string does not start with `-` or the numeric
/// part / unit cannot be parsed.
pub fn parse_relative_duration(input: &str) -> Option<ChronoDuration> {
    let rest = input.strip_prefix('-')?;
    if rest.is_empty() {
        return None;
    }

    let unit = rest.chars().last()?;
    let digits = &rest[..rest.len() - unit.len_utf8()];
    let n: i64 = digits.parse().ok()?;

    match unit {
        's' => Some(ChronoDuration::seconds(n)),
        'm' => Some(ChronoDuration::minutes(n)),
        'h' => Some(ChronoDuration::hours(n)),
        'd' => Some(ChronoDuration::seconds(n * 86_400)),
        _ => None,
    }
}

/// Parse a time query parameter that is either an RFC3339 absolute
/// timestamp or a relative `-Nunit` expression resolved against `now`.
pub fn parse_time_param(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if input.starts_with('-') {
        return parse_relative_duration(input).map(|d| now - d);
    }
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Arithmetic mean. Zero on an empty slice — callers treat that as "never
/// triggered" rather than an error.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population z-score of `current` against `values` (population variance,
/// divided by N not N-1). Zero if `values` is empty or its population
/// standard deviation is zero.
pub fn zscore(current: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    let sigma = variance.sqrt();

    if sigma == 0.0 {
        return 0.0;
    }

    (current - mu) / sigma
}

/// Format a `chrono::Duration` as a cascading `Xd Yh Zm` string, dropping
/// leading zero components (matching the reference implementation's
/// uptime display).
pub fn format_uptime(d: ChronoDuration) -> String {
    let total_secs = d.num_seconds().max(0);
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
