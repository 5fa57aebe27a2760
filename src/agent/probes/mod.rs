//! One isolated measurement pass per target, producing the samples for
//! one probe family.

pub mod dns;
pub mod http;
pub mod icmp;
pub mod smtp;
pub mod sql;

use async_trait::async_trait;

use crate::shared::model::Sample;

/// A single probe target. `collect` never returns an `Err` — a failed
/// measurement is still a measurement (`*_up = 0`), not an error.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn collect(&self) -> Vec<Sample>;
}

pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
