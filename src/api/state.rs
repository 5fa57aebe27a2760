//! Shared state passed to every API handler: just the storage handle and
//! the process start time (for uptime reporting).

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::storage::Storage;

#[derive(Clone)]
pub struct ApiState {
    pub storage: Arc<dyn Storage>,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            started_at: Utc::now(),
        }
    }
}
