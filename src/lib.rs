//! Shared library for the Argos monitoring platform.
//!
//! Three independent binaries link against this crate: the collector agent
//! (`argos-agent`), the ingestion & query API (`argos-api`), and the alert
//! engine (`argos-alertd`). They communicate only through the HTTP
//! ingest/query surface and the relational store — nothing here assumes
//! they share a process.

pub mod agent;
pub mod alertd;
pub mod api;
pub mod shared;
pub mod storage;

pub use shared::model::{ActiveAlert, AlertRule, Batch, DataPoint, Sample, Severity};
