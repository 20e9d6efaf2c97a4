/**
 * SOURCES - Capability used to query one Home Assistant instance
 *
 * ROLE :
 * Defines the seam between the aggregator and whatever answers "where is
 * person X" and "which zones exist" for one instance.
 *
 * OPERATION :
 * - SourceConnector = opens a client for a SourceRef (auth check included)
 * - SourceClient = per-instance queries (status of one person, list of zones)
 * - SourceError = failure kind, distinguishable from an empty success
 *
 * IMPLEMENTATIONS :
 * - home_assistant : REST API over reqwest
 * - mock : in-memory, scripted (demo mode + tests)
 */

pub mod home_assistant;
pub mod mock;

use crate::models::SourceRef;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Failure of a source operation. `Clone` so it can live in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("{0}")]
    Request(String),
    #[error("timeout")]
    Timeout,
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            SourceError::Status { status: status.as_u16(), message: e.to_string() }
        } else {
            SourceError::Request(e.to_string())
        }
    }
}

/// Raw answer for one person: the status literal and an optional picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: String,
    pub image: Option<String>,
}

/// Opens clients. One connector is shared by every source of a poll cycle.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn open(&self, source: &SourceRef) -> Result<Box<dyn SourceClient>, SourceError>;
}

/// An opened, authenticated session on one instance.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn get_status(&self, subject_id: &str) -> Result<StatusReport, SourceError>;

    async fn list_categories(&self) -> Result<BTreeSet<String>, SourceError>;
}
