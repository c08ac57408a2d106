//! Error kinds shared by every component of the query core.
//!
//! One enum covers configuration, registry, planner, and backend failures
//! so callers can match on a stable set of kinds instead of parsing
//! messages. See `SPEC_FULL.md` §7 for the propagation policy: config and
//! `Unknown*` variants abort before a batch is dispatched, `PartialSeries`
//! is returned alongside the data it accompanies, and `BackendUnavailable`
//! / `Decode` abort the whole batch.

use std::fmt;

/// One (metric, host) failure inside an otherwise-successful batch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PartialError {
    pub metric: String,
    pub host: String,
    pub message: String,
}

impl fmt::Display for PartialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "metric={} host={}: {}",
            self.metric, self.host, self.message
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("unknown sub-cluster {sub} in cluster {cluster}")]
    UnknownSubCluster { cluster: String, sub: String },

    #[error("no sub-cluster matches host {host} in cluster {cluster}")]
    NoMatchingSubCluster { cluster: String, host: String },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unsupported scope {scope} for metric {metric}")]
    UnsupportedScope { metric: String, scope: String },

    #[error("unhandled (native, effective) scope pair: ({native}, {effective})")]
    UnhandledScopePair { native: String, effective: String },

    #[error("invalid node-list syntax: {0}")]
    InvalidNodeList(String),

    #[error("host {host} requests hwthread ids outside sub-cluster {sub}'s topology")]
    ResourcesOutsideTopology { host: String, sub: String },

    #[error("{} series failed in this batch: {}", .0.len(), join_partial_errors(.0))]
    PartialSeries(Vec<PartialError>),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("archive missing job")]
    ArchiveMissing,

    #[error("unsupported archive version: have {have}, need {need}")]
    UnsupportedArchiveVersion { have: u32, need: u32 },

    #[error("cancelled")]
    Cancelled,
}

fn join_partial_errors(errors: &[PartialError]) -> String {
    errors
        .iter()
        .map(PartialError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::BackendUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::BackendUnavailable(e.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(e: toml::de::Error) -> Self {
        CoreError::Config(e.to_string())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::BackendUnavailable(e.to_string())
    }
}
