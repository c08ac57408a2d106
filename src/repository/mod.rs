//! # Metric Repository
//!
//! The pluggable time-series backend a [`crate::executor`] dispatches
//! [`crate::model::Query`] values to. One trait, four implementations
//! selected by `RepositoryConfig.kind`: columnar-JSON, Flux, PromQL, and
//! an in-memory test double used by this crate's own test suite.

pub mod flux;
pub mod json;
pub mod promql;
pub mod test_double;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::model::{Query, Series};

#[async_trait]
pub trait MetricRepository: Send + Sync {
    /// Run one batch of queries for a single job window and return one
    /// `Series` per input `Query`, in the same order — callers zip this
    /// back against the `assigned_scopes` list the planner produced.
    /// A repository returns `Err` only for whole-batch failures
    /// (`BackendUnavailable`/`Decode`); a per-(metric,host) failure is
    /// surfaced through the executor's partial-error aggregation, not
    /// here.
    async fn load_data(
        &self,
        cluster: &str,
        start_time: i64,
        end_time: i64,
        queries: &[Query],
    ) -> Result<Vec<Result<Series>>>;
}

pub fn build(config: &RepositoryConfig) -> Result<Arc<dyn MetricRepository>> {
    match config.kind.as_str() {
        "json" => Ok(Arc::new(json::JsonRepository::from_config(config)?)),
        "flux" => Ok(Arc::new(flux::FluxRepository::from_config(config)?)),
        "promql" => Ok(Arc::new(promql::PromqlRepository::from_config(config)?)),
        "test" => Ok(Arc::new(test_double::TestRepository::default())),
        other => Err(crate::error::CoreError::Config(format!(
            "unknown repository kind: {other}"
        ))),
    }
}
