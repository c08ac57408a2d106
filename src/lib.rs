//! # metricgrid
//!
//! Metric-data query core for an HPC job-monitoring backend. Given a job
//! (cluster/sub-cluster/time window/hardware resources) and a set of
//! requested metrics and scopes, this crate plans a minimal set of
//! backend queries that respect hardware topology and each metric's
//! native aggregation scope, dispatches them to a pluggable time-series
//! repository (or an archive backend for finished jobs), and reshapes
//! the results into a scoped, per-metric, per-host structure.
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`config`] | Loads cluster/sub-cluster/repository/archive configuration from TOML. |
//! | [`model`] | Shared types: jobs, topology, metric scope, query/series shapes. |
//! | [`registry`] | Process-wide topology & metric-configuration lookup, built once. |
//! | [`planner`] | Pure scope-coercion and query-emission logic. No I/O. |
//! | [`repository`] | The pluggable time-series backend trait and its implementations. |
//! | [`archive`] | Storage for finished jobs: metadata plus a final data snapshot. |
//! | [`executor`] | Dispatches planned queries, reshapes responses, aggregates partial failures. |
//! | [`stats`] | Composes registry + planner + executor into the three caller-facing entry points. |
//! | [`error`] | The crate-wide error enum and `Result` alias. |

pub mod archive;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod planner;
pub mod registry;
pub mod repository;
pub mod stats;

pub use error::{CoreError, Result};
