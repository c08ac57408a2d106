//! # Data Model
//!
//! The types every other component shares: jobs and resources
//! ([`job`]), hardware topology ([`topology`]), the scope enumeration
//! ([`scope`]), metric configuration ([`metric`]), and the planner/
//! executor's input and output shapes ([`data`]). Archive-specific
//! metadata lives in [`archive`].
//!
//! None of these types hold a reference to another: topology is arrays of
//! ids, not an object graph, and every cross-reference (e.g. "which core
//! does hwthread 3 belong to") is resolved by an explicit lookup method
//! rather than by following a pointer. This keeps the model free of
//! cycles and trivially `Send + Sync`.

pub mod archive;
pub mod data;
pub mod job;
pub mod metric;
pub mod scope;
pub mod topology;

pub use archive::ArchiveMeta;
pub use data::{
    scoped_stats_from_job_data, Aggregation, FlatStats, HostStat, JobData, MetricBundle,
    NodeListResult, Query, ScopedStats, Series, SeriesStats,
};
pub use job::{Job, Resource};
pub use metric::{MetricConfig, MetricOverride, Thresholds};
pub use scope::{AggregationMode, MetricScope};
pub use topology::{AcceleratorId, Group, HwThreadId, Topology};
