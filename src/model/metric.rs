//! Per-(cluster, metric) configuration, as loaded from the cluster config
//! file and optionally overridden per sub-cluster.

use serde::{Deserialize, Serialize};

use super::scope::{AggregationMode, MetricScope};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub peak: f64,
    pub normal: f64,
    pub caution: f64,
    pub alert: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    pub native_scope: MetricScope,
    pub timestep: i64,
    pub unit: String,
    pub aggregation: AggregationMode,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
}

/// A sub-cluster override: either drop a metric entirely, or adjust its
/// thresholds while keeping everything else from the cluster-level config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum MetricOverride {
    Remove,
    Adjust { thresholds: Thresholds },
}
