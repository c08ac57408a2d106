//! Output shapes: Job Data, Metric Bundle, Series, Scoped Statistics, and
//! the Node-list Result, plus the `Query` type the planner emits and
//! repositories consume.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::scope::{AggregationMode, MetricScope};
use super::topology::HwThreadId;

/// How a repository should combine the enumerated ids of a fan-out query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// One series per id (`enum ..., non-agg` in the planner's table).
    None,
    /// One series, summed or averaged across all ids (the metric's
    /// configured `AggregationMode`).
    Aggregate(AggregationModeWire),
}

/// Serializable mirror of `AggregationMode` so `Aggregation` round-trips
/// through the wire formats in spec.md §6 without importing `model::scope`
/// into every repository module's request builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationModeWire {
    Sum,
    Avg,
}

impl From<AggregationMode> for AggregationModeWire {
    fn from(m: AggregationMode) -> Self {
        match m {
            AggregationMode::Sum => AggregationModeWire::Sum,
            AggregationMode::Avg => AggregationModeWire::Avg,
        }
    }
}

/// One planner-emitted backend query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub metric: String,
    pub hostname: String,
    pub aggregation: Aggregation,
    /// Which hardware-thread ids (or accelerator ids, encoded as their
    /// string form) this query covers. Empty for a plain per-host node
    /// query where there is nothing to enumerate.
    pub ids: Vec<HwThreadId>,
    pub accelerator_ids: Vec<String>,
    /// Present for fan-out queries: which core/socket/memory-domain/
    /// accelerator index this single query's result tags onto the
    /// resulting series (`type_id` below).
    pub type_id: Option<String>,
    pub resolution: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl SeriesStats {
    /// Naive avg/min/max over a raw data vector, propagating `NaN`
    /// rather than skipping it: a repository's own stats computation
    /// reflects exactly what it got back over the wire. Final "any stat
    /// NaN -> zero all three" sanitization is the executor's job
    /// (spec.md §4.5/§8 property 8), not the repository's.
    pub fn from_raw(data: &[f64]) -> Self {
        if data.is_empty() {
            return SeriesStats::default();
        }
        let avg = data.iter().sum::<f64>() / data.len() as f64;
        let (min, max) = if data.iter().any(|v| v.is_nan()) {
            (f64::NAN, f64::NAN)
        } else {
            (
                data.iter().cloned().fold(f64::INFINITY, f64::min),
                data.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            )
        };
        SeriesStats { avg, min, max }
    }

    /// spec.md §4.5/§8 property 8: if any of avg/min/max is NaN, all
    /// three become zero; the raw data vector is untouched.
    pub fn sanitize(&mut self) {
        if self.avg.is_nan() || self.min.is_nan() || self.max.is_nan() {
            self.avg = 0.0;
            self.min = 0.0;
            self.max = 0.0;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub hostname: String,
    pub type_id: Option<String>,
    pub stats: SeriesStats,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricBundle {
    pub unit: String,
    pub timestep: i64,
    pub series: Vec<Series>,
}

/// metric-name -> scope -> bundle.
pub type JobData = BTreeMap<String, BTreeMap<MetricScope, MetricBundle>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostStat {
    pub hostname: String,
    pub type_id: Option<String>,
    pub stats: SeriesStats,
}

/// metric-name -> scope -> per-host stats.
pub type ScopedStats = BTreeMap<String, BTreeMap<MetricScope, Vec<HostStat>>>;

/// Flat metric -> host -> stats shape returned by `load_stats`.
pub type FlatStats = BTreeMap<String, BTreeMap<String, SeriesStats>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeListResult {
    pub hosts: BTreeMap<String, JobData>,
    pub total_nodes: usize,
    pub has_next_page: bool,
}

/// Drop empty (metric, scope) entries and empty-metric entries so callers
/// can use a simple "no data" check (spec.md §4.5, end of batch scan).
pub fn prune_empty(data: &mut JobData) {
    data.retain(|_, scopes| {
        scopes.retain(|_, bundle| !bundle.series.is_empty());
        !scopes.is_empty()
    });
}

/// Drop each series' raw `data` vector, keeping only its hostname,
/// `type_id`, and stats — the shape a statistics-only view needs, shared
/// by `stats::load_job_stats` and the archive backends' `load_job_stats`.
pub fn scoped_stats_from_job_data(data: &JobData) -> ScopedStats {
    let mut out: ScopedStats = ScopedStats::new();
    for (metric, by_scope) in data {
        for (scope, bundle) in by_scope {
            let stats: Vec<HostStat> = bundle
                .series
                .iter()
                .map(|s| HostStat {
                    hostname: s.hostname.clone(),
                    type_id: s.type_id.clone(),
                    stats: s.stats.clone(),
                })
                .collect();
            out.entry(metric.clone()).or_default().insert(*scope, stats);
        }
    }
    out
}
