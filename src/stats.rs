//! # Statistics & Node-list Variants
//!
//! Three entry points composing the registry, planner, and executor
//! (spec.md §4.6): full per-job time-series data, per-job
//! statistics-only (series dropped, stats kept), and a per-node
//! time-window query across an arbitrary host list with substring
//! filtering and paging.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::executor::execute;
use crate::model::{
    scoped_stats_from_job_data, FlatStats, Job, JobData, MetricScope, NodeListResult, ScopedStats,
};
use crate::planner::{plan_for_job, plan_for_nodes};
use crate::registry::Registry;
use crate::repository::MetricRepository;

fn metric_units_fn<'a>(
    registry: &'a Registry,
    cluster: &'a str,
) -> impl Fn(&str) -> (String, i64) + 'a {
    move |metric: &str| {
        registry
            .get_metric_config(cluster, metric)
            .map(|cfg| (cfg.unit.clone(), cfg.timestep))
            .unwrap_or_else(|| (String::new(), 0))
    }
}

/// Full per-job time-series data at the requested scopes.
pub async fn load_job_data(
    registry: &Registry,
    repo: &dyn MetricRepository,
    job: &Job,
    metrics: &[String],
    scopes: &[MetricScope],
    resolution: Option<i64>,
    cancel: CancellationToken,
) -> Result<(JobData, Option<crate::error::CoreError>)> {
    let (queries, assigned) = plan_for_job(registry, job, metrics, scopes, resolution)?;
    execute(
        repo,
        &job.cluster,
        job.start_time,
        job.end_time(),
        &queries,
        &assigned,
        metric_units_fn(registry, &job.cluster),
        cancel,
    )
    .await
}

/// Same as [`load_job_data`] but the raw `data` vectors are dropped: only
/// per-host avg/min/max and the fan-out `type_id` survive, as a
/// statistics-only dashboard view needs.
pub async fn load_job_stats(
    registry: &Registry,
    repo: &dyn MetricRepository,
    job: &Job,
    metrics: &[String],
    scopes: &[MetricScope],
    resolution: Option<i64>,
    cancel: CancellationToken,
) -> Result<(ScopedStats, Option<crate::error::CoreError>)> {
    let (data, partial) =
        load_job_data(registry, repo, job, metrics, scopes, resolution, cancel).await?;
    Ok((scoped_stats_from_job_data(&data), partial))
}

/// Flattened metric -> host -> stats shape, for callers that don't care
/// about scope at all (always the single scope the caller asked for).
pub async fn load_flat_stats(
    registry: &Registry,
    repo: &dyn MetricRepository,
    job: &Job,
    metrics: &[String],
    scope: MetricScope,
    resolution: Option<i64>,
    cancel: CancellationToken,
) -> Result<(FlatStats, Option<crate::error::CoreError>)> {
    let (scoped, partial) = load_job_stats(
        registry,
        repo,
        job,
        metrics,
        std::slice::from_ref(&scope),
        resolution,
        cancel,
    )
    .await?;

    let mut out: FlatStats = FlatStats::new();
    for (metric, by_scope) in scoped {
        if let Some(hosts) = by_scope.into_values().next() {
            let entry = out.entry(metric).or_default();
            for h in hosts {
                entry.insert(h.hostname, h.stats);
            }
        }
    }
    Ok((out, partial))
}

/// Per-node time-window query across an arbitrary host list with
/// substring filtering, ascending hostname sort, and paging
/// (spec.md §4.6's third entry point).
#[allow(clippy::too_many_arguments)]
pub async fn load_node_list_data(
    registry: &Registry,
    repo: &dyn MetricRepository,
    cluster: &str,
    sub_cluster: Option<&str>,
    hostnames: &[String],
    metrics: &[String],
    scopes: &[MetricScope],
    start_time: i64,
    end_time: i64,
    filter: Option<&str>,
    page: usize,
    page_size: usize,
    resolution: Option<i64>,
    cancel: CancellationToken,
) -> Result<NodeListResult> {
    let mut hosts: Vec<String> = match filter {
        Some(needle) => hostnames
            .iter()
            .filter(|h| h.contains(needle))
            .cloned()
            .collect(),
        None => hostnames.to_vec(),
    };
    hosts.sort();
    hosts.dedup();

    let total_nodes = hosts.len();
    let start_idx = page.saturating_mul(page_size);
    let page_hosts: Vec<String> = hosts
        .into_iter()
        .skip(start_idx)
        .take(page_size)
        .collect();
    let has_next_page = start_idx + page_hosts.len() < total_nodes;

    let (queries, assigned) = plan_for_nodes(
        registry,
        cluster,
        sub_cluster,
        &page_hosts,
        metrics,
        scopes,
        resolution,
    )?;
    let (data, partial) = execute(
        repo,
        cluster,
        start_time,
        end_time,
        &queries,
        &assigned,
        metric_units_fn(registry, cluster),
        cancel,
    )
    .await?;
    if let Some(err) = partial {
        // A node-list scan folds partial failures back into the same
        // error path callers already expect from `load_job_data`; the
        // result is still returned, just logged loudly here since this
        // entry point has no single caller-visible "job" to attach the
        // warning to.
        tracing::warn!(%err, "partial failures while loading node-list data");
    }

    let mut by_host: std::collections::BTreeMap<String, JobData> = std::collections::BTreeMap::new();
    for (metric, by_scope) in data {
        for (scope, bundle) in by_scope {
            for series in bundle.series {
                let host_entry = by_host.entry(series.hostname.clone()).or_default();
                let metric_entry = host_entry.entry(metric.clone()).or_default();
                metric_entry
                    .entry(scope)
                    .or_insert_with(|| crate::model::MetricBundle {
                        unit: bundle.unit.clone(),
                        timestep: bundle.timestep,
                        series: Vec::new(),
                    })
                    .series
                    .push(series);
            }
        }
    }

    Ok(NodeListResult {
        hosts: by_host,
        total_nodes,
        has_next_page,
    })
}
