//! # Scope Planner — the core of the core
//!
//! Pure, synchronous, no I/O. Given a sub-cluster's topology, a metric
//! list, a scope list, and either a job's resources or a plain host list,
//! emits a minimal, deterministic list of [`Query`] values plus a
//! parallel list of the scope each query actually produces.
//!
//! The loop nesting order is part of the contract (spec.md §4.4
//! "Determinism"): metrics outer (input order), then requested scopes
//! (input order, deduplicated after coercion), then hosts (input order),
//! then — for fan-out emissions — groups in ascending index order.

use tracing::warn;

use crate::config::SubClusterConfig;
use crate::error::{CoreError, Result};
use crate::model::{Aggregation, AggregationModeWire, Job, MetricConfig, MetricOverride, MetricScope, Query, Topology};
use crate::registry::Registry;

/// `effective = max(native, requested)`, except across the
/// accelerator/CPU axis boundary, which the ordering in spec.md §3
/// leaves undefined (accelerator is "incomparable with the CPU hierarchy
/// except via node"). Crossing that boundary returns `None`, which the
/// caller treats as a silent skip of that one (metric, requested-scope)
/// combination rather than an error — spec.md §9's open question
/// ("accelerator-native metric asked for core scope") resolved as skip,
/// and the symmetric case (CPU-native metric asked for accelerator
/// scope) is resolved the same way for consistency.
fn effective_scope(native: MetricScope, requested: MetricScope) -> Option<MetricScope> {
    use MetricScope::*;
    match (native, requested) {
        (Accelerator, Accelerator) => Some(Accelerator),
        (Accelerator, Node) => Some(Node),
        (Accelerator, _) => None,
        (_, Accelerator) => None,
        _ => Some(native.max(requested)),
    }
}

/// Whether the planner knows how to emit queries for this (native,
/// effective) pair — spec.md §4.4's emission table. A `false` here for a
/// pair that `effective_scope` nonetheless produced is a planner bug:
/// the whole `plan_*` call aborts with `UnhandledScopePair` rather than
/// silently dropping the metric, per spec.md §7's propagation policy.
fn scope_table_allows(native: MetricScope, effective: MetricScope) -> bool {
    use MetricScope::*;
    matches!(
        (native, effective),
        (HardwareThread, HardwareThread)
            | (HardwareThread, Core)
            | (HardwareThread, Socket)
            | (HardwareThread, Node)
            | (Core, Core)
            | (Core, Socket)
            | (Core, Node)
            | (MemoryDomain, MemoryDomain)
            | (MemoryDomain, Node)
            | (Socket, Socket)
            | (Socket, Node)
            | (Node, Node)
            | (Accelerator, Accelerator)
            | (Accelerator, Node)
    )
}

/// Ordered, deduplicated list of effective scopes for one metric, given
/// the requested scopes in input order. Returns `Err` the moment a
/// coerced pair falls outside the emission table.
fn coerce_scopes(native: MetricScope, requested: &[MetricScope]) -> Result<Vec<MetricScope>> {
    let mut out = Vec::new();
    for &r in requested {
        let Some(eff) = effective_scope(native, r) else {
            continue;
        };
        if out.contains(&eff) {
            continue;
        }
        if !scope_table_allows(native, eff) {
            return Err(CoreError::UnhandledScopePair {
                native: native.to_string(),
                effective: eff.to_string(),
            });
        }
        out.push(eff);
    }
    Ok(out)
}

fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let b: std::collections::HashSet<u32> = b.iter().copied().collect();
    let mut out: Vec<u32> = a.iter().copied().filter(|id| b.contains(id)).collect();
    out.sort_unstable();
    out
}

#[allow(clippy::too_many_arguments)]
fn emit_for_host(
    topology: &Topology,
    metric: &str,
    hostname: &str,
    cfg: &MetricConfig,
    effective: MetricScope,
    hw_ids: &[u32],
    acc_ids: &[String],
    resolution: Option<i64>,
    queries: &mut Vec<Query>,
    assigned: &mut Vec<MetricScope>,
) {
    use MetricScope::*;

    let mut push = |ids: Vec<u32>, accel: Vec<String>, agg: Aggregation, type_id: Option<String>| {
        queries.push(Query {
            metric: metric.to_string(),
            hostname: hostname.to_string(),
            aggregation: agg,
            ids,
            accelerator_ids: accel,
            type_id,
            resolution,
        });
        assigned.push(effective);
    };

    let agg_mode = Aggregation::Aggregate(AggregationModeWire::from(cfg.aggregation));

    match (cfg.native_scope, effective) {
        (HardwareThread, HardwareThread) => {
            let mut ids = hw_ids.to_vec();
            ids.sort_unstable();
            for id in ids {
                push(vec![id], vec![], Aggregation::None, Some(id.to_string()));
            }
        }
        (HardwareThread, Core) => {
            for idx in topology.cores_covering(hw_ids) {
                let ids = intersect_sorted(&topology.core[idx], hw_ids);
                push(ids, vec![], agg_mode, Some(idx.to_string()));
            }
        }
        (HardwareThread, Socket) => {
            for idx in topology.sockets_covering(hw_ids) {
                let ids = intersect_sorted(&topology.socket[idx], hw_ids);
                push(ids, vec![], agg_mode, Some(idx.to_string()));
            }
        }
        (HardwareThread, Node) | (Core, Node) | (MemoryDomain, Node) | (Socket, Node) => {
            push(hw_ids.to_vec(), vec![], agg_mode, None);
        }
        (Core, Core) => {
            for idx in topology.cores_covering(hw_ids) {
                let ids = intersect_sorted(&topology.core[idx], hw_ids);
                push(ids, vec![], Aggregation::None, Some(idx.to_string()));
            }
        }
        (Core, Socket) => {
            for idx in topology.sockets_covering(hw_ids) {
                let ids = intersect_sorted(&topology.socket[idx], hw_ids);
                push(ids, vec![], agg_mode, Some(idx.to_string()));
            }
        }
        (MemoryDomain, MemoryDomain) => {
            for idx in topology.memory_domains_covering(hw_ids) {
                let ids = intersect_sorted(&topology.memory_domain[idx], hw_ids);
                push(ids, vec![], Aggregation::None, Some(idx.to_string()));
            }
        }
        (Socket, Socket) => {
            for idx in topology.sockets_covering(hw_ids) {
                let ids = intersect_sorted(&topology.socket[idx], hw_ids);
                push(ids, vec![], Aggregation::None, Some(idx.to_string()));
            }
        }
        (Node, Node) => {
            push(hw_ids.to_vec(), vec![], Aggregation::None, None);
        }
        (Accelerator, Accelerator) => {
            let mut ids = acc_ids.to_vec();
            ids.sort_unstable();
            for id in ids {
                push(vec![], vec![id.clone()], Aggregation::None, Some(id));
            }
        }
        (Accelerator, Node) => {
            push(vec![], acc_ids.to_vec(), agg_mode, None);
        }
        _ => unreachable!(
            "scope_table_allows should have rejected ({:?}, {:?}) before emission",
            cfg.native_scope, effective
        ),
    }
}

/// Should this metric be skipped entirely for this planning call?
/// Handles configuration lookup, the sub-cluster `Remove` override, and
/// the accelerator-with-no-accelerators rule (spec.md §4.4).
fn metric_config_for<'a>(
    registry: &'a Registry,
    cluster: &str,
    sub: &SubClusterConfig,
    metric: &str,
    has_accelerators: bool,
) -> Option<&'a MetricConfig> {
    let cfg = match registry.get_metric_config(cluster, metric) {
        Some(cfg) => cfg,
        None => {
            warn!(metric, cluster, "metric not configured, skipping");
            return None;
        }
    };
    if let Some(MetricOverride::Remove) = registry.get_metric_override(cluster, &sub.name, metric) {
        warn!(metric, sub_cluster = %sub.name, "metric removed for sub-cluster, skipping");
        return None;
    }
    if cfg.native_scope == MetricScope::Accelerator && !has_accelerators {
        warn!(metric, "accelerator metric skipped: no accelerators present");
        return None;
    }
    Some(cfg)
}

/// Plan the queries needed to satisfy a per-job request (spec.md §4.4's
/// "per-host emission").
pub fn plan_for_job(
    registry: &Registry,
    job: &Job,
    metrics: &[String],
    scopes: &[MetricScope],
    resolution: Option<i64>,
) -> Result<(Vec<Query>, Vec<MetricScope>)> {
    let sub = registry.assign_sub_cluster(job)?;
    let mut queries = Vec::new();
    let mut assigned = Vec::new();
    let has_accelerators = job.num_accelerators > 0;

    for res in &job.resources {
        if let Some(hw_threads) = &res.hw_threads {
            if !sub.topology.contains_all(hw_threads) {
                return Err(CoreError::ResourcesOutsideTopology {
                    host: res.hostname.clone(),
                    sub: sub.name.clone(),
                });
            }
        }
    }

    for metric in metrics {
        let Some(cfg) = metric_config_for(registry, &job.cluster, sub, metric, has_accelerators)
        else {
            continue;
        };
        let effective_list = coerce_scopes(cfg.native_scope, scopes)?;
        for effective in effective_list {
            for res in &job.resources {
                let hw_ids = res
                    .hw_threads
                    .clone()
                    .unwrap_or_else(|| sub.topology.node.clone());
                let acc_ids = res
                    .accelerators
                    .clone()
                    .unwrap_or_else(|| sub.topology.accelerators.clone());
                emit_for_host(
                    &sub.topology,
                    metric,
                    &res.hostname,
                    cfg,
                    effective,
                    &hw_ids,
                    &acc_ids,
                    resolution,
                    &mut queries,
                    &mut assigned,
                );
            }
        }
    }
    Ok((queries, assigned))
}

/// Plan queries for an arbitrary (cluster, sub-cluster, host-list)
/// window — spec.md §4.4's "node planning variant": hardware-thread ids
/// always come from the sub-cluster's full node set, and the sub-cluster
/// may be resolved per host when not supplied explicitly.
pub fn plan_for_nodes(
    registry: &Registry,
    cluster: &str,
    sub_cluster: Option<&str>,
    hostnames: &[String],
    metrics: &[String],
    scopes: &[MetricScope],
    resolution: Option<i64>,
) -> Result<(Vec<Query>, Vec<MetricScope>)> {
    let mut queries = Vec::new();
    let mut assigned = Vec::new();

    // Resolve (sub-cluster) per host up front so the metric/scope loops
    // below don't repeat the lookup, but keep host order intact.
    let mut host_subs = Vec::with_capacity(hostnames.len());
    for host in hostnames {
        let sub = match sub_cluster {
            Some(name) => registry.get_sub_cluster(cluster, name)?,
            None => registry.get_sub_cluster_by_node(cluster, host)?,
        };
        host_subs.push((host, sub));
    }

    for metric in metrics {
        // A metric may be configured differently per sub-cluster only via
        // removal; native scope/aggregation are cluster-wide, so use the
        // first host's sub-cluster purely to decide whether to skip
        // before iterating — per-host removal is still re-checked below.
        let Some(first_sub) = host_subs.first().map(|(_, s)| *s) else {
            continue;
        };
        let any_accelerators = host_subs
            .iter()
            .any(|(_, s)| !s.topology.accelerators.is_empty());
        let Some(cfg) = metric_config_for(registry, cluster, first_sub, metric, any_accelerators)
        else {
            continue;
        };
        let effective_list = coerce_scopes(cfg.native_scope, scopes)?;

        for effective in &effective_list {
            for (host, sub) in &host_subs {
                if let Some(MetricOverride::Remove) =
                    registry.get_metric_override(cluster, &sub.name, metric)
                {
                    continue;
                }
                let hw_ids = &sub.topology.node;
                let acc_ids = &sub.topology.accelerators;
                emit_for_host(
                    &sub.topology,
                    metric,
                    host,
                    cfg,
                    *effective,
                    hw_ids,
                    acc_ids,
                    resolution,
                    &mut queries,
                    &mut assigned,
                );
            }
        }
    }
    Ok((queries, assigned))
}

#[cfg(test)]
mod tests;
