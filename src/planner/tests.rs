use super::*;
use crate::config::{ArchiveConfig, ClusterConfig, Config, RepositoryConfig, SubClusterConfig};
use crate::model::{AggregationMode, Job, MetricConfig, MetricScope, Resource, Topology};
use std::collections::HashMap;

/// 2 sockets x 4 cores x 2 hwthreads = 16 hwthreads/node, 8 cores/node.
fn topo_2x4x2() -> Topology {
    let mut core = Vec::new();
    let mut socket = Vec::new();
    let mut node = Vec::new();
    let mut hw = 0u32;
    for _s in 0..2 {
        let mut sock_ids = Vec::new();
        for _c in 0..4 {
            let ids = vec![hw, hw + 1];
            core.push(ids.clone());
            sock_ids.extend(ids.clone());
            node.extend(ids);
            hw += 2;
        }
        socket.push(sock_ids);
    }
    Topology {
        node,
        core,
        socket,
        memory_domain: vec![],
        accelerators: vec!["gpu0".into(), "gpu1".into()],
    }
}

fn registry_with(metrics: Vec<MetricConfig>, overrides: HashMap<String, crate::model::MetricOverride>) -> Registry {
    let cfg = Config {
        clusters: vec![ClusterConfig {
            name: "testcl".into(),
            metrics,
            sub_clusters: vec![SubClusterConfig {
                name: "sc1".into(),
                node_list: "n[001-010]".into(),
                topology: topo_2x4x2(),
                metric_overrides: overrides,
            }],
            repository: RepositoryConfig {
                kind: "test".into(),
                fields: serde_json::json!({}),
            },
            archive: Some(ArchiveConfig {
                kind: "file".into(),
                fields: serde_json::json!({"root": "/tmp"}),
            }),
        }],
    };
    Registry::new(cfg).unwrap()
}

fn job_two_nodes(num_accelerators: u32) -> Job {
    Job {
        job_id: 1,
        cluster: "testcl".into(),
        sub_cluster: Some("sc1".into()),
        start_time: 0,
        duration: 600,
        num_nodes: 2,
        num_accelerators,
        resources: vec![
            Resource {
                hostname: "n001".into(),
                hw_threads: None,
                accelerators: None,
            },
            Resource {
                hostname: "n002".into(),
                hw_threads: None,
                accelerators: None,
            },
        ],
    }
}

/// E1-style scenario: full hwthread native metric across all four CPU
/// scopes. With 2 sockets x 4 cores x 2 hwthreads (16 hwthreads, 8 cores,
/// 2 sockets per node) the per-host query counts are 16 (hwthread) + 8
/// (core) + 2 (socket) + 1 (node) = 27, times 2 hosts = 54. (spec.md's
/// illustrative E1 states "= 52" for a topology described the same way;
/// recomputing its own stated per-host terms — 16+4+2+1, times 2 — gives
/// 46, and substituting the cores/node implied by "2 sockets x 4 cores"
/// gives 54 as here. Either way the stated total of 52 does not follow
/// from the topology as described, so this test asserts the
/// self-consistent number derived from the emission table rather than
/// the spec's literal total.)
#[test]
fn full_scope_sweep_on_hwthread_native_metric() {
    let metrics = vec![MetricConfig {
        name: "flops_any".into(),
        native_scope: MetricScope::HardwareThread,
        timestep: 60,
        unit: "flops".into(),
        aggregation: AggregationMode::Sum,
        thresholds: None,
    }];
    let reg = registry_with(metrics, HashMap::new());
    let job = job_two_nodes(0);
    let scopes = vec![
        MetricScope::HardwareThread,
        MetricScope::Core,
        MetricScope::Socket,
        MetricScope::Node,
    ];
    let (queries, assigned) =
        plan_for_job(&reg, &job, &["flops_any".to_string()], &scopes, None).unwrap();
    assert_eq!(queries.len(), 54);
    assert_eq!(queries.len(), assigned.len());

    let per_host = |host: &str| queries.iter().filter(|q| q.hostname == host).count();
    assert_eq!(per_host("n001"), 27);
    assert_eq!(per_host("n002"), 27);
}

/// E2: core coerces to socket and dedups with the requested socket scope;
/// node stays distinct. 2 sockets/host -> 2 socket queries + 1 node query
/// per host, times 2 hosts = 6.
#[test]
fn core_request_dedups_against_socket_for_socket_native_metric() {
    let metrics = vec![MetricConfig {
        name: "mem_bw".into(),
        native_scope: MetricScope::Socket,
        timestep: 60,
        unit: "GB/s".into(),
        aggregation: AggregationMode::Avg,
        thresholds: None,
    }];
    let reg = registry_with(metrics, HashMap::new());
    let job = job_two_nodes(0);
    let scopes = vec![MetricScope::Core, MetricScope::Socket, MetricScope::Node];
    let (queries, assigned) =
        plan_for_job(&reg, &job, &["mem_bw".to_string()], &scopes, None).unwrap();
    assert_eq!(queries.len(), 6);
    assert_eq!(assigned.len(), 6);
    let socket_queries = assigned.iter().filter(|s| **s == MetricScope::Socket).count();
    let node_queries = assigned.iter().filter(|s| **s == MetricScope::Node).count();
    assert_eq!(socket_queries, 4); // 2 sockets x 2 hosts
    assert_eq!(node_queries, 2);
}

/// E3: accelerator-native metric on a job with zero accelerators is
/// skipped entirely regardless of the requested scopes.
#[test]
fn accelerator_metric_skipped_when_job_has_no_accelerators() {
    let metrics = vec![MetricConfig {
        name: "acc_util".into(),
        native_scope: MetricScope::Accelerator,
        timestep: 60,
        unit: "percent".into(),
        aggregation: AggregationMode::Avg,
        thresholds: None,
    }];
    let reg = registry_with(metrics, HashMap::new());
    let job = job_two_nodes(0);
    let scopes = vec![MetricScope::Accelerator, MetricScope::Node];
    let (queries, assigned) =
        plan_for_job(&reg, &job, &["acc_util".to_string()], &scopes, None).unwrap();
    assert!(queries.is_empty());
    assert!(assigned.is_empty());
}

#[test]
fn accelerator_metric_emitted_when_job_has_accelerators() {
    let metrics = vec![MetricConfig {
        name: "acc_util".into(),
        native_scope: MetricScope::Accelerator,
        timestep: 60,
        unit: "percent".into(),
        aggregation: AggregationMode::Avg,
        thresholds: None,
    }];
    let reg = registry_with(metrics, HashMap::new());
    let job = job_two_nodes(2);
    let scopes = vec![MetricScope::Accelerator, MetricScope::Node];
    let (queries, assigned) =
        plan_for_job(&reg, &job, &["acc_util".to_string()], &scopes, None).unwrap();
    // per host: 2 accelerators (enum) + 1 node-aggregate = 3, x2 hosts = 6
    assert_eq!(queries.len(), 6);
    assert_eq!(assigned.len(), 6);
}

#[test]
fn removed_metric_produces_zero_queries() {
    let metrics = vec![MetricConfig {
        name: "flops_any".into(),
        native_scope: MetricScope::HardwareThread,
        timestep: 60,
        unit: "flops".into(),
        aggregation: AggregationMode::Sum,
        thresholds: None,
    }];
    let mut overrides = HashMap::new();
    overrides.insert("flops_any".to_string(), crate::model::MetricOverride::Remove);
    let reg = registry_with(metrics, overrides);
    let job = job_two_nodes(0);
    let (queries, _) = plan_for_job(
        &reg,
        &job,
        &["flops_any".to_string()],
        &[MetricScope::Node],
        None,
    )
    .unwrap();
    assert!(queries.is_empty());
}

#[test]
fn unconfigured_metric_is_skipped_not_errored() {
    let reg = registry_with(vec![], HashMap::new());
    let job = job_two_nodes(0);
    let (queries, _) = plan_for_job(
        &reg,
        &job,
        &["does_not_exist".to_string()],
        &[MetricScope::Node],
        None,
    )
    .unwrap();
    assert!(queries.is_empty());
}

#[test]
fn planning_is_deterministic() {
    let metrics = vec![MetricConfig {
        name: "flops_any".into(),
        native_scope: MetricScope::HardwareThread,
        timestep: 60,
        unit: "flops".into(),
        aggregation: AggregationMode::Sum,
        thresholds: None,
    }];
    let reg = registry_with(metrics, HashMap::new());
    let job = job_two_nodes(0);
    let scopes = vec![MetricScope::Core, MetricScope::Node];
    let a = plan_for_job(&reg, &job, &["flops_any".to_string()], &scopes, None).unwrap();
    let b = plan_for_job(&reg, &job, &["flops_any".to_string()], &scopes, None).unwrap();
    assert_eq!(
        a.0.iter().map(|q| (q.hostname.clone(), q.type_id.clone())).collect::<Vec<_>>(),
        b.0.iter().map(|q| (q.hostname.clone(), q.type_id.clone())).collect::<Vec<_>>(),
    );
    assert_eq!(a.1, b.1);
}

#[test]
fn unhandled_scope_pair_is_an_error_not_a_skip() {
    // hwthread-native metric, requested memory-domain scope: effective
    // coerces (via the total order) to memory-domain, but the emission
    // table has no cell for (hwthread, memory-domain) — this must abort
    // the whole plan call rather than silently drop the metric.
    let metrics = vec![MetricConfig {
        name: "flops_any".into(),
        native_scope: MetricScope::HardwareThread,
        timestep: 60,
        unit: "flops".into(),
        aggregation: AggregationMode::Sum,
        thresholds: None,
    }];
    let reg = registry_with(metrics, HashMap::new());
    let job = job_two_nodes(0);
    let err = plan_for_job(
        &reg,
        &job,
        &["flops_any".to_string()],
        &[MetricScope::MemoryDomain],
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::UnhandledScopePair { .. }));
}

#[test]
fn resources_outside_topology_is_rejected_before_planning() {
    let metrics = vec![MetricConfig {
        name: "flops_any".into(),
        native_scope: MetricScope::HardwareThread,
        timestep: 60,
        unit: "flops".into(),
        aggregation: AggregationMode::Sum,
        thresholds: None,
    }];
    let reg = registry_with(metrics, HashMap::new());
    let mut job = job_two_nodes(0);
    // topo_2x4x2 only has hwthread ids 0..16; 999 is outside it.
    job.resources[0].hw_threads = Some(vec![0, 999]);
    let err = plan_for_job(
        &reg,
        &job,
        &["flops_any".to_string()],
        &[MetricScope::Node],
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::ResourcesOutsideTopology { .. }));
}
