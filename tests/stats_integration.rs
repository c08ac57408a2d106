//! Integration coverage for the C6 statistics/node-list composition
//! layer, dispatched against the in-memory test-double repository so no
//! network access is needed.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use metricgrid::config::{ArchiveConfig, ClusterConfig, Config, RepositoryConfig, SubClusterConfig};
use metricgrid::model::{AggregationMode, Job, MetricConfig, MetricScope, Resource, Topology};
use metricgrid::registry::Registry;
use metricgrid::repository::test_double::TestRepository;
use metricgrid::stats::{load_job_stats, load_node_list_data};

fn flat_topology() -> Topology {
    Topology {
        node: vec![0, 1, 2, 3],
        core: vec![vec![0, 1], vec![2, 3]],
        socket: vec![vec![0, 1, 2, 3]],
        memory_domain: vec![],
        accelerators: vec![],
    }
}

fn registry() -> Registry {
    let cfg = Config {
        clusters: vec![ClusterConfig {
            name: "c1".into(),
            metrics: vec![MetricConfig {
                name: "flops_any".into(),
                native_scope: MetricScope::Node,
                timestep: 60,
                unit: "flops".into(),
                aggregation: AggregationMode::Sum,
                thresholds: None,
            }],
            sub_clusters: vec![SubClusterConfig {
                name: "sc1".into(),
                node_list: "n[001-010]".into(),
                topology: flat_topology(),
                metric_overrides: HashMap::new(),
            }],
            repository: RepositoryConfig {
                kind: "test".into(),
                fields: serde_json::json!({}),
            },
            archive: Some(ArchiveConfig {
                kind: "file".into(),
                fields: serde_json::json!({"root": "/tmp/metricgrid-stats-e2e"}),
            }),
        }],
    };
    Registry::new(cfg).unwrap()
}

#[tokio::test]
async fn load_job_stats_drops_raw_series_but_keeps_avg_min_max() {
    let reg = registry();
    let repo = TestRepository::default().with_series("flops_any", "n001", vec![10.0, 20.0, 30.0]);
    let job = Job {
        job_id: 1,
        cluster: "c1".into(),
        sub_cluster: Some("sc1".into()),
        start_time: 0,
        duration: 60,
        num_nodes: 1,
        num_accelerators: 0,
        resources: vec![Resource {
            hostname: "n001".into(),
            hw_threads: None,
            accelerators: None,
        }],
    };
    let (scoped, partial) = load_job_stats(
        &reg,
        &repo,
        &job,
        &["flops_any".to_string()],
        &[MetricScope::Node],
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(partial.is_none());
    let hosts = &scoped["flops_any"][&MetricScope::Node];
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].hostname, "n001");
    assert_eq!(hosts[0].stats.avg, 20.0);
}

#[tokio::test]
async fn load_node_list_data_filters_sorts_and_pages() {
    let reg = registry();
    let repo = TestRepository::default();
    let hostnames: Vec<String> = vec!["n003", "n001", "n010", "n002"]
        .into_iter()
        .map(String::from)
        .collect();

    let page0 = load_node_list_data(
        &reg,
        &repo,
        "c1",
        Some("sc1"),
        &hostnames,
        &["flops_any".to_string()],
        &[MetricScope::Node],
        0,
        60,
        None,
        0,
        2,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(page0.total_nodes, 4);
    assert!(page0.has_next_page);
    let mut hosts: Vec<&str> = page0.hosts.keys().map(String::as_str).collect();
    hosts.sort();
    assert_eq!(hosts, vec!["n001", "n002"]);

    let page1 = load_node_list_data(
        &reg,
        &repo,
        "c1",
        Some("sc1"),
        &hostnames,
        &["flops_any".to_string()],
        &[MetricScope::Node],
        0,
        60,
        None,
        1,
        2,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(!page1.has_next_page);
    let mut hosts1: Vec<&str> = page1.hosts.keys().map(String::as_str).collect();
    hosts1.sort();
    assert_eq!(hosts1, vec!["n003", "n010"]);
}

#[tokio::test]
async fn load_node_list_data_applies_substring_filter() {
    let reg = registry();
    let repo = TestRepository::default();
    let hostnames: Vec<String> = vec!["gpu01", "gpu02", "cpu01"]
        .into_iter()
        .map(String::from)
        .collect();

    let filtered = load_node_list_data(
        &reg,
        &repo,
        "c1",
        Some("sc1"),
        &hostnames,
        &["flops_any".to_string()],
        &[MetricScope::Node],
        0,
        60,
        Some("gpu"),
        0,
        10,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(filtered.total_nodes, 2);
    assert!(!filtered.has_next_page);
}
