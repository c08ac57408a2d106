//! # Topology & Config Registry
//!
//! Process-wide, read-only after construction. Holds, per cluster, the
//! sub-cluster topologies and per-metric configuration loaded at boot
//! ([`crate::config::Config`]). Concurrent readers need no synchronization:
//! a `Registry` is built once and handed out as `Arc<Registry>`, the same
//! way the teacher hands out its `Arc<Fleet>` — except there is no lock
//! here, since nothing ever writes to it again.

pub mod nodelist;

use std::collections::HashMap;

use crate::config::{ClusterConfig, Config, SubClusterConfig};
use crate::error::{CoreError, Result};
use crate::model::{Job, MetricConfig, MetricOverride};
use nodelist::NodeList;

struct SubClusterEntry {
    config: SubClusterConfig,
    node_list: NodeList,
}

pub struct Registry {
    clusters: HashMap<String, ClusterConfig>,
    node_lists: HashMap<(String, String), NodeList>,
}

impl Registry {
    pub fn new(config: Config) -> Result<Self> {
        let mut clusters = HashMap::new();
        let mut node_lists = HashMap::new();
        for cluster in config.clusters {
            for sub in &cluster.sub_clusters {
                let nl = NodeList::parse(&sub.node_list)?;
                node_lists.insert((cluster.name.clone(), sub.name.clone()), nl);
            }
            clusters.insert(cluster.name.clone(), cluster);
        }
        Ok(Registry {
            clusters,
            node_lists,
        })
    }

    pub fn get_cluster(&self, cluster: &str) -> Result<&ClusterConfig> {
        self.clusters
            .get(cluster)
            .ok_or_else(|| CoreError::UnknownCluster(cluster.to_string()))
    }

    pub fn get_sub_cluster(&self, cluster: &str, sub: &str) -> Result<&SubClusterConfig> {
        let c = self.get_cluster(cluster)?;
        c.sub_clusters
            .iter()
            .find(|s| s.name == sub)
            .ok_or_else(|| CoreError::UnknownSubCluster {
                cluster: cluster.to_string(),
                sub: sub.to_string(),
            })
    }

    /// `nil` (here: `None`) if the metric isn't configured at all for this
    /// cluster; the sub-cluster's `Remove` override is applied by the
    /// planner, not here, since the planner needs to log the skip with
    /// the metric's name.
    pub fn get_metric_config(&self, cluster: &str, metric: &str) -> Option<&MetricConfig> {
        let c = self.clusters.get(cluster)?;
        c.metrics.iter().find(|m| m.name == metric)
    }

    pub fn get_metric_override(
        &self,
        cluster: &str,
        sub: &str,
        metric: &str,
    ) -> Option<&MetricOverride> {
        let sc = self.get_sub_cluster(cluster, sub).ok()?;
        sc.metric_overrides.get(metric)
    }

    pub fn get_sub_cluster_by_node(&self, cluster: &str, host: &str) -> Result<&SubClusterConfig> {
        let c = self.get_cluster(cluster)?;
        for sub in &c.sub_clusters {
            if let Some(nl) = self.node_lists.get(&(cluster.to_string(), sub.name.clone())) {
                if nl.contains(host) {
                    return Ok(sub);
                }
            }
        }
        Err(CoreError::NoMatchingSubCluster {
            cluster: cluster.to_string(),
            host: host.to_string(),
        })
    }

    /// Implements spec.md §4.1 `AssignSubCluster`: if the job names a
    /// sub-cluster, verify it exists. Otherwise match the first resource's
    /// hostname against each sub-cluster's node-list in order; first match
    /// wins. If every node-list is wildcard, pick the first sub-cluster.
    pub fn assign_sub_cluster<'a>(&'a self, job: &Job) -> Result<&'a SubClusterConfig> {
        if let Some(sub) = &job.sub_cluster {
            return self.get_sub_cluster(&job.cluster, sub);
        }
        let cluster = self.get_cluster(&job.cluster)?;
        let first_host = job
            .resources
            .first()
            .map(|r| r.hostname.as_str())
            .ok_or_else(|| {
                CoreError::NoMatchingSubCluster {
                    cluster: job.cluster.clone(),
                    host: String::new(),
                }
            })?;

        let all_wildcard = cluster.sub_clusters.iter().all(|s| {
            self.node_lists
                .get(&(job.cluster.clone(), s.name.clone()))
                .map(|nl| nl.is_wildcard())
                .unwrap_or(false)
        });
        if all_wildcard {
            return cluster.sub_clusters.first().ok_or_else(|| {
                CoreError::UnknownCluster(job.cluster.clone())
            });
        }

        for sub in &cluster.sub_clusters {
            if let Some(nl) = self
                .node_lists
                .get(&(job.cluster.clone(), sub.name.clone()))
            {
                if nl.contains(first_host) {
                    return Ok(sub);
                }
            }
        }
        Err(CoreError::NoMatchingSubCluster {
            cluster: job.cluster.clone(),
            host: first_host.to_string(),
        })
    }
}
