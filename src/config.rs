//! # Configuration — Cluster/Sub-cluster/Repository Config Loading
//!
//! Loads the on-disk cluster configuration (TOML) that [`crate::registry::Registry`]
//! is built from. One file may describe several clusters; each cluster
//! names the repository and archive backend it uses via a `kind`
//! discriminator (spec.md §6).
//!
//! `${VAR}`-style placeholders in string fields (bearer tokens, database
//! URLs) are resolved against the process environment after
//! `dotenvy::dotenv()` has had a chance to populate it, so a `.env` file
//! can supply secrets without committing them to the config file itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::model::{MetricConfig, MetricOverride, Topology};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubClusterConfig {
    pub name: String,
    /// Node-list expression (spec.md §4.1 grammar), e.g. `"n[001-100]"`.
    pub node_list: String,
    pub topology: Topology,
    /// Per-metric exceptions for this sub-cluster: remove it entirely, or
    /// keep it with adjusted thresholds. Metric *configuration* itself
    /// (native scope, timestep, unit, aggregation) is cluster-wide —
    /// see `ClusterConfig::metrics`.
    #[serde(default)]
    pub metric_overrides: HashMap<String, MetricOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub kind: String,
    #[serde(flatten)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub kind: String,
    #[serde(flatten)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    /// Metric configuration is keyed by (cluster, metric) — not by
    /// sub-cluster — per spec.md §3; sub-clusters only ever narrow this
    /// via `SubClusterConfig::metric_overrides`.
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    pub sub_clusters: Vec<SubClusterConfig>,
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("reading {}: {e}", path.display())))?;
        let resolved = resolve_env_placeholders(&raw);
        let cfg: Config = toml::from_str(&resolved)?;
        Ok(cfg)
    }
}

/// Replace every `${NAME}` occurrence with the value of the `NAME`
/// environment variable. Unset variables are left as literal text rather
/// than erroring, so a config can be shared across environments that
/// don't all need every secret (the repository/archive that actually
/// reads the field will fail loudly if it's still a placeholder).
fn resolve_env_placeholders(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_resolves_from_env() {
        std::env::set_var("METRICGRID_TEST_TOKEN", "secret123");
        let resolved = resolve_env_placeholders("token = \"${METRICGRID_TEST_TOKEN}\"");
        assert_eq!(resolved, "token = \"secret123\"");
        std::env::remove_var("METRICGRID_TEST_TOKEN");
    }

    #[test]
    fn unset_placeholder_is_left_alone() {
        let resolved = resolve_env_placeholders("x = \"${DEFINITELY_NOT_SET_XYZ}\"");
        assert_eq!(resolved, "x = \"${DEFINITELY_NOT_SET_XYZ}\"");
    }
}
