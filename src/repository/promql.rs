//! PromQL-templated repository: one `query_range` call per **group** of
//! `Query` values that share a (metric, aggregation, resolution), against
//! a Prometheus-compatible `/api/v1/query_range` endpoint. The group's
//! hostnames are compiled into a single `instance=~"..."` alternation
//! built by a small trie (`HostTrie`), so fanning out across many hosts
//! for the same metric costs one HTTP call, not one per host; responses
//! are routed back to each query by matching the result's `instance`
//! label.

use std::collections::HashMap;

use serde::Deserialize;

use super::MetricRepository;
use crate::config::RepositoryConfig;
use crate::error::{CoreError, Result};
use crate::model::{Aggregation, AggregationModeWire, Query, Series, SeriesStats};

pub struct PromqlRepository {
    client: reqwest::Client,
    endpoint: String,
    /// Appended to a hostname to form the Prometheus `instance` label,
    /// e.g. `:9100` for node_exporter's default port.
    instance_suffix: String,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct PromqlRepositoryFields {
    endpoint: String,
    #[serde(default)]
    instance_suffix: String,
    #[serde(default)]
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct PromResponse {
    data: PromData,
}

#[derive(Deserialize)]
struct PromData {
    result: Vec<PromResult>,
}

#[derive(Deserialize)]
struct PromResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    values: Vec<(f64, String)>,
}

/// Groups queries that can share one `query_range` call: same metric,
/// same aggregation mode, same resolution. Order of first appearance is
/// preserved so per-group requests go out in input order.
#[derive(Clone, PartialEq, Eq, Hash)]
struct BatchKey {
    metric: String,
    aggregate: Option<AggregationKind>,
    resolution: Option<i64>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum AggregationKind {
    Sum,
    Avg,
}

fn batch_key(q: &Query) -> BatchKey {
    let aggregate = match &q.aggregation {
        Aggregation::None => None,
        Aggregation::Aggregate(AggregationModeWire::Sum) => Some(AggregationKind::Sum),
        Aggregation::Aggregate(AggregationModeWire::Avg) => Some(AggregationKind::Avg),
    };
    BatchKey {
        metric: q.metric.clone(),
        aggregate,
        resolution: q.resolution,
    }
}

/// A char-keyed trie used only to fold a host list into one alternation
/// regex without repeating shared prefixes. Insertion order doesn't
/// matter; the emitted regex always groups by shared prefix, so
/// `["n001", "n002"]` becomes `n00(?:1|2)` rather than `n001|n002`.
#[derive(Default)]
struct HostTrie {
    children: std::collections::BTreeMap<char, HostTrie>,
    terminal: bool,
}

impl HostTrie {
    fn insert(&mut self, s: &str) {
        let mut node = self;
        for c in s.chars() {
            node = node.children.entry(c).or_default();
        }
        node.terminal = true;
    }

    /// Regex fragment matching every string inserted into this subtree,
    /// unanchored and without an enclosing group — the caller wraps the
    /// whole tree in `^(?:...)$`.
    fn to_regex(&self) -> String {
        let mut alts: Vec<String> = self
            .children
            .iter()
            .map(|(c, child)| {
                let escaped = regex::escape(&c.to_string());
                let rest = child.to_regex();
                if rest.is_empty() {
                    escaped
                } else {
                    format!("{escaped}(?:{rest})")
                }
            })
            .collect();
        if self.terminal {
            alts.push(String::new());
        }
        alts.join("|")
    }
}

impl PromqlRepository {
    pub fn from_config(config: &RepositoryConfig) -> Result<Self> {
        let fields: PromqlRepositoryFields = serde_json::from_value(config.fields.clone())?;
        Ok(PromqlRepository {
            client: reqwest::Client::new(),
            endpoint: fields.endpoint,
            instance_suffix: fields.instance_suffix,
            bearer_token: fields.bearer_token,
        })
    }

    fn instance_of(&self, hostname: &str) -> String {
        format!("{hostname}{}", self.instance_suffix)
    }

    /// Build the `instance=~"..."` matcher body for a list of hosts (one
    /// host works too — it's just a trie with one leaf).
    fn host_matcher(&self, hostnames: &[String]) -> String {
        let mut trie = HostTrie::default();
        for h in hostnames {
            trie.insert(&self.instance_of(h));
        }
        format!("^(?:{})$", trie.to_regex())
    }

    fn promql_for_group(&self, key: &BatchKey, hostnames: &[String]) -> String {
        let matcher = self.host_matcher(hostnames);
        match key.aggregate {
            None => format!(r#"{}{{instance=~"{matcher}"}}"#, key.metric),
            Some(kind) => {
                let fn_name = match kind {
                    AggregationKind::Sum => "sum",
                    AggregationKind::Avg => "avg",
                };
                // `by (instance)` keeps the per-host breakdown alive —
                // without it the aggregation would collapse every
                // matched instance into a single series.
                format!(
                    r#"{fn_name} by (instance) ({}{{instance=~"{matcher}"}})"#,
                    key.metric
                )
            }
        }
    }
}

#[async_trait::async_trait]
impl MetricRepository for PromqlRepository {
    async fn load_data(
        &self,
        _cluster: &str,
        start_time: i64,
        end_time: i64,
        queries: &[Query],
    ) -> Result<Vec<Result<Series>>> {
        let mut groups: Vec<(BatchKey, Vec<usize>)> = Vec::new();
        for (i, q) in queries.iter().enumerate() {
            let key = batch_key(q);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, idxs)) => idxs.push(i),
                None => groups.push((key, vec![i])),
            }
        }

        let mut out: Vec<Option<Result<Series>>> = (0..queries.len()).map(|_| None).collect();
        for (key, idxs) in &groups {
            let hostnames: Vec<String> = idxs.iter().map(|&i| queries[i].hostname.clone()).collect();
            let step = queries[idxs[0]].resolution.unwrap_or(60);
            let url = format!("{}/api/v1/query_range", self.endpoint);
            let params = [
                ("query", self.promql_for_group(key, &hostnames)),
                ("start", start_time.to_string()),
                ("end", end_time.to_string()),
                ("step", step.to_string()),
            ];
            let mut req = self.client.get(&url).query(&params);
            if let Some(tok) = &self.bearer_token {
                req = req.bearer_auth(tok);
            }

            match req.send().await.and_then(|r| r.error_for_status()) {
                Ok(resp) => match resp.json::<PromResponse>().await {
                    Ok(parsed) => {
                        for &i in idxs {
                            out[i] = Some(Ok(from_prom(&queries[i], &parsed, &self.instance_suffix)));
                        }
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        for &i in idxs {
                            out[i] = Some(Err(CoreError::Decode(msg.clone())));
                        }
                    }
                },
                Err(e) => {
                    let msg = e.to_string();
                    for &i in idxs {
                        out[i] = Some(Err(CoreError::BackendUnavailable(msg.clone())));
                    }
                }
            }
        }
        Ok(out
            .into_iter()
            .map(|o| o.expect("every query index is assigned to exactly one batch group"))
            .collect())
    }
}

fn from_prom(q: &Query, resp: &PromResponse, instance_suffix: &str) -> Series {
    let wanted = format!("{}{instance_suffix}", q.hostname);
    let data: Vec<f64> = resp
        .data
        .result
        .iter()
        .find(|r| r.metric.get("instance").map(String::as_str) == Some(wanted.as_str()))
        .map(|r| {
            r.values
                .iter()
                .map(|(_, v)| v.parse::<f64>().unwrap_or(f64::NAN))
                .collect()
        })
        .unwrap_or_default();
    let stats = SeriesStats::from_raw(&data);
    Series {
        hostname: q.hostname.clone(),
        type_id: q.type_id.clone(),
        stats,
        data,
    }
}
