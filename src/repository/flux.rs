//! Flux/InfluxDB repository: builds one Flux query per batch from the
//! template in spec.md §6 and POSTs it to an InfluxDB-style
//! `/api/v2/query` endpoint.
//!
//! Sub-node scopes (anything finer than `Node`) degrade to a per-host
//! node-scope query here: full per-core/socket Flux pivoting would need
//! a schema this crate doesn't assume its InfluxDB bucket carries, so a
//! request for a sub-node scope is honored at node granularity with a
//! one-shot warning (spec.md's "degrade with a warning" escape hatch)
//! rather than failing the whole batch. This also means the response is
//! read back as a plain JSON table rather than full annotated CSV — see
//! DESIGN.md's open-question note on this simplification.

use std::sync::Once;

use serde::Deserialize;
use tracing::warn;

use super::MetricRepository;
use crate::config::RepositoryConfig;
use crate::error::{CoreError, Result};
use crate::model::{Query, Series, SeriesStats};

static NODE_DEGRADE_WARNED: Once = Once::new();

pub struct FluxRepository {
    client: reqwest::Client,
    endpoint: String,
    org: String,
    bucket: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct FluxRepositoryFields {
    endpoint: String,
    org: String,
    bucket: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Deserialize)]
struct FluxTable {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    values: Vec<Option<f64>>,
}

impl FluxRepository {
    pub fn from_config(config: &RepositoryConfig) -> Result<Self> {
        let fields: FluxRepositoryFields = serde_json::from_value(config.fields.clone())?;
        Ok(FluxRepository {
            client: reqwest::Client::new(),
            endpoint: fields.endpoint,
            org: fields.org,
            bucket: fields.bucket,
            token: fields.token,
        })
    }

    fn flux_for(&self, q: &Query, start_time: i64, end_time: i64) -> String {
        if !q.ids.is_empty() || !q.accelerator_ids.is_empty() {
            NODE_DEGRADE_WARNED.call_once(|| {
                warn!("flux repository degrades sub-node scopes to node scope");
            });
        }
        format!(
            r#"from(bucket: "{bucket}")
  |> range(start: {start}, stop: {stop})
  |> filter(fn: (r) => r._measurement == "{metric}" and r.host == "{host}")
  |> aggregateWindow(every: 1m, fn: mean, createEmpty: false)
  |> yield(name: "mean")"#,
            bucket = self.bucket,
            start = start_time,
            stop = end_time,
            metric = q.metric,
            host = q.hostname,
        )
    }
}

#[async_trait::async_trait]
impl MetricRepository for FluxRepository {
    async fn load_data(
        &self,
        _cluster: &str,
        start_time: i64,
        end_time: i64,
        queries: &[Query],
    ) -> Result<Vec<Result<Series>>> {
        let mut out = Vec::with_capacity(queries.len());
        for q in queries {
            let flux = self.flux_for(q, start_time, end_time);
            let url = format!("{}/api/v2/query?org={}", self.endpoint, self.org);
            let mut req = self
                .client
                .post(&url)
                .header("Content-Type", "application/vnd.flux")
                .header("Accept", "application/json")
                .body(flux);
            if let Some(tok) = &self.token {
                req = req.bearer_auth(tok);
            }
            let resp = req.send().await;
            let series = match resp {
                Ok(r) => match r.error_for_status() {
                    Ok(r) => match r.json::<FluxTable>().await {
                        Ok(table) => match table.error {
                            Some(msg) => Err(CoreError::Decode(msg)),
                            None => Ok(sanitize(q, table.values)),
                        },
                        Err(e) => Err(CoreError::from(e)),
                    },
                    Err(e) => Err(CoreError::from(e)),
                },
                Err(e) => Err(CoreError::from(e)),
            };
            out.push(series);
        }
        Ok(out)
    }
}

fn sanitize(q: &Query, raw: Vec<Option<f64>>) -> Series {
    let data: Vec<f64> = raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let stats = SeriesStats::from_raw(&data);
    Series {
        hostname: q.hostname.clone(),
        type_id: q.type_id.clone(),
        stats,
        data,
    }
}
