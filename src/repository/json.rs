//! Columnar-JSON repository: POSTs a batch request shaped like spec.md
//! §6's wire contract (one row per query: metric/host/scope ids, expects
//! one column-oriented series back per row) and parses the response into
//! `Series`, sanitizing `NaN` per §4.5.

use serde::{Deserialize, Serialize};

use super::MetricRepository;
use crate::config::RepositoryConfig;
use crate::error::{CoreError, Result};
use crate::model::{Query, Series, SeriesStats};

pub struct JsonRepository {
    client: reqwest::Client,
    endpoint: String,
    bearer_token: Option<String>,
    /// Optional local-name -> remote-name map, applied symmetrically to
    /// the outgoing request and (in reverse) nothing on the way back,
    /// since the response is positionally matched to the request.
    metric_rename: std::collections::HashMap<String, String>,
}

#[derive(Deserialize)]
struct JsonRepositoryFields {
    endpoint: String,
    #[serde(default)]
    bearer_token: Option<String>,
    #[serde(default)]
    metric_rename: std::collections::HashMap<String, String>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    start_time: i64,
    end_time: i64,
    queries: Vec<WireQuery<'a>>,
}

#[derive(Serialize)]
struct WireQuery<'a> {
    metric: &'a str,
    hostname: &'a str,
    #[serde(rename = "type")]
    type_: &'static str,
    ids: &'a [u32],
    accelerator_ids: &'a [String],
}

#[derive(Deserialize)]
struct WireSeries {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Vec<Option<f64>>,
}

impl JsonRepository {
    pub fn from_config(config: &RepositoryConfig) -> Result<Self> {
        let fields: JsonRepositoryFields = serde_json::from_value(config.fields.clone())?;
        Ok(JsonRepository {
            client: reqwest::Client::new(),
            endpoint: fields.endpoint,
            bearer_token: fields.bearer_token,
            metric_rename: fields.metric_rename,
        })
    }

    fn remote_name<'a>(&'a self, metric: &'a str) -> &'a str {
        self.metric_rename
            .get(metric)
            .map(String::as_str)
            .unwrap_or(metric)
    }
}

#[async_trait::async_trait]
impl MetricRepository for JsonRepository {
    async fn load_data(
        &self,
        _cluster: &str,
        start_time: i64,
        end_time: i64,
        queries: &[Query],
    ) -> Result<Vec<Result<Series>>> {
        let wire_queries: Vec<WireQuery> = queries
            .iter()
            .map(|q| WireQuery {
                metric: self.remote_name(&q.metric),
                hostname: &q.hostname,
                type_: match q.aggregation {
                    crate::model::Aggregation::None => "enumerate",
                    crate::model::Aggregation::Aggregate(_) => "aggregate",
                },
                ids: &q.ids,
                accelerator_ids: &q.accelerator_ids,
            })
            .collect();

        let mut req = self.client.post(&self.endpoint).json(&WireRequest {
            start_time,
            end_time,
            queries: wire_queries,
        });
        if let Some(tok) = &self.bearer_token {
            req = req.bearer_auth(tok);
        }
        let resp = req
            .send()
            .await?
            .error_for_status()
            .map_err(CoreError::from)?;
        let wire: Vec<WireSeries> = resp.json().await?;

        if wire.len() != queries.len() {
            return Err(CoreError::Decode(format!(
                "repository returned {} series for {} queries",
                wire.len(),
                queries.len()
            )));
        }

        Ok(queries
            .iter()
            .zip(wire)
            .map(|(q, w)| match w.error {
                Some(msg) => Err(CoreError::Decode(msg)),
                None => Ok(sanitize(q, w.data)),
            })
            .collect())
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
