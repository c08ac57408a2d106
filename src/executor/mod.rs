//! # Query Executor & Reshaper
//!
//! Dispatches a planned query batch to one [`crate::repository::MetricRepository`],
//! applies the final NaN-sanitization pass (spec.md §4.5/§8 property 8),
//! groups results by metric → scope → series, and aggregates per-(metric,
//! host) failures into a [`crate::error::CoreError::PartialSeries`]
//! returned alongside otherwise-successful data rather than in place of
//! it.
//!
//! Cancellation is cooperative: `execute` checks the token before
//! dispatch and the repository call races it, mirroring the teacher's
//! `tokio::select!`-around-a-long-running-future pattern used for worker
//! shutdown.

use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::error::{CoreError, PartialError, Result};
use crate::model::{prune_empty, JobData, MetricBundle, Query, Series};
use crate::repository::MetricRepository;

/// Run `queries` against `repo` and reshape the result into `JobData`.
///
/// `assigned_scopes[i]` is the scope `queries[i]` actually produces (the
/// planner's output is index-parallel with `queries`); this is what group
/// the resulting `Series` lands in.
///
/// Returns `Ok((data, partial))` where `partial` is `Some` iff at least
/// one (metric, host) failed; a whole-batch failure (backend
/// unavailable, decode error, cancellation) short-circuits as `Err`
/// instead.
pub async fn execute(
    repo: &dyn MetricRepository,
    cluster: &str,
    start_time: i64,
    end_time: i64,
    queries: &[Query],
    assigned_scopes: &[crate::model::MetricScope],
    metric_units: impl Fn(&str) -> (String, i64),
    cancel: CancellationToken,
) -> Result<(JobData, Option<CoreError>)> {
    debug_assert_eq!(queries.len(), assigned_scopes.len());

    let span = info_span!("execute", cluster, query_count = queries.len());
    async move {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let results: Vec<Result<Series>> = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            r = repo.load_data(cluster, start_time, end_time, queries) => r?,
        };

        if results.len() != queries.len() {
            return Err(CoreError::Decode(format!(
                "repository returned {} results for {} queries",
                results.len(),
                queries.len()
            )));
        }

        let mut data: JobData = JobData::new();
        let mut partial_errors = Vec::new();

        for ((query, scope), result) in queries.iter().zip(assigned_scopes).zip(results) {
            match result {
                Ok(mut series) => {
                    series.stats.sanitize();
                    let (unit, timestep) = metric_units(&query.metric);
                    let bundle = data
                        .entry(query.metric.clone())
                        .or_default()
                        .entry(*scope)
                        .or_insert_with(|| MetricBundle {
                            unit,
                            timestep,
                            series: Vec::new(),
                        });
                    bundle.series.push(series);
                }
                Err(e) => {
                    warn!(metric = %query.metric, host = %query.hostname, error = %e, "series failed");
                    partial_errors.push(PartialError {
                        metric: query.metric.clone(),
                        host: query.hostname.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        prune_empty(&mut data);

        let partial = if partial_errors.is_empty() {
            None
        } else {
            Some(CoreError::PartialSeries(partial_errors))
        };
        Ok((data, partial))
    }
    .instrument(span)
    .await
}
