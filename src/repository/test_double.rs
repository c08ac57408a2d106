//! In-memory canned repository: used by this crate's own executor tests
//! and importable by downstream embedders for theirs. Returns a fixed
//! series (or a configured per-(metric,host) error) without any network
//! I/O.

use std::collections::HashMap;
use std::sync::Mutex;

use super::MetricRepository;
use crate::error::{CoreError, Result};
use crate::model::{Query, Series, SeriesStats};

#[derive(Default)]
pub struct TestRepository {
    /// (metric, hostname) -> canned data points. Missing entries default
    /// to a short synthetic ramp so tests that don't care about exact
    /// values still get something shaped like a series.
    canned: Mutex<HashMap<(String, String), Vec<f64>>>,
    /// (metric, hostname) -> error to return instead of data.
    failures: Mutex<HashMap<(String, String), String>>,
}

impl TestRepository {
    pub fn with_series(self, metric: &str, hostname: &str, data: Vec<f64>) -> Self {
        self.canned
            .lock()
            .unwrap()
            .insert((metric.to_string(), hostname.to_string()), data);
        self
    }

    pub fn with_failure(self, metric: &str, hostname: &str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((metric.to_string(), hostname.to_string()), message.to_string());
        self
    }
}

#[async_trait::async_trait]
impl MetricRepository for TestRepository {
    async fn load_data(
        &self,
        _cluster: &str,
        _start_time: i64,
        _end_time: i64,
        queries: &[Query],
    ) -> Result<Vec<Result<Series>>> {
        let canned = self.canned.lock().unwrap();
        let failures = self.failures.lock().unwrap();
        Ok(queries
            .iter()
            .map(|q| {
                let key = (q.metric.clone(), q.hostname.clone());
                if let Some(message) = failures.get(&key) {
                    return Err(CoreError::BackendUnavailable(message.clone()));
                }
                let data = canned
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| vec![1.0, 2.0, 3.0]);
                let stats = SeriesStats::from_raw(&data);
                Ok(Series {
                    hostname: q.hostname.clone(),
                    type_id: q.type_id.clone(),
                    stats,
                    data,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Aggregation;

    #[tokio::test]
    async fn returns_canned_series_when_present() {
        let repo = TestRepository::default().with_series("flops_any", "n001", vec![4.0, 5.0]);
        let q = Query {
            metric: "flops_any".into(),
            hostname: "n001".into(),
            aggregation: Aggregation::None,
            ids: vec![0],
            accelerator_ids: vec![],
            type_id: Some("0".into()),
            resolution: None,
        };
        let out = repo.load_data("c", 0, 60, &[q]).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap().data, vec![4.0, 5.0]);
    }

    #[tokio::test]
    async fn returns_configured_failure() {
        let repo = TestRepository::default().with_failure("flops_any", "n001", "boom");
        let q = Query {
            metric: "flops_any".into(),
            hostname: "n001".into(),
            aggregation: Aggregation::None,
            ids: vec![0],
            accelerator_ids: vec![],
            type_id: Some("0".into()),
            resolution: None,
        };
        let out = repo.load_data("c", 0, 60, &[q]).await.unwrap();
        assert!(matches!(out[0], Err(CoreError::BackendUnavailable(_))));
    }
}
