//! Object-storage archive: PUT/GET against an S3-compatible HTTP endpoint.
//! Key layout mirrors `FileArchive`'s path scheme so the two are
//! interchangeable from an operator's point of view.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use super::{ArchiveBackend, ArchiveEntry};
use crate::config::{ArchiveConfig, ClusterConfig};
use crate::error::{CoreError, Result};
use crate::model::{ArchiveMeta, JobData};

pub struct ObjectArchive {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectArchiveFields {
    base_url: String,
    #[serde(default)]
    bearer_token: Option<String>,
}

impl ObjectArchive {
    pub fn from_config(config: &ArchiveConfig) -> Result<Self> {
        let fields: ObjectArchiveFields = serde_json::from_value(config.fields.clone())?;
        Ok(ObjectArchive {
            client: reqwest::Client::new(),
            base_url: fields.base_url.trim_end_matches('/').to_string(),
            bearer_token: fields.bearer_token,
        })
    }

    fn key(&self, cluster: &str, job_id: i64, start_time: i64, leaf: &str) -> String {
        format!(
            "{}/{cluster}/{}/{}/{start_time}/{leaf}",
            self.base_url,
            job_id / 1000,
            job_id % 1000,
        )
    }

    fn key_at(base_url: &str, cluster: &str, job_id: i64, start_time: i64, leaf: &str) -> String {
        format!(
            "{}/{cluster}/{}/{}/{start_time}/{leaf}",
            base_url.trim_end_matches('/'),
            job_id / 1000,
            job_id % 1000,
        )
    }

    fn cluster_config_key(&self, cluster: &str) -> String {
        format!("{}/{cluster}/cluster.json", self.base_url)
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let resp = self.request(reqwest::Method::DELETE, url).send().await?;
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            resp.error_for_status().map_err(CoreError::from)?;
        }
        Ok(())
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match &self.bearer_token {
            Some(tok) => req.bearer_auth(tok),
            None => req,
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status().map_err(CoreError::from)?;
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn put_bytes(&self, url: &str, body: Vec<u8>) -> Result<()> {
        self.request(reqwest::Method::PUT, url)
            .body(body)
            .send()
            .await?
            .error_for_status()
            .map_err(CoreError::from)?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveBackend for ObjectArchive {
    async fn exists(&self, cluster: &str, job_id: i64, start_time: i64) -> Result<bool> {
        let url = self.key(cluster, job_id, start_time, "meta.json");
        Ok(self.get_bytes(&url).await?.is_some())
    }

    async fn load_job_meta(
        &self,
        cluster: &str,
        job_id: i64,
        start_time: i64,
    ) -> Result<ArchiveMeta> {
        let url = self.key(cluster, job_id, start_time, "meta.json");
        let bytes = self.get_bytes(&url).await?.ok_or(CoreError::ArchiveMissing)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn load_job_data(&self, cluster: &str, job_id: i64, start_time: i64) -> Result<JobData> {
        let url = self.key(cluster, job_id, start_time, "data.json");
        let bytes = self.get_bytes(&url).await?.ok_or(CoreError::ArchiveMissing)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn store_job_meta(&self, meta: &ArchiveMeta) -> Result<()> {
        let url = self.key(&meta.cluster, meta.job_id, meta.start_time, "meta.json");
        let bytes = serde_json::to_vec(meta)?;
        self.put_bytes(&url, bytes).await
    }

    async fn store_job_data(
        &self,
        cluster: &str,
        job_id: i64,
        start_time: i64,
        data: &JobData,
    ) -> Result<()> {
        let url = self.key(cluster, job_id, start_time, "data.json");
        let bytes = serde_json::to_vec(data)?;
        self.put_bytes(&url, bytes).await
    }

    async fn import_job(&self, meta: &ArchiveMeta, data: &JobData) -> Result<()> {
        self.store_job_data(&meta.cluster, meta.job_id, meta.start_time, data)
            .await?;
        self.store_job_meta(meta).await
    }

    /// Object storage has no native "list by prefix" contract modeled
    /// here (that would require a backend-specific bucket-listing API);
    /// this backend is import/export only and yields nothing to iterate.
    fn iter(&self, _cluster: &str) -> BoxStream<'_, Result<ArchiveEntry>> {
        stream::iter(Vec::new()).boxed()
    }

    async fn load_cluster_config(&self, name: &str) -> Result<ClusterConfig> {
        let url = self.cluster_config_key(name);
        let bytes = self.get_bytes(&url).await?.ok_or(CoreError::ArchiveMissing)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn store_cluster_config(&self, config: &ClusterConfig) -> Result<()> {
        let url = self.cluster_config_key(&config.name);
        let bytes = serde_json::to_vec(config)?;
        self.put_bytes(&url, bytes).await
    }

    async fn clean_up(&self, jobs: &[ArchiveEntry]) -> Result<()> {
        for job in jobs {
            let meta_url = self.key(&job.cluster, job.job_id, job.start_time, "meta.json");
            let data_url = self.key(&job.cluster, job.job_id, job.start_time, "data.json");
            self.delete(&meta_url).await?;
            self.delete(&data_url).await?;
        }
        Ok(())
    }

    /// `target` is another object store's base URL; each job is fetched
    /// from this store and PUT to the same relative key under `target`
    /// before being deleted here.
    async fn move_jobs(&self, jobs: &[ArchiveEntry], target: &str) -> Result<()> {
        for job in jobs {
            for leaf in ["meta.json", "data.json"] {
                let src = self.key(&job.cluster, job.job_id, job.start_time, leaf);
                let Some(bytes) = self.get_bytes(&src).await? else {
                    continue;
                };
                let dst = Self::key_at(target, &job.cluster, job.job_id, job.start_time, leaf);
                self.put_bytes(&dst, bytes).await?;
            }
        }
        self.clean_up(jobs).await
    }

    /// No-op: without a bucket-listing API (see `iter`'s doc-comment) this
    /// backend has no way to discover which jobs fall in a time window
    /// without being told their keys explicitly.
    async fn clean(&self, _before: i64, _after: i64) -> Result<()> {
        Ok(())
    }

    /// No-op: this backend stores one JSON blob per job with no separate
    /// compressed representation to switch to.
    async fn compress(&self, _jobs: &[ArchiveEntry]) -> Result<()> {
        Ok(())
    }

    /// Always reports zero compressed, for the same reason `clean` is a
    /// no-op: nothing here can be discovered without bucket listing.
    async fn compress_last(&self, _before: i64) -> Result<i64> {
        Ok(0)
    }
}
