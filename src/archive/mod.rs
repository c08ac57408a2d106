//! # Archive Backend
//!
//! Storage for *finished* jobs: metadata (`ArchiveMeta`) plus the final
//! `JobData` snapshot, written once by whatever collects metrics and read
//! many times afterward. Three backends share one trait, dispatched on
//! the `kind` tag in `ArchiveConfig` (spec.md §6): a plain file tree, a
//! relational blob store, and an HTTP object store.
//!
//! The on-disk/on-wire layout is versioned: every backend carries a
//! `version.txt`/`schema_version` watermark and refuses to read data
//! written by an incompatible writer (`CoreError::UnsupportedArchiveVersion`)
//! rather than guessing at a migration.

pub mod file;
pub mod object;
pub mod postgres;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::model::{scoped_stats_from_job_data, ArchiveMeta, JobData, ScopedStats};

/// Current archive schema version this crate writes and expects to read.
pub const ARCHIVE_VERSION: u32 = 1;

/// One entry yielded while iterating an archive backend's job index.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub cluster: String,
    pub job_id: i64,
    pub start_time: i64,
}

#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    async fn exists(&self, cluster: &str, job_id: i64, start_time: i64) -> Result<bool>;

    async fn load_job_meta(&self, cluster: &str, job_id: i64, start_time: i64)
        -> Result<ArchiveMeta>;

    async fn load_job_data(&self, cluster: &str, job_id: i64, start_time: i64) -> Result<JobData>;

    /// Statistics-only view of an archived job: same data `load_job_data`
    /// would return, with the raw series dropped. Backed by `load_job_data`
    /// itself rather than a separate stored representation, since every
    /// backend already has the full `JobData` on hand.
    async fn load_job_stats(
        &self,
        cluster: &str,
        job_id: i64,
        start_time: i64,
    ) -> Result<ScopedStats> {
        let data = self.load_job_data(cluster, job_id, start_time).await?;
        Ok(scoped_stats_from_job_data(&data))
    }

    /// The cluster configuration snapshot this archive was last told
    /// about via `store_cluster_config`, independent of whatever the live
    /// registry currently loads from TOML.
    async fn load_cluster_config(&self, name: &str) -> Result<ClusterConfig>;

    async fn store_cluster_config(&self, config: &ClusterConfig) -> Result<()>;

    async fn store_job_meta(&self, meta: &ArchiveMeta) -> Result<()>;

    async fn store_job_data(
        &self,
        cluster: &str,
        job_id: i64,
        start_time: i64,
        data: &JobData,
    ) -> Result<()>;

    /// Write meta and data together as one all-or-nothing unit (spec.md
    /// §4.2's `ImportJob`): a reader never observes meta without data or
    /// vice versa.
    async fn import_job(&self, meta: &ArchiveMeta, data: &JobData) -> Result<()>;

    /// Every archived job key for `cluster`, in no particular order. A
    /// per-entry decode failure is logged and skipped rather than
    /// aborting the whole stream.
    fn iter(&self, cluster: &str) -> BoxStream<'_, Result<ArchiveEntry>>;

    /// Permanently delete the named jobs and everything stored under them.
    async fn clean_up(&self, jobs: &[ArchiveEntry]) -> Result<()>;

    /// Relocate the named jobs into a different archive root/target
    /// (another `FileArchive` root path, another Postgres schema, another
    /// object-storage prefix — backend-specific, always a move, never a
    /// copy: the source no longer holds the job afterward).
    async fn move_jobs(&self, jobs: &[ArchiveEntry], target: &str) -> Result<()>;

    /// Delete every archived job across all clusters whose `start_time`
    /// falls in the half-open window `[after, before)`. See DESIGN.md for
    /// why this window direction was chosen over the alternatives spec.md
    /// left open.
    async fn clean(&self, before: i64, after: i64) -> Result<()>;

    /// Compress the named jobs' stored data in place (a no-op for backends
    /// whose storage already compresses transparently).
    async fn compress(&self, jobs: &[ArchiveEntry]) -> Result<()>;

    /// Compress every not-yet-compressed job older than `before` across
    /// all clusters, advance the backend's compression watermark past
    /// `before`, and return how many jobs were compressed.
    async fn compress_last(&self, before: i64) -> Result<i64>;
}

use crate::config::ArchiveConfig;

pub fn build(config: &ArchiveConfig) -> Result<std::sync::Arc<dyn ArchiveBackend>> {
    match config.kind.as_str() {
        "file" => Ok(std::sync::Arc::new(file::FileArchive::from_config(config)?)),
        "postgres" | "blob" => Ok(std::sync::Arc::new(postgres::PostgresArchive::from_config(
            config,
        )?)),
        "object" => Ok(std::sync::Arc::new(object::ObjectArchive::from_config(
            config,
        )?)),
        other => Err(crate::error::CoreError::Config(format!(
            "unknown archive kind: {other}"
        ))),
    }
}
