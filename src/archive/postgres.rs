//! Relational blob archive: one row per job in a `jobs` table, `meta`
//! and `data` stored as `jsonb`. `ImportJob` writes both in one
//! transaction (grounded on the teacher's `db/jobs.rs` `create_search_job`,
//! which inserts a job row and its work blocks under a single `tx`).

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{ArchiveBackend, ArchiveEntry, ARCHIVE_VERSION};
use crate::config::{ArchiveConfig, ClusterConfig};
use crate::error::{CoreError, Result};
use crate::model::{ArchiveMeta, JobData};

pub struct PostgresArchive {
    pool: PgPool,
}

#[derive(Deserialize)]
struct PostgresArchiveFields {
    url: String,
}

impl PostgresArchive {
    pub fn from_config(config: &ArchiveConfig) -> Result<Self> {
        let fields: PostgresArchiveFields = serde_json::from_value(config.fields.clone())?;
        // `connect_lazy` defers the actual TCP connection to first use, so
        // building the registry at boot never blocks on the database being
        // reachable yet.
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_lazy(&fields.url)
            .map_err(CoreError::from)?;
        Ok(PostgresArchive { pool })
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS archived_jobs (
                cluster TEXT NOT NULL,
                job_id BIGINT NOT NULL,
                start_time BIGINT NOT NULL,
                schema_version INT NOT NULL,
                meta JSONB NOT NULL,
                data JSONB,
                compressed BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (cluster, job_id, start_time)
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS archived_cluster_configs (
                cluster TEXT PRIMARY KEY,
                config JSONB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS archive_compress_watermark (
                id BOOLEAN PRIMARY KEY DEFAULT TRUE,
                start_time BIGINT NOT NULL,
                CHECK (id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn compress_watermark(&self) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT start_time FROM archive_compress_watermark WHERE id")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(t,)| t).unwrap_or(i64::MIN))
    }

    async fn set_compress_watermark(&self, value: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO archive_compress_watermark (id, start_time) VALUES (TRUE, $1)
             ON CONFLICT (id) DO UPDATE SET start_time = EXCLUDED.start_time",
        )
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveBackend for PostgresArchive {
    async fn exists(&self, cluster: &str, job_id: i64, start_time: i64) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM archived_jobs WHERE cluster = $1 AND job_id = $2 AND start_time = $3",
        )
        .bind(cluster)
        .bind(job_id)
        .bind(start_time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn load_job_meta(
        &self,
        cluster: &str,
        job_id: i64,
        start_time: i64,
    ) -> Result<ArchiveMeta> {
        let row: Option<(serde_json::Value, i32)> = sqlx::query_as(
            "SELECT meta, schema_version FROM archived_jobs
             WHERE cluster = $1 AND job_id = $2 AND start_time = $3",
        )
        .bind(cluster)
        .bind(job_id)
        .bind(start_time)
        .fetch_optional(&self.pool)
        .await?;
        let (meta, version) = row.ok_or(CoreError::ArchiveMissing)?;
        if version as u32 != ARCHIVE_VERSION {
            return Err(CoreError::UnsupportedArchiveVersion {
                have: version as u32,
                need: ARCHIVE_VERSION,
            });
        }
        Ok(serde_json::from_value(meta)?)
    }

    async fn load_job_data(&self, cluster: &str, job_id: i64, start_time: i64) -> Result<JobData> {
        let row: Option<(Option<serde_json::Value>,)> = sqlx::query_as(
            "SELECT data FROM archived_jobs
             WHERE cluster = $1 AND job_id = $2 AND start_time = $3",
        )
        .bind(cluster)
        .bind(job_id)
        .bind(start_time)
        .fetch_optional(&self.pool)
        .await?;
        let data = row
            .and_then(|(d,)| d)
            .ok_or(CoreError::ArchiveMissing)?;
        Ok(serde_json::from_value(data)?)
    }

    async fn store_job_meta(&self, meta: &ArchiveMeta) -> Result<()> {
        self.ensure_schema().await?;
        let meta_json = serde_json::to_value(meta)?;
        sqlx::query(
            "INSERT INTO archived_jobs (cluster, job_id, start_time, schema_version, meta)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (cluster, job_id, start_time)
             DO UPDATE SET meta = EXCLUDED.meta, schema_version = EXCLUDED.schema_version",
        )
        .bind(&meta.cluster)
        .bind(meta.job_id)
        .bind(meta.start_time)
        .bind(ARCHIVE_VERSION as i32)
        .bind(meta_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn store_job_data(
        &self,
        cluster: &str,
        job_id: i64,
        start_time: i64,
        data: &JobData,
    ) -> Result<()> {
        self.ensure_schema().await?;
        let data_json = serde_json::to_value(data)?;
        sqlx::query(
            "UPDATE archived_jobs SET data = $4
             WHERE cluster = $1 AND job_id = $2 AND start_time = $3",
        )
        .bind(cluster)
        .bind(job_id)
        .bind(start_time)
        .bind(data_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn import_job(&self, meta: &ArchiveMeta, data: &JobData) -> Result<()> {
        self.ensure_schema().await?;
        let meta_json = serde_json::to_value(meta)?;
        let data_json = serde_json::to_value(data)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO archived_jobs (cluster, job_id, start_time, schema_version, meta, data)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (cluster, job_id, start_time)
             DO UPDATE SET meta = EXCLUDED.meta, data = EXCLUDED.data,
                           schema_version = EXCLUDED.schema_version",
        )
        .bind(&meta.cluster)
        .bind(meta.job_id)
        .bind(meta.start_time)
        .bind(ARCHIVE_VERSION as i32)
        .bind(meta_json)
        .bind(data_json)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    fn iter(&self, cluster: &str) -> BoxStream<'_, Result<ArchiveEntry>> {
        let cluster = cluster.to_string();
        let pool = self.pool.clone();
        stream::once(async move {
            let rows: Vec<(i64, i64)> = sqlx::query_as(
                "SELECT job_id, start_time FROM archived_jobs WHERE cluster = $1",
            )
            .bind(&cluster)
            .fetch_all(&pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(job_id, start_time)| ArchiveEntry {
                    cluster: cluster.clone(),
                    job_id,
                    start_time,
                })
                .collect::<Vec<_>>())
        })
        .flat_map(|result: Result<Vec<ArchiveEntry>>| match result {
            Ok(entries) => stream::iter(entries.into_iter().map(Ok)).boxed(),
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        })
        .boxed()
    }

    async fn load_cluster_config(&self, name: &str) -> Result<ClusterConfig> {
        self.ensure_schema().await?;
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT config FROM archived_cluster_configs WHERE cluster = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let (config,) = row.ok_or(CoreError::ArchiveMissing)?;
        Ok(serde_json::from_value(config)?)
    }

    async fn store_cluster_config(&self, config: &ClusterConfig) -> Result<()> {
        self.ensure_schema().await?;
        let config_json = serde_json::to_value(config)?;
        sqlx::query(
            "INSERT INTO archived_cluster_configs (cluster, config) VALUES ($1, $2)
             ON CONFLICT (cluster) DO UPDATE SET config = EXCLUDED.config",
        )
        .bind(&config.name)
        .bind(config_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clean_up(&self, jobs: &[ArchiveEntry]) -> Result<()> {
        for job in jobs {
            sqlx::query(
                "DELETE FROM archived_jobs WHERE cluster = $1 AND job_id = $2 AND start_time = $3",
            )
            .bind(&job.cluster)
            .bind(job.job_id)
            .bind(job.start_time)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// `target` names another Postgres database to relocate rows into, as
    /// a `postgres://...` URL: each job's row is copied to a fresh
    /// connection pool for that target and deleted from this one.
    async fn move_jobs(&self, jobs: &[ArchiveEntry], target: &str) -> Result<()> {
        self.ensure_schema().await?;
        let target_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy(target)
            .map_err(CoreError::from)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS archived_jobs (
                cluster TEXT NOT NULL,
                job_id BIGINT NOT NULL,
                start_time BIGINT NOT NULL,
                schema_version INT NOT NULL,
                meta JSONB NOT NULL,
                data JSONB,
                compressed BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (cluster, job_id, start_time)
            )",
        )
        .execute(&target_pool)
        .await?;
        for job in jobs {
            let row: Option<(serde_json::Value, Option<serde_json::Value>, i32)> = sqlx::query_as(
                "SELECT meta, data, schema_version FROM archived_jobs
                 WHERE cluster = $1 AND job_id = $2 AND start_time = $3",
            )
            .bind(&job.cluster)
            .bind(job.job_id)
            .bind(job.start_time)
            .fetch_optional(&self.pool)
            .await?;
            let Some((meta, data, version)) = row else {
                continue;
            };
            sqlx::query(
                "INSERT INTO archived_jobs (cluster, job_id, start_time, schema_version, meta, data)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (cluster, job_id, start_time)
                 DO UPDATE SET meta = EXCLUDED.meta, data = EXCLUDED.data",
            )
            .bind(&job.cluster)
            .bind(job.job_id)
            .bind(job.start_time)
            .bind(version)
            .bind(meta)
            .bind(data)
            .execute(&target_pool)
            .await?;
        }
        self.clean_up(jobs).await
    }

    async fn clean(&self, before: i64, after: i64) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query("DELETE FROM archived_jobs WHERE start_time >= $1 AND start_time < $2")
            .bind(after)
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Compression is transparent in Postgres (`jsonb` is already
    /// TOAST-compressed by the server); this only flips the bookkeeping
    /// flag so `compress_last`'s watermark scan has something to check.
    async fn compress(&self, jobs: &[ArchiveEntry]) -> Result<()> {
        self.ensure_schema().await?;
        for job in jobs {
            sqlx::query(
                "UPDATE archived_jobs SET compressed = TRUE
                 WHERE cluster = $1 AND job_id = $2 AND start_time = $3",
            )
            .bind(&job.cluster)
            .bind(job.job_id)
            .bind(job.start_time)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn compress_last(&self, before: i64) -> Result<i64> {
        self.ensure_schema().await?;
        let watermark = self.compress_watermark().await?;
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT cluster, job_id, start_time FROM archived_jobs
             WHERE start_time >= $1 AND start_time < $2 AND NOT compressed",
        )
        .bind(watermark)
        .bind(before)
        .fetch_all(&self.pool)
        .await?;
        let jobs: Vec<ArchiveEntry> = rows
            .into_iter()
            .map(|(cluster, job_id, start_time)| ArchiveEntry {
                cluster,
                job_id,
                start_time,
            })
            .collect();
        let count = jobs.len() as i64;
        self.compress(&jobs).await?;
        self.set_compress_watermark(before).await?;
        Ok(count)
    }
}
