//! On-disk archive: `<root>/<cluster>/<jobId/1000>/<jobId%1000>/<startTime>/`
//! holding `meta.json` and `data.json` (or `data.json.gz` once the
//! directory crosses `compress.txt`'s age watermark). Writes go to a
//! `.tmp` sibling and are `rename`d into place so a reader never observes
//! a half-written job.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use super::{ArchiveBackend, ArchiveEntry, ARCHIVE_VERSION};
use crate::config::{ArchiveConfig, ClusterConfig};
use crate::error::{CoreError, Result};
use crate::model::{ArchiveMeta, JobData};

pub struct FileArchive {
    root: PathBuf,
}

#[derive(Deserialize)]
struct FileArchiveFields {
    root: String,
}

impl FileArchive {
    pub fn from_config(config: &ArchiveConfig) -> Result<Self> {
        let fields: FileArchiveFields = serde_json::from_value(config.fields.clone())?;
        let root = PathBuf::from(fields.root);
        std::fs::create_dir_all(&root)?;
        let version_path = root.join("version.txt");
        if version_path.exists() {
            let raw = std::fs::read_to_string(&version_path)?;
            let have: u32 = raw.trim().parse().map_err(|_| {
                CoreError::Decode(format!("malformed version.txt: {raw:?}"))
            })?;
            if have != ARCHIVE_VERSION {
                return Err(CoreError::UnsupportedArchiveVersion {
                    have,
                    need: ARCHIVE_VERSION,
                });
            }
        } else {
            std::fs::write(&version_path, ARCHIVE_VERSION.to_string())?;
        }
        Ok(FileArchive { root })
    }

    fn job_dir(&self, cluster: &str, job_id: i64, start_time: i64) -> PathBuf {
        self.root
            .join(cluster)
            .join((job_id / 1000).to_string())
            .join((job_id % 1000).to_string())
            .join(start_time.to_string())
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(path.parent().expect("job dir has a parent"))?;
        let tmp = path.with_extension("tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(bytes)?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_data(dir: &Path) -> Result<JobData> {
        let gz_path = dir.join("data.json.gz");
        if gz_path.exists() {
            let f = std::fs::File::open(&gz_path)?;
            let mut decoder = GzDecoder::new(f);
            let mut buf = String::new();
            decoder.read_to_string(&mut buf)?;
            return Ok(serde_json::from_str(&buf)?);
        }
        let plain_path = dir.join("data.json");
        if !plain_path.exists() {
            return Err(CoreError::ArchiveMissing);
        }
        let raw = std::fs::read_to_string(&plain_path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn cluster_config_path(&self, cluster: &str) -> PathBuf {
        self.root.join(cluster).join("cluster.json")
    }

    fn compress_watermark_path(&self) -> PathBuf {
        self.root.join("compress.txt")
    }

    fn compress_watermark(&self) -> i64 {
        std::fs::read_to_string(self.compress_watermark_path())
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(i64::MIN)
    }

    fn set_compress_watermark(&self, value: i64) -> Result<()> {
        std::fs::write(self.compress_watermark_path(), value.to_string())?;
        Ok(())
    }

    /// Every `ArchiveEntry` under `root`, across all clusters, gathered by
    /// walking the top-level cluster directories and delegating to `iter`
    /// per cluster. Used by the cross-cluster lifecycle operations
    /// (`clean`, `compress_last`), which spec.md §4.2 does not scope to a
    /// single cluster the way `Iter` itself is.
    async fn all_entries(&self) -> Vec<ArchiveEntry> {
        let mut out = Vec::new();
        let Ok(top) = std::fs::read_dir(&self.root) else {
            return out;
        };
        for entry in top.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(cluster) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let mut stream = self.iter(&cluster);
            while let Some(result) = stream.next().await {
                if let Ok(e) = result {
                    out.push(e);
                }
            }
        }
        out
    }

    fn compress_one(&self, job: &ArchiveEntry) -> Result<bool> {
        let dir = self.job_dir(&job.cluster, job.job_id, job.start_time);
        let plain_path = dir.join("data.json");
        if !plain_path.exists() {
            return Ok(false);
        }
        let raw = std::fs::read(&plain_path)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let gz = encoder.finish()?;
        Self::write_atomic(&dir.join("data.json.gz"), &gz)?;
        std::fs::remove_file(&plain_path)?;
        Ok(true)
    }
}

#[async_trait]
impl ArchiveBackend for FileArchive {
    async fn exists(&self, cluster: &str, job_id: i64, start_time: i64) -> Result<bool> {
        let dir = self.job_dir(cluster, job_id, start_time);
        Ok(dir.join("meta.json").exists())
    }

    async fn load_job_meta(
        &self,
        cluster: &str,
        job_id: i64,
        start_time: i64,
    ) -> Result<ArchiveMeta> {
        let dir = self.job_dir(cluster, job_id, start_time);
        let path = dir.join("meta.json");
        if !path.exists() {
            return Err(CoreError::ArchiveMissing);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn load_job_data(&self, cluster: &str, job_id: i64, start_time: i64) -> Result<JobData> {
        let dir = self.job_dir(cluster, job_id, start_time);
        Self::read_data(&dir)
    }

    async fn store_job_meta(&self, meta: &ArchiveMeta) -> Result<()> {
        let dir = self.job_dir(&meta.cluster, meta.job_id, meta.start_time);
        let bytes = serde_json::to_vec_pretty(meta)?;
        Self::write_atomic(&dir.join("meta.json"), &bytes)
    }

    async fn store_job_data(
        &self,
        cluster: &str,
        job_id: i64,
        start_time: i64,
        data: &JobData,
    ) -> Result<()> {
        let dir = self.job_dir(cluster, job_id, start_time);
        let raw = serde_json::to_vec(data)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let gz = encoder.finish()?;
        Self::write_atomic(&dir.join("data.json.gz"), &gz)
    }

    async fn import_job(&self, meta: &ArchiveMeta, data: &JobData) -> Result<()> {
        // Write data first, meta last: a reader that only checks
        // meta.json's existence as "job is archived" never observes a
        // meta without its data.
        self.store_job_data(&meta.cluster, meta.job_id, meta.start_time, data)
            .await?;
        self.store_job_meta(meta).await
    }

    fn iter(&self, cluster: &str) -> BoxStream<'_, Result<ArchiveEntry>> {
        let cluster_dir = self.root.join(cluster);
        let mut entries = Vec::new();
        if let Ok(buckets) = std::fs::read_dir(&cluster_dir) {
            for bucket in buckets.flatten() {
                let Ok(subs) = std::fs::read_dir(bucket.path()) else {
                    continue;
                };
                for sub in subs.flatten() {
                    let Ok(starts) = std::fs::read_dir(sub.path()) else {
                        continue;
                    };
                    for start in starts.flatten() {
                        let Some(start_time) = start
                            .file_name()
                            .to_str()
                            .and_then(|s| s.parse::<i64>().ok())
                        else {
                            continue;
                        };
                        let Some(job_id) = bucket
                            .file_name()
                            .to_str()
                            .and_then(|b| b.parse::<i64>().ok())
                            .zip(sub.file_name().to_str().and_then(|s| s.parse::<i64>().ok()))
                            .map(|(hi, lo)| hi * 1000 + lo)
                        else {
                            continue;
                        };
                        entries.push(Ok(ArchiveEntry {
                            cluster: cluster.to_string(),
                            job_id,
                            start_time,
                        }));
                    }
                }
            }
        }
        stream::iter(entries).boxed()
    }

    async fn load_cluster_config(&self, name: &str) -> Result<ClusterConfig> {
        let path = self.cluster_config_path(name);
        if !path.exists() {
            return Err(CoreError::ArchiveMissing);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn store_cluster_config(&self, config: &ClusterConfig) -> Result<()> {
        let path = self.cluster_config_path(&config.name);
        let bytes = serde_json::to_vec_pretty(config)?;
        Self::write_atomic(&path, &bytes)
    }

    async fn clean_up(&self, jobs: &[ArchiveEntry]) -> Result<()> {
        for job in jobs {
            let dir = self.job_dir(&job.cluster, job.job_id, job.start_time);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn move_jobs(&self, jobs: &[ArchiveEntry], target: &str) -> Result<()> {
        let target_root = PathBuf::from(target);
        for job in jobs {
            let src = self.job_dir(&job.cluster, job.job_id, job.start_time);
            if !src.exists() {
                continue;
            }
            let dst = target_root
                .join(&job.cluster)
                .join((job.job_id / 1000).to_string())
                .join((job.job_id % 1000).to_string())
                .join(job.start_time.to_string());
            std::fs::create_dir_all(dst.parent().expect("job dir has a parent"))?;
            std::fs::rename(&src, &dst)?;
        }
        Ok(())
    }

    async fn clean(&self, before: i64, after: i64) -> Result<()> {
        let victims: Vec<ArchiveEntry> = self
            .all_entries()
            .await
            .into_iter()
            .filter(|e| e.start_time >= after && e.start_time < before)
            .collect();
        self.clean_up(&victims).await
    }

    async fn compress(&self, jobs: &[ArchiveEntry]) -> Result<()> {
        for job in jobs {
            self.compress_one(job)?;
        }
        Ok(())
    }

    async fn compress_last(&self, before: i64) -> Result<i64> {
        let watermark = self.compress_watermark();
        let candidates: Vec<ArchiveEntry> = self
            .all_entries()
            .await
            .into_iter()
            .filter(|e| e.start_time >= watermark && e.start_time < before)
            .collect();
        let mut compressed = 0i64;
        for job in &candidates {
            if self.compress_one(job)? {
                compressed += 1;
            }
        }
        self.set_compress_watermark(before)?;
        Ok(compressed)
    }
}
