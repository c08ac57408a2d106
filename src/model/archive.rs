//! Archive-specific metadata: what the archive backend stores separately
//! from time-series data.

use serde::{Deserialize, Serialize};

use super::job::Resource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMeta {
    pub job_id: i64,
    pub cluster: String,
    pub sub_cluster: String,
    pub start_time: i64,
    pub duration: i64,
    pub num_nodes: u32,
    pub num_accelerators: u32,
    pub resources: Vec<Resource>,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
}
