//! Job and Resource types: the input to every core call.

use serde::{Deserialize, Serialize};

use super::topology::{AcceleratorId, HwThreadId};

/// One host's contribution to a job: which hardware-threads and
/// accelerators of that host the job actually used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub hostname: String,
    #[serde(default)]
    pub hw_threads: Option<Vec<HwThreadId>>,
    #[serde(default)]
    pub accelerators: Option<Vec<AcceleratorId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: i64,
    pub cluster: String,
    #[serde(default)]
    pub sub_cluster: Option<String>,
    pub start_time: i64,
    pub duration: i64,
    pub num_nodes: u32,
    #[serde(default)]
    pub num_accelerators: u32,
    pub resources: Vec<Resource>,
}

impl Job {
    pub fn end_time(&self) -> i64 {
        self.start_time + self.duration
    }

    pub fn hostnames(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.hostname.as_str()).collect()
    }
}
