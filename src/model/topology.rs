//! Hardware topology for one sub-cluster.
//!
//! Kept as arrays of arrays of hardware-thread ids, never as objects
//! pointing at each other, so there is no possibility of a cyclic
//! reference: lookups are explicit linear/`HashMap` search helpers
//! instead of graph traversal.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type HwThreadId = u32;
pub type AcceleratorId = String;

/// One group of hardware-thread ids sharing a core/socket/memory-domain.
pub type Group = Vec<HwThreadId>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// All hardware-thread ids on the node, in ascending order.
    pub node: Vec<HwThreadId>,
    /// Sequence of groups; each group is the hwthreads of one core.
    pub core: Vec<Group>,
    /// Sequence of groups; each group is the hwthreads of one socket.
    pub socket: Vec<Group>,
    /// Sequence of groups; each group is the hwthreads of one memory domain.
    pub memory_domain: Vec<Group>,
    /// Opaque accelerator identifiers available on the node.
    #[serde(default)]
    pub accelerators: Vec<AcceleratorId>,
}

impl Topology {
    /// Index (ascending) of every core that contains at least one of `ids`.
    pub fn cores_covering(&self, ids: &[HwThreadId]) -> Vec<usize> {
        Self::groups_covering(&self.core, ids)
    }

    pub fn sockets_covering(&self, ids: &[HwThreadId]) -> Vec<usize> {
        Self::groups_covering(&self.socket, ids)
    }

    pub fn memory_domains_covering(&self, ids: &[HwThreadId]) -> Vec<usize> {
        Self::groups_covering(&self.memory_domain, ids)
    }

    fn groups_covering(groups: &[Group], ids: &[HwThreadId]) -> Vec<usize> {
        let wanted: HashSet<HwThreadId> = ids.iter().copied().collect();
        groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.iter().any(|id| wanted.contains(id)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Every hardware-thread id in `ids` must appear in `self.node` — the
    /// invariant spec.md §3 places on `Job.Resources`.
    pub fn contains_all(&self, ids: &[HwThreadId]) -> bool {
        let node: HashSet<HwThreadId> = self.node.iter().copied().collect();
        ids.iter().all(|id| node.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo_2x2x4x2() -> Topology {
        // 2 sockets x 4 cores x 2 hwthreads = 16 hwthreads per node.
        let mut core = Vec::new();
        let mut socket = Vec::new();
        let mut node = Vec::new();
        let mut hw = 0u32;
        for s in 0..2 {
            let mut sock_ids = Vec::new();
            for _c in 0..4 {
                let ids = vec![hw, hw + 1];
                core.push(ids.clone());
                sock_ids.extend(ids.clone());
                node.extend(ids);
                hw += 2;
            }
            socket.push(sock_ids);
            let _ = s;
        }
        Topology {
            node,
            core,
            socket,
            memory_domain: vec![],
            accelerators: vec![],
        }
    }

    #[test]
    fn cores_covering_finds_the_right_groups() {
        let t = topo_2x2x4x2();
        assert_eq!(t.cores_covering(&[0, 1]), vec![0]);
        assert_eq!(t.cores_covering(&[1, 2]), vec![0, 1]);
    }

    #[test]
    fn contains_all_respects_the_node_invariant() {
        let t = topo_2x2x4x2();
        assert!(t.contains_all(&[0, 15]));
        assert!(!t.contains_all(&[0, 99]));
    }
}
