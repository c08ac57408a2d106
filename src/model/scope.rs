//! Metric scope: the hardware granularity a metric sample is produced or
//! requested at, from finest to coarsest.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricScope {
    HardwareThread,
    Core,
    MemoryDomain,
    Socket,
    Accelerator,
    Node,
}

impl MetricScope {
    /// Rank within the CPU hierarchy (hwthread < core < memory-domain <
    /// socket < node). `Accelerator` has no rank here: it is a parallel
    /// axis, only comparable to itself and to `Node` (see `max`).
    fn cpu_rank(self) -> Option<u8> {
        match self {
            MetricScope::HardwareThread => Some(0),
            MetricScope::Core => Some(1),
            MetricScope::MemoryDomain => Some(2),
            MetricScope::Socket => Some(3),
            MetricScope::Node => Some(4),
            MetricScope::Accelerator => None,
        }
    }

    /// The coarser of two scopes, per the planner's coercion rule
    /// `effective = max(native, requested)`.
    ///
    /// `Accelerator` is incomparable with the CPU hierarchy except via
    /// `Node`: `max(Accelerator, Node) == Node`, `max(Accelerator,
    /// Accelerator) == Accelerator`, and any other mix of `Accelerator`
    /// with a CPU scope is undefined here — callers must not ask for it
    /// (the planner skips accelerator metrics entirely before scope
    /// coercion would need to answer that question; see `planner::plan`).
    pub fn max(self, other: MetricScope) -> MetricScope {
        use MetricScope::*;
        match (self, other) {
            (Accelerator, Accelerator) => Accelerator,
            (Accelerator, Node) | (Node, Accelerator) => Node,
            (Accelerator, _) | (_, Accelerator) => {
                // Never reached by the planner (accelerator metrics only ever
                // coerce against accelerator or node scope) but resolved to
                // the non-accelerator side rather than panicking, so a
                // misuse surfaces as a wrong answer instead of a crash.
                if self == Accelerator {
                    other
                } else {
                    self
                }
            }
            _ => {
                let a = self.cpu_rank().expect("non-accelerator has cpu rank");
                let b = other.cpu_rank().expect("non-accelerator has cpu rank");
                if a >= b {
                    self
                } else {
                    other
                }
            }
        }
    }
}

impl fmt::Display for MetricScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricScope::HardwareThread => "hwthread",
            MetricScope::Core => "core",
            MetricScope::MemoryDomain => "memory-domain",
            MetricScope::Socket => "socket",
            MetricScope::Accelerator => "accelerator",
            MetricScope::Node => "node",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationMode {
    Sum,
    Avg,
}

#[cfg(test)]
mod tests {
    use super::*;
    use MetricScope::*;

    #[test]
    fn max_picks_the_coarser_cpu_scope() {
        assert_eq!(HardwareThread.max(Core), Core);
        assert_eq!(Socket.max(HardwareThread), Socket);
        assert_eq!(Node.max(Node), Node);
        assert_eq!(MemoryDomain.max(MemoryDomain), MemoryDomain);
    }

    #[test]
    fn accelerator_only_coerces_via_node() {
        assert_eq!(Accelerator.max(Accelerator), Accelerator);
        assert_eq!(Accelerator.max(Node), Node);
        assert_eq!(Node.max(Accelerator), Node);
    }
}
