use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// These lines make the analyzer and driver modules available.
pub mod aggregator;
pub mod fleet;
pub mod parser;
pub mod tracker;
pub mod workload;

/// The port the first leaf node listens on; leaf `i` listens on
/// `LEAF_PORT_BASE + i`. A node's identity in the logs is this port
/// rendered as text.
pub const LEAF_PORT_BASE: u16 = 55010;

/// First character of every candidate evaluation record in a client log.
pub const EVENT_MARKER: char = '!';

/// Marks a failed operation; takes precedence over everything else on the line.
pub const FAILURE_MARKER: &str = "FAIL";
/// Marks a completed download.
pub const OBTAIN_MARKER: &str = "OBTN";
/// Marks a search round-trip.
pub const SEARCH_MARKER: &str = "SRCH";
/// Marks a local file removal.
pub const REMOVE_MARKER: &str = "RMV";

// --- ANALYZER TYPES ---

/// One typed record from a leaf node's client log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// The node downloaded a resource; `resource` is the final log token.
    Obtained { resource: String },
    /// The node ran a search. `results` holds the reconstructed
    /// `[fragment/total]` entries; `raw_tail` is the untouched final
    /// token of the line.
    Searched { results: Vec<String>, raw_tail: String },
    /// The node deleted a resource locally.
    Removed { resource: String },
    /// The underlying operation failed; carries no resource.
    Failed,
}

/// What one node's replay tallied up. Plain counters, immutable once
/// the replay is done.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeConsistencyRecord {
    /// Operations the client actively issued (downloads and searches).
    pub requests: u64,
    /// Operations the node itself reported as failed.
    pub failed: u64,
    /// Repeat downloads of already-held resources.
    pub updates: u64,
    /// Detected inconsistencies (stale search hits, removals of absent resources).
    pub invalid: u64,
}

impl NodeConsistencyRecord {
    /// Fraction of issued requests that were inconsistent. `None` when
    /// the node never issued a request, since 0/0 is undefined.
    pub fn invalid_ratio(&self) -> Option<f64> {
        if self.requests == 0 {
            None
        } else {
            Some(self.invalid as f64 / self.requests as f64)
        }
    }
}

/// Evaluation result for one experiment cohort.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CohortResult {
    /// Per-node tallies, keyed by node id (ordered for stable reports).
    pub records: BTreeMap<String, NodeConsistencyRecord>,
    /// Mean of invalid/requests across the cohort.
    pub mean_invalid_ratio: f64,
}
