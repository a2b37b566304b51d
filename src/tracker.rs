//! Sequential replay of one node's client log against a model of its
//! local state.

use crate::parser;
use crate::{LogEvent, NodeConsistencyRecord};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::BufRead;

/// Tracks what one node believes it holds while its event stream is
/// replayed, and tallies the four observed outcomes.
///
/// The download set is the ground truth for "does this node currently
/// hold resource R": it starts empty and is the only state carried
/// between events. Event order matters -- this is a replay of the log,
/// not a set computation.
#[derive(Debug)]
pub struct NodeTracker {
    node_id: String,
    downloads: HashSet<String>,
    record: NodeConsistencyRecord,
}

impl NodeTracker {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            downloads: HashSet::new(),
            record: NodeConsistencyRecord::default(),
        }
    }

    /// Folds one event into the tally.
    pub fn observe(&mut self, event: &LogEvent) {
        match event {
            LogEvent::Failed => {
                self.record.failed += 1;
            }
            LogEvent::Obtained { resource } => {
                self.record.requests += 1;
                // A repeat download of a held resource is an update
                // signal, not an error.
                if !self.downloads.insert(resource.clone()) {
                    self.record.updates += 1;
                }
            }
            LogEvent::Searched { results, raw_tail } => {
                self.record.requests += 1;
                // A hit on a fragment we already hold, attributed to a
                // node other than ourselves, is a stale view of
                // ownership. One search counts at most once, however
                // many of its results match.
                let stale_hit = results.iter().any(|r| self.downloads.contains(r));
                if stale_hit && !raw_tail.contains(&self.node_id) {
                    self.record.invalid += 1;
                }
            }
            LogEvent::Removed { resource } => {
                // Removing something we never held is itself the
                // inconsistency signal.
                if !self.downloads.remove(resource) {
                    self.record.invalid += 1;
                }
            }
        }
    }

    /// The tally accumulated so far.
    pub fn record(&self) -> NodeConsistencyRecord {
        self.record
    }

    /// Whether the node currently believes it holds `resource`.
    pub fn holds(&self, resource: &str) -> bool {
        self.downloads.contains(resource)
    }
}

/// Replays every line of one client log and yields the node's record.
///
/// Parser errors abort the replay: a malformed candidate record means
/// the counts cannot be trusted.
pub fn replay<R: BufRead>(node_id: &str, reader: R) -> Result<NodeConsistencyRecord> {
    let mut tracker = NodeTracker::new(node_id);
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed reading log line")?;
        let event = parser::parse_line(&line)
            .with_context(|| format!("bad record on line {}", index + 1))?;
        if let Some(event) = event {
            tracker.observe(&event);
        }
    }
    Ok(tracker.record())
}
