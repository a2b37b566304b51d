//! Cohort-level evaluation: run the tracker over every node's log and
//! derive the cohort's mean inconsistency ratio.

use crate::tracker;
use crate::CohortResult;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Evaluates one cohort, given one (node id, client log) pair per member.
///
/// Fails -- rather than dividing by zero or silently skewing the mean --
/// when the cohort is empty, when any node issued no requests, or when
/// any log cannot be replayed. One bad member aborts the whole cohort.
pub fn evaluate_cohort(cohort: &[(String, PathBuf)]) -> Result<CohortResult> {
    if cohort.is_empty() {
        bail!("cohort is empty, nothing to evaluate");
    }

    let mut records = BTreeMap::new();
    for (node_id, log_path) in cohort {
        let file = File::open(log_path).with_context(|| {
            format!("cannot open log for node {}: {}", node_id, log_path.display())
        })?;
        let record = tracker::replay(node_id, BufReader::new(file))
            .with_context(|| format!("replay failed for node {}", node_id))?;
        debug!("node {}: {:?}", node_id, record);
        records.insert(node_id.clone(), record);
    }

    let mut ratio_sum = 0.0;
    for (node_id, record) in &records {
        match record.invalid_ratio() {
            Some(ratio) => ratio_sum += ratio,
            None => bail!(
                "node {} issued no requests, its invalid ratio is undefined",
                node_id
            ),
        }
    }
    let mean_invalid_ratio = ratio_sum / records.len() as f64;

    info!(
        "evaluated {} nodes, mean invalid ratio {:.4}",
        records.len(),
        mean_invalid_ratio
    );
    Ok(CohortResult {
        records,
        mean_invalid_ratio,
    })
}

/// Builds a cohort from a directory of client logs.
///
/// Every `<id>_client.log` file contributes one member whose node id is
/// the filename prefix before the first `_`.
pub fn discover_cohort(logs_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(logs_dir)
        .with_context(|| format!("cannot read log directory {}", logs_dir.display()))?;

    let mut cohort = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !name.ends_with("_client.log") {
            continue;
        }
        match name.split('_').next() {
            Some(id) if !id.is_empty() => cohort.push((id.to_string(), path)),
            _ => continue,
        }
    }

    if cohort.is_empty() {
        bail!("no *_client.log files found in {}", logs_dir.display());
    }
    // Directory iteration order is not stable; the report should be.
    cohort.sort();
    Ok(cohort)
}
