//! Randomized client workload: the commands typed into interactive leaf
//! nodes, and the out-of-band mutations applied to the shared file pool.

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::time::sleep;

use crate::LEAF_PORT_BASE;

/// One shareable file in the working set, tagged with the leaf node
/// that seeds it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SharedFile {
    pub owner_index: usize,
    pub name: String,
}

impl SharedFile {
    /// The owning node's listen port, which is how other nodes address it.
    pub fn owner_port(&self) -> u16 {
        LEAF_PORT_BASE + self.owner_index as u16
    }

    /// Where the file lives on disk, under the nodes root.
    pub fn local_path(&self, nodes_root: &Path) -> PathBuf {
        nodes_root
            .join(format!("n{}", self.owner_index))
            .join("local")
            .join(&self.name)
    }
}

/// The three client verbs an interactive leaf node understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Search,
    Obtain,
    Remove,
}

const VERBS: [Verb; 3] = [Verb::Search, Verb::Obtain, Verb::Remove];

/// Pacing and duration knobs for one injection task.
#[derive(Debug, Clone)]
pub struct InjectionConfig {
    /// Commands to type into the node.
    pub iterations: usize,
    /// Wait before the first command, giving the node time to join.
    pub startup_delay: Duration,
    /// Idle time after the last command, letting propagation play out.
    pub observation_window: Duration,
    /// Upper bound on the random pause between consecutive commands.
    pub max_pacing: Duration,
}

/// Collects the files seeded under the non-interactive leaf nodes'
/// `local/` directories. Those nodes keep serving their seeded content,
/// which makes their files the pool of search/download/removal targets
/// as well as the pool of mutation targets.
pub fn scan_working_set(
    nodes_root: &Path,
    interactive_count: usize,
    leaf_count: usize,
) -> Result<Vec<SharedFile>> {
    let mut files = Vec::new();
    for owner_index in interactive_count..leaf_count {
        let local_dir = nodes_root.join(format!("n{}", owner_index)).join("local");
        let entries = std::fs::read_dir(&local_dir)
            .with_context(|| format!("cannot list seeded files in {}", local_dir.display()))?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                files.push(SharedFile {
                    owner_index,
                    name: name.to_string(),
                });
            }
        }
    }
    if files.is_empty() {
        bail!(
            "no shareable files under {} for nodes {}..{}",
            nodes_root.display(),
            interactive_count,
            leaf_count
        );
    }
    // Directory iteration order is not stable, but the schedule drawn
    // from a given seed must be.
    files.sort();
    Ok(files)
}

/// Draws the next (verb, target) pair from the shared pool.
///
/// Panics on an empty working set; the driver rejects that at startup.
pub fn next_request<'a>(rng: &mut StdRng, working_set: &'a [SharedFile]) -> (Verb, &'a SharedFile) {
    let verb = VERBS[rng.gen_range(0..VERBS.len())];
    let file = &working_set[rng.gen_range(0..working_set.len())];
    (verb, file)
}

/// Renders one command in the leaf node's line-oriented stdin protocol:
/// the verb on its own line, then the parameters one per line. Search
/// names just the file; obtain and remove also name the owning node.
pub fn render_command(verb: Verb, file: &SharedFile) -> String {
    match verb {
        Verb::Search => format!("s\n{}\n", file.name),
        Verb::Obtain => format!("o\n{}\n{}\n", file.owner_port(), file.name),
        Verb::Remove => format!("r\n{}\n{}\n", file.owner_port(), file.name),
    }
}

/// Drives one interactive leaf node: waits out the startup delay, types
/// randomized commands into its stdin at randomized sub-second
/// intervals, then leaves the node to idle through the observation
/// window. Commands are fire-and-forget -- nothing is acknowledged or
/// retried, and a dead pipe just ends the loop early with a warning.
///
/// Returns how many commands were actually written.
pub async fn inject_commands(
    mut stdin: ChildStdin,
    node_index: usize,
    working_set: &[SharedFile],
    seed: u64,
    config: &InjectionConfig,
) -> usize {
    let mut rng = StdRng::seed_from_u64(seed);
    sleep(config.startup_delay).await;

    let mut sent = 0;
    for _ in 0..config.iterations {
        pace(&mut rng, config.max_pacing).await;
        let (verb, file) = next_request(&mut rng, working_set);
        let command = render_command(verb, file);
        if let Err(e) = stdin.write_all(command.as_bytes()).await {
            warn!(
                "leaf {}: stdin write failed after {} commands: {}",
                node_index, sent, e
            );
            return sent;
        }
        if let Err(e) = stdin.flush().await {
            warn!(
                "leaf {}: stdin flush failed after {} commands: {}",
                node_index, sent, e
            );
            return sent;
        }
        sent += 1;
    }

    debug!("leaf {}: injected {} commands, idling", node_index, sent);
    sleep(config.observation_window).await;
    sent
}

/// Simulates out-of-band content updates at the source: truncates
/// randomly chosen working-set files in place, at randomized sub-second
/// intervals. Racing the nodes that concurrently read those files is
/// the scenario under test, not something to guard against.
pub async fn mutate_files(
    nodes_root: &Path,
    working_set: &[SharedFile],
    iterations: usize,
    seed: u64,
    max_pacing: Duration,
) -> Result<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mutated = 0;
    for _ in 0..iterations {
        pace(&mut rng, max_pacing).await;
        let file = &working_set[rng.gen_range(0..working_set.len())];
        let path = file.local_path(nodes_root);
        // An empty rewrite is enough: it bumps the file's mtime and
        // drops its content, which is what the nodes react to.
        std::fs::File::create(&path)
            .with_context(|| format!("cannot rewrite {}", path.display()))?;
        mutated += 1;
        debug!("mutated {} ({}/{})", path.display(), mutated, iterations);
    }
    Ok(mutated)
}

async fn pace(rng: &mut StdRng, max_pacing: Duration) {
    let max_ms = max_pacing.as_millis() as u64;
    if max_ms > 0 {
        sleep(Duration::from_millis(rng.gen_range(0..max_ms))).await;
    }
}
