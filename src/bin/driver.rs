//! Workload driver for the peer-to-peer file distribution testbed.
//!
//! Boots the peer fleet and the leaf-node fleet, types randomized
//! client commands into the interactive leaf nodes, and perturbs the
//! shared file pool while everything runs, producing the client logs
//! the `evaluate` binary consumes.
//!
//! Run examples:
//! # 4 interactive clients against the push configuration
//! cargo run --bin driver -- 4 push
//!
//! # reproducible schedule
//! cargo run --bin driver -- 4 push --seed 7

use anyhow::{bail, Result};
use clap::Parser;
use log::error;
use p2p_consistency_eval::fleet::ProcessFleet;
use p2p_consistency_eval::workload::{self, InjectionConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Settling time for the peer tier before any leaf node starts.
const PEER_SETTLE: Duration = Duration::from_secs(2);
/// Head start each leaf node gets before commands arrive on its stdin.
const LEAF_STARTUP_DELAY: Duration = Duration::from_secs(5);
/// Delay between leaf bring-up and the first file mutation.
const MUTATION_START_DELAY: Duration = Duration::from_secs(3);
/// Idle window after a node's last command, letting propagation play out.
const OBSERVATION_WINDOW: Duration = Duration::from_secs(90);
/// Drain time between the last mutation and the blanket teardown.
const SHUTDOWN_DELAY: Duration = Duration::from_secs(15);
/// Upper bound on the random pause between consecutive commands or mutations.
const PACING: Duration = Duration::from_millis(500);

// ============================================================================
// CLI ARGUMENTS
// ============================================================================

#[derive(Parser)]
#[command(version, about = "Workload driver for the P2P consistency testbed", long_about = None)]
struct Cli {
    /// How many leaf nodes receive synthetic interactive commands
    interactive_count: usize,

    /// Experiment configuration variant (selects <config-dir>/<variant>.cfg)
    variant: String,

    /// Number of peer-tier processes
    #[arg(long, default_value = "10")]
    peers: usize,

    /// Number of leaf-node processes
    #[arg(long, default_value = "19")]
    leaf_nodes: usize,

    /// Commands injected into each interactive node
    #[arg(long, default_value = "500")]
    requests_per_node: usize,

    /// File mutations performed against the working set
    #[arg(long, default_value = "550")]
    mutations: usize,

    /// Seed for the randomized schedule (drawn from entropy when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Directory holding the experiment configuration files
    #[arg(long, default_value = "../config")]
    config_dir: PathBuf,

    /// Directory holding the per-node working directories (n0, n1, ...)
    #[arg(long, default_value = "nodes")]
    nodes_root: PathBuf,

    /// Peer-tier binary
    #[arg(long, default_value = "./super_peer")]
    peer_bin: PathBuf,

    /// Leaf-node binary
    #[arg(long, default_value = "./leaf_node")]
    leaf_bin: PathBuf,
}

// ============================================================================
// DRIVER FLOW
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.interactive_count > cli.leaf_nodes {
        bail!(
            "interactive count {} exceeds leaf fleet size {}",
            cli.interactive_count,
            cli.leaf_nodes
        );
    }

    let config = cli.config_dir.join(format!("{}.cfg", cli.variant));
    let seed = cli.seed.unwrap_or_else(rand::random);

    println!("=== Workload Driver ===");
    println!("  Variant:            {}", cli.variant);
    println!("  Config:             {}", config.display());
    println!("  Peer fleet:         {}", cli.peers);
    println!("  Leaf fleet:         {} ({} interactive)", cli.leaf_nodes, cli.interactive_count);
    println!("  Requests per node:  {}", cli.requests_per_node);
    println!("  File mutations:     {}", cli.mutations);
    println!("  Seed:               {}", seed);

    // 1. Bring up the peer tier and let it settle.
    let mut fleet = ProcessFleet::new();
    for id in 0..cli.peers {
        fleet.spawn_peer(&cli.peer_bin, id, &config)?;
    }
    sleep(PEER_SETTLE).await;

    // 2. The working set: the seeded content of the non-interactive nodes.
    let working_set = Arc::new(workload::scan_working_set(
        &cli.nodes_root,
        cli.interactive_count,
        cli.leaf_nodes,
    )?);
    println!("Working set: {} shareable files", working_set.len());

    // 3. Leaf fleet; every interactive node gets its own injection task
    //    so request arrival is interleaved across nodes, not serialized.
    let injection = InjectionConfig {
        iterations: cli.requests_per_node,
        startup_delay: LEAF_STARTUP_DELAY,
        observation_window: OBSERVATION_WINDOW,
        max_pacing: PACING,
    };
    let mut injectors = Vec::new();
    for id in 0..cli.leaf_nodes {
        let interactive = id < cli.interactive_count;
        let files_dir = cli.nodes_root.join(format!("n{}", id));
        let stdin = fleet.spawn_leaf(&cli.leaf_bin, id, &config, &files_dir, interactive)?;
        if let Some(stdin) = stdin {
            let working_set = Arc::clone(&working_set);
            let injection = injection.clone();
            // Per-node sub-seed: independent streams, all pinned by one seed.
            let node_seed = seed.wrapping_add(id as u64 + 1);
            injectors.push(tokio::spawn(async move {
                workload::inject_commands(stdin, id, working_set.as_slice(), node_seed, &injection)
                    .await
            }));
        }
    }

    // 4. Out-of-band content updates, racing the fleet on purpose.
    sleep(MUTATION_START_DELAY).await;
    match workload::mutate_files(&cli.nodes_root, working_set.as_slice(), cli.mutations, seed, PACING).await
    {
        Ok(count) => println!("Mutated working-set files {} times", count),
        Err(e) => error!("mutation loop aborted: {:#}", e),
    }

    // 5. Fixed drain window, then blanket teardown regardless of how far
    //    any injector got.
    sleep(SHUTDOWN_DELAY).await;
    let mut sent_total = 0;
    for injector in &injectors {
        injector.abort();
    }
    for injector in injectors {
        if let Ok(sent) = injector.await {
            sent_total += sent;
        }
    }
    println!("Injected {} commands before teardown", sent_total);

    fleet.terminate_all().await;
    println!("=== Driver finished ===");
    Ok(())
}
