//! Consistency analyzer for one cohort of leaf-node client logs.
//!
//! Replays every `<node>_client.log` under the given directory and
//! reports the per-node request/failure/update/invalid tallies plus the
//! cohort's mean invalid ratio.
//!
//! Run examples:
//! # human-readable report
//! cargo run --bin evaluate -- logs/leaf_nodes
//!
//! # machine-readable
//! cargo run --bin evaluate -- logs/leaf_nodes --json

use anyhow::Result;
use clap::Parser;
use p2p_consistency_eval::aggregator;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Consistency analyzer for leaf-node client logs", long_about = None)]
struct Cli {
    /// Directory containing the cohort's *_client.log files
    logs_dir: PathBuf,

    /// Emit the result as JSON instead of a report
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let cohort = aggregator::discover_cohort(&cli.logs_dir)?;
    let result = aggregator::evaluate_cohort(&cohort)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("=== Consistency Report ===");
    println!(
        "Cohort: {} nodes from '{}'",
        result.records.len(),
        cli.logs_dir.display()
    );
    println!();
    println!(
        "  {:<10} {:>9} {:>8} {:>8} {:>8} {:>9}",
        "node", "requests", "failed", "updates", "invalid", "ratio"
    );
    for (node_id, record) in &result.records {
        println!(
            "  {:<10} {:>9} {:>8} {:>8} {:>8} {:>9.4}",
            node_id,
            record.requests,
            record.failed,
            record.updates,
            record.invalid,
            record.invalid_ratio().unwrap_or(0.0)
        );
    }
    println!();
    println!("Mean invalid ratio: {:.4}", result.mean_invalid_ratio);

    Ok(())
}
