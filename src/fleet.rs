//! Owned registry of the processes one driver run launches.
//!
//! Every spawn hands its child handle to the registry, and teardown
//! walks the registry terminating each handle individually -- never a
//! broadcast kill by process name, which could hit unrelated processes.

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStdin, Command};

/// How long a process gets to exit after SIGTERM before it is killed.
const TERM_GRACE: Duration = Duration::from_secs(2);

struct ManagedProcess {
    name: String,
    child: Child,
}

/// The peer and leaf-node processes owned by one driver run.
#[derive(Default)]
pub struct ProcessFleet {
    processes: Vec<ManagedProcess>,
}

impl ProcessFleet {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Launches one peer-tier process as `<bin> <id> <config>`, detached
    /// from our stdio.
    pub fn spawn_peer(&mut self, bin: &Path, id: usize, config: &Path) -> Result<()> {
        let child = Command::new(bin)
            .arg(id.to_string())
            .arg(config)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch peer {} ({})", id, bin.display()))?;
        info!("peer {} up (pid {:?})", id, child.id());
        self.processes.push(ManagedProcess {
            name: format!("peer-{}", id),
            child,
        });
        Ok(())
    }

    /// Launches one leaf-node process as `<bin> <id> <config> <files_dir>`.
    ///
    /// An interactive node gets a piped stdin; the pipe end is handed
    /// back so the injection task can own it, while the child handle
    /// stays in the registry.
    pub fn spawn_leaf(
        &mut self,
        bin: &Path,
        id: usize,
        config: &Path,
        files_dir: &Path,
        interactive: bool,
    ) -> Result<Option<ChildStdin>> {
        let stdin = if interactive {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut child = Command::new(bin)
            .arg(id.to_string())
            .arg(config)
            .arg(files_dir)
            .stdin(stdin)
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch leaf node {} ({})", id, bin.display()))?;
        let pipe = if interactive { child.stdin.take() } else { None };
        info!(
            "leaf node {} up (pid {:?}, interactive: {})",
            id,
            child.id(),
            interactive
        );
        self.processes.push(ManagedProcess {
            name: format!("leaf-{}", id),
            child,
        });
        Ok(pipe)
    }

    /// Terminates every owned process: SIGTERM to all, one grace period,
    /// then a hard kill for whatever is still running. Best effort --
    /// teardown failures are logged, never raised.
    pub async fn terminate_all(&mut self) {
        info!("terminating {} processes", self.processes.len());
        for process in &self.processes {
            if let Some(pid) = process.child.id() {
                // Safety: plain kill(2) on a pid we spawned and still own.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }
        tokio::time::sleep(TERM_GRACE).await;

        for process in &mut self.processes {
            match process.child.try_wait() {
                Ok(Some(status)) => info!("{} exited with {}", process.name, status),
                Ok(None) => match process.child.kill().await {
                    Ok(()) => info!("{} killed", process.name),
                    Err(e) => warn!("failed to kill {}: {}", process.name, e),
                },
                Err(e) => warn!("could not poll {}: {}", process.name, e),
            }
        }
        self.processes.clear();
    }
}
