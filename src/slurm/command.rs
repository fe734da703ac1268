use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::debug;

use super::{ReportError, ReportSource};
use crate::config::SlurmConfig;

/// Node state row format: node count, compact state, active features.
const NODE_STATE_FORMAT: &str = "%D|%T|%b";

/// Runs the Slurm binaries configured in [`SlurmConfig`].
///
/// The [`ReportSource`] methods block the calling thread and must not be
/// called from an async task. Collectors call them from the blocking pool.
#[derive(Debug, Clone)]
pub struct CommandSource {
    sinfo: PathBuf,
    sdiag: PathBuf,
    scontrol: PathBuf,
    search_path: String,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(cfg: &SlurmConfig) -> Self {
        Self {
            sinfo: cfg.sinfo.clone(),
            sdiag: cfg.sdiag.clone(),
            scontrol: cfg.scontrol.clone(),
            search_path: cfg.search_path.clone(),
            timeout: cfg.timeout,
        }
    }

    fn run(&self, program: &Path, args: &[&str]) -> Result<Vec<u8>, ReportError> {
        block_on(
            program,
            run_command(program, args, &self.search_path, self.timeout),
        )?
    }
}

impl ReportSource for CommandSource {
    fn partitions(&self) -> Result<Vec<u8>, ReportError> {
        self.run(&self.sinfo, &["-h", "-o", "%R"])
    }

    fn node_states(&self, partition: &str) -> Result<Vec<u8>, ReportError> {
        self.run(&self.sinfo, &["-h", "-o", NODE_STATE_FORMAT, "-p", partition])
    }

    fn node_list(&self) -> Result<Vec<u8>, ReportError> {
        self.run(&self.scontrol, &["show", "nodes", "-o"])
    }

    fn diagnostics(&self) -> Result<Vec<u8>, ReportError> {
        self.run(&self.sdiag, &[])
    }
}

/// Drive `future` from synchronous code.
///
/// Inside the exporter this runs on a blocking-pool thread and reuses the
/// ambient runtime. Without one, a current-thread runtime is built.
fn block_on<F: Future>(program: &Path, future: F) -> Result<F::Output, ReportError> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle.block_on(future));
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| ReportError::Io {
            command: program.to_path_buf(),
            source,
        })?;

    Ok(rt.block_on(future))
}

/// Run `program` to completion and return its stdout.
///
/// Stdout and stderr are drained together, so a chatty command cannot stall
/// on a full pipe. The child is killed if it outlives `timeout`.
pub async fn run_command(
    program: &Path,
    args: &[&str],
    search_path: &str,
    timeout: Duration,
) -> Result<Vec<u8>, ReportError> {
    let start = Instant::now();

    let child = Command::new(program)
        .args(args)
        .env("PATH", search_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ReportError::Spawn {
            command: program.to_path_buf(),
            source,
        })?;

    // On timeout the child is dropped with the future and killed.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(ReportError::Io {
                command: program.to_path_buf(),
                source,
            })
        }
        Err(_) => {
            return Err(ReportError::Timeout {
                command: program.to_path_buf(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(ReportError::Exit {
            command: program.to_path_buf(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    debug!(
        command = %program.display(),
        bytes = output.stdout.len(),
        stderr_bytes = output.stderr.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "command finished",
    );

    Ok(output.stdout)
}
