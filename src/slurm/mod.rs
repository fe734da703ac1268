//! Raw report acquisition from the Slurm command-line tools.

pub mod command;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use self::command::CommandSource;

/// Errors that can occur while producing a raw report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("spawning {command}: {source}")]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading output of {command}: {source}")]
    Io {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Exit {
        command: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: PathBuf, timeout: Duration },
}

impl ReportError {
    /// Short label for the `source` dimension of error counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Io { .. } => "io",
            Self::Exit { .. } => "exit",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Produces the raw reports the collectors parse.
pub trait ReportSource: Send + Sync {
    /// Partition list, one name per line (`sinfo -h -o %R`).
    fn partitions(&self) -> Result<Vec<u8>, ReportError>;

    /// Node state rows `count|state|features` for one partition.
    fn node_states(&self, partition: &str) -> Result<Vec<u8>, ReportError>;

    /// One line per node (`scontrol show nodes -o`).
    fn node_list(&self) -> Result<Vec<u8>, ReportError>;

    /// Scheduler diagnostics (`sdiag`).
    fn diagnostics(&self) -> Result<Vec<u8>, ReportError>;
}
