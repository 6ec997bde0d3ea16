//! Error types for ARP table acquisition and gateway lookup.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Failure to produce an ARP table. Never conflated with "table was empty".
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("unexpected ARP table format: {0}")]
    Format(String),
}

/// Failure to find the default route. Swallowed by the gateway resolver.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("no default route found")]
    NoDefaultRoute,

    #[error("invalid gateway address {0:?}")]
    InvalidGateway(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    Status { program: String, status: ExitStatus },

    #[error("{program} did not finish within {}ms", .timeout.as_millis())]
    Timeout { program: String, timeout: Duration },
}

impl AcquisitionError {
    /// Short stable label, used as a metric label value.
    pub fn reason(&self) -> &'static str {
        match self {
            AcquisitionError::Io { .. } => "io",
            AcquisitionError::Command(CommandError::Timeout { .. }) => "timeout",
            AcquisitionError::Command(_) => "command",
            AcquisitionError::Format(_) => "format",
        }
    }
}
