use std::{fmt, io};

use fed_core::CoreErr;
use local_update::UpdateErr;

/// The orchestrator's result type.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can abort a federated run. Fatal errors carry the round
/// index and the failing component; the run does not attempt partial
/// recovery or retry a failed client dispatch.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration — caught before the first round.
    InvalidConfig(String),
    /// Aggregating a round's contributions failed.
    Aggregation { round: usize, source: CoreErr },
    /// A client returned a snapshot that does not match the layout it was
    /// dispatched with.
    ContractViolation {
        round: usize,
        client: usize,
        source: CoreErr,
    },
    /// A client's update contract failed.
    Client {
        round: usize,
        client: usize,
        source: UpdateErr,
    },
    /// The evaluation gateway failed for one group.
    Evaluation {
        round: usize,
        group: usize,
        source: UpdateErr,
    },
    /// The artifact exporter failed.
    Artifact { round: usize, source: UpdateErr },
    /// An underlying I/O error (checkpoint persistence).
    Io(io::Error),
    /// Snapshot (de)serialization failed.
    Serde(serde_json::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Aggregation { round, source } => {
                write!(f, "aggregation failed at round {round}: {source}")
            }
            Self::ContractViolation {
                round,
                client,
                source,
            } => write!(
                f,
                "client {client} violated the update contract at round {round}: {source}"
            ),
            Self::Client {
                round,
                client,
                source,
            } => write!(f, "client {client} failed at round {round}: {source}"),
            Self::Evaluation {
                round,
                group,
                source,
            } => write!(f, "evaluating group {group} failed at round {round}: {source}"),
            Self::Artifact { round, source } => {
                write!(f, "artifact export failed at round {round}: {source}")
            }
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Serde(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Aggregation { source, .. } | Self::ContractViolation { source, .. } => {
                Some(source)
            }
            Self::Client { source, .. }
            | Self::Evaluation { source, .. }
            | Self::Artifact { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            Self::Serde(e) => Some(e),
            Self::InvalidConfig(_) => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e)
    }
}
