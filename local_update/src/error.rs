use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use fed_core::CoreErr;

/// The result type for client-update implementations.
pub type Result<T> = std::result::Result<T, UpdateErr>;

/// Failures raised by a client-update, evaluation, or export implementation.
#[derive(Debug)]
pub enum UpdateErr {
    /// Snapshot or optimizer-state arithmetic failed inside the update.
    Core(CoreErr),
    /// The client's data partition is empty, so no local step can run.
    NoLocalData { client: usize },
    /// Writing an artifact failed.
    Io(io::Error),
}

impl Display for UpdateErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateErr::Core(e) => write!(f, "core error: {e}"),
            UpdateErr::NoLocalData { client } => {
                write!(f, "client {client} has an empty data partition")
            }
            UpdateErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for UpdateErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            UpdateErr::Core(e) => Some(e),
            UpdateErr::Io(e) => Some(e),
            UpdateErr::NoLocalData { .. } => None,
        }
    }
}

impl From<CoreErr> for UpdateErr {
    fn from(value: CoreErr) -> Self {
        Self::Core(value)
    }
}

impl From<io::Error> for UpdateErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
