use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used across the core module.
pub type Result<T> = std::result::Result<T, CoreErr>;

/// Failures in snapshot arithmetic and optimizer updates.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreErr {
    /// An aggregation was asked to average zero snapshots of a model that
    /// requires at least one contribution.
    EmptyBatch { model: &'static str },
    /// Two snapshots that must share a layout disagree on a parameter shape.
    LayoutMismatch {
        param: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A parameter present in one snapshot is missing from another.
    MissingParam { param: String },
    /// Optimizer state does not cover a parameter it is asked to update.
    StaleOptimizerState { param: String },
}

impl Display for CoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreErr::EmptyBatch { model } => {
                write!(f, "cannot aggregate an empty batch for {model}")
            }
            CoreErr::LayoutMismatch {
                param,
                got,
                expected,
            } => write!(
                f,
                "layout mismatch on parameter {param}: got shape {got:?}, expected {expected:?}"
            ),
            CoreErr::MissingParam { param } => {
                write!(f, "parameter {param} is missing from a snapshot")
            }
            CoreErr::StaleOptimizerState { param } => {
                write!(f, "optimizer state has no moments for parameter {param}")
            }
        }
    }
}

impl Error for CoreErr {}
