//! Model-state primitives shared by the federation orchestrator and the
//! client-update implementations: weight snapshots, the FedAvg aggregation
//! variants, and Adam optimizer state that survives across rounds.

pub mod aggregate;
pub mod error;
pub mod optim;
pub mod params;

pub use aggregate::{fed_avg, fed_avg_extractor_aware, fed_avg_groups};
pub use error::{CoreErr, Result};
pub use optim::{AdamHyper, AdamState};
pub use params::{GlobalModelState, Tensor, WeightSnapshot};
