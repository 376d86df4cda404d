//! Round-based orchestration of generator-aided federated training.
//!
//! A population of clients jointly learns per-group classifiers sharing a
//! feature extractor, plus a shared generator that synthesizes feature-space
//! samples to pad out scarce local data. The orchestrator selects
//! participants each round, dispatches deep copies of global state to the
//! client-update contracts, and merges the returned snapshots back with
//! federated averaging — plain or extractor-aware. Raw client data never
//! moves.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod registry;
pub mod rounds;
pub mod run;
pub mod selector;
pub mod state;

pub use config::{AggregationMode, GeneratorRole, RunConfig};
pub use error::{OrchestratorError, Result};
pub use rounds::{Phase, RoundReport};
pub use run::{Contracts, Run, RunSummary};
pub use selector::ParticipantSelector;
