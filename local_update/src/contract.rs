//! The narrow contract between the round scheduler and a client's local
//! training. The scheduler hands over deep copies of global state; a client
//! mutates its copies, returns new snapshots, and never touches global state
//! directly.

use fed_core::{AdamHyper, AdamState, WeightSnapshot};

use crate::error::Result;
use crate::partition::Partition;

/// Loss sentinel for "no local steps ran" / "no contributions this round".
pub const NO_LOSS: f32 = -1.0;

/// Which passes a classifier update runs over the local data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingMode {
    /// Local real data only.
    RealOnly,
    /// Synthetic pass from the shared generator, then the real-data pass.
    RealPlusGenerated,
    /// Synthetic samples only; the real-data pass is skipped.
    GeneratedOnly,
}

/// One classifier-update dispatch for a single client.
#[derive(Debug)]
pub struct ClassifierRequest<'a> {
    pub client: usize,
    /// Deep copy of the client's group weights; owned by the client from
    /// here on.
    pub weights: WeightSnapshot,
    pub learning_rate: f32,
    pub partition: &'a Partition,
    pub mode: TrainingMode,
    /// Shared generator snapshot when the round is generator-aided.
    pub generator: Option<&'a WeightSnapshot>,
    /// Shared extractor snapshot under extractor-aware aggregation.
    pub extractor: Option<&'a WeightSnapshot>,
    /// Parameters under this prefix form the feature extractor; the
    /// synthetic pass starts after it and leaves these parameters alone.
    pub extractor_prefix: &'a str,
    pub real_epochs: usize,
    pub generated_epochs: usize,
}

#[derive(Debug)]
pub struct ClassifierReply {
    pub weights: WeightSnapshot,
    /// Mean real-data loss, or [`NO_LOSS`] if no real step ran.
    pub real_loss: f32,
    /// Mean loss over generator-produced samples, when that pass ran.
    pub generated_loss: Option<f32>,
}

/// One generator-pair dispatch for a single client. Optimizer states are the
/// client's own persisted states, checked out for this dispatch.
#[derive(Debug)]
pub struct GeneratorRequest<'a> {
    pub client: usize,
    pub generator: WeightSnapshot,
    pub critic: WeightSnapshot,
    pub opt_generator: AdamState,
    pub opt_critic: AdamState,
    pub hyper: AdamHyper,
    pub partition: &'a Partition,
    pub epochs: usize,
}

#[derive(Debug)]
pub struct GeneratorReply {
    pub generator: WeightSnapshot,
    pub critic: WeightSnapshot,
    /// Mean generator loss, or [`NO_LOSS`] if no step ran.
    pub generator_loss: f32,
    /// Mean critic loss, or [`NO_LOSS`] if no step ran.
    pub critic_loss: f32,
    pub opt_generator: AdamState,
    pub opt_critic: AdamState,
}

/// Local classifier training over one client's data.
pub trait ClassifierUpdate {
    fn update(&self, req: ClassifierRequest<'_>) -> Result<ClassifierReply>;
}

/// Local generator/critic training over one client's data.
pub trait GeneratorUpdate {
    fn update(&self, req: GeneratorRequest<'_>) -> Result<GeneratorReply>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub accuracy: f32,
    pub loss: f32,
}

/// Held-out evaluation of one group's classifier snapshot.
pub trait EvaluationGateway {
    fn evaluate(&self, weights: &WeightSnapshot, group: usize) -> Result<Evaluation>;
}

/// Periodic synthetic-sample export from the current generator. The core
/// consumes no return value; the artifact lands wherever the exporter puts it.
pub trait ArtifactExporter {
    fn export(&self, generator: &WeightSnapshot, round: usize, sample_count: usize) -> Result<()>;
}
