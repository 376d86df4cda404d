use std::path::PathBuf;

use fed_core::AdamHyper;
use local_update::TrainingMode;

use crate::error::{OrchestratorError, Result};

/// How classifier contributions are merged at a round boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Per-group federated averaging of the full snapshots.
    Plain,
    /// Per-group averaging plus a count-weighted shared-extractor merge
    /// written back into every group.
    ExtractorAware,
}

/// The shared generator's role over the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorRole {
    /// No generator at all: no warm-up, no synthetic pass, no refinement.
    Disabled,
    /// Clients train against the warmed-up generator but never refine it.
    Frozen,
    /// Clients both consume and refine the generator every joint round.
    Trainable,
}

/// Full configuration surface of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_name: String,
    /// Reproducibility seed; drives participant selection and is part of the
    /// checkpoint key.
    pub seed: u64,

    pub num_clients: usize,
    /// Fraction of clients sampled each round, in (0, 1].
    pub participation: f32,
    /// Fraction of the dataset each client holds, in (0, 1].
    pub data_fraction: f32,
    /// Number of classifier groups sharing the feature extractor.
    pub num_groups: usize,

    /// Generator warm-up rounds before any classifier training.
    pub warmup_rounds: usize,
    /// Joint-training rounds after warm-up.
    pub joint_rounds: usize,

    /// Local epochs of the real-data classifier pass.
    pub real_epochs: usize,
    /// Local epochs of the synthetic-sample classifier pass.
    pub generated_epochs: usize,
    /// Local epochs of generator refinement.
    pub generator_epochs: usize,

    pub training_mode: TrainingMode,
    pub generator: GeneratorRole,
    pub aggregation: AggregationMode,

    /// Evaluate every this many joint rounds (and on the final round).
    pub eval_every: usize,
    /// Export samples every this many rounds (and on each phase's final round).
    pub sample_every: usize,
    pub sample_count: usize,

    pub classifier_lr: f32,
    /// Generator/critic Adam hyperparameters.
    pub adam: AdamHyper,

    /// Name prefix of the feature-extractor parameters inside classifier
    /// snapshots.
    pub extractor_prefix: String,
    /// Dispatch the per-round client loop on a thread pool. Aggregation
    /// still waits for every contribution of the round.
    pub parallel_dispatch: bool,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_name: "fedgen".into(),
            seed: 3,
            num_clients: 10,
            participation: 1.0,
            data_fraction: 0.1,
            num_groups: 1,
            warmup_rounds: 400,
            joint_rounds: 0,
            real_epochs: 5,
            generated_epochs: 1,
            generator_epochs: 1,
            training_mode: TrainingMode::RealPlusGenerated,
            generator: GeneratorRole::Trainable,
            aggregation: AggregationMode::ExtractorAware,
            eval_every: 20,
            sample_every: 20,
            sample_count: 100,
            classifier_lr: 0.1,
            adam: AdamHyper::default(),
            extractor_prefix: "fe.".into(),
            parallel_dispatch: false,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl RunConfig {
    /// Collapses the schedule for a disabled generator: no warm-up and no
    /// generator passes, so downstream code never re-checks the role.
    pub fn normalized(mut self) -> Self {
        if self.generator == GeneratorRole::Disabled {
            self.warmup_rounds = 0;
            self.generated_epochs = 0;
            self.generator_epochs = 0;
        }
        self
    }

    pub fn total_rounds(&self) -> usize {
        self.warmup_rounds + self.joint_rounds
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(OrchestratorError::InvalidConfig(msg.into()));
        if self.num_clients == 0 {
            return fail("num_clients must be positive");
        }
        if self.num_groups == 0 {
            return fail("num_groups must be positive");
        }
        if self.num_groups > self.num_clients {
            return fail("num_groups cannot exceed num_clients");
        }
        if !(self.participation > 0.0 && self.participation <= 1.0) {
            return fail("participation must be in (0, 1]");
        }
        if !(self.data_fraction > 0.0 && self.data_fraction <= 1.0) {
            return fail("data_fraction must be in (0, 1]");
        }
        if self.total_rounds() == 0 {
            return fail("the schedule has zero rounds");
        }
        if self.eval_every == 0 || self.sample_every == 0 {
            return fail("eval_every and sample_every must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RunConfig {
        RunConfig {
            warmup_rounds: 1,
            ..RunConfig::default()
        }
    }

    #[test]
    fn default_schedule_validates() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn zero_clients_and_zero_groups_are_rejected() {
        for cfg in [
            RunConfig {
                num_clients: 0,
                ..base()
            },
            RunConfig {
                num_groups: 0,
                ..base()
            },
            RunConfig {
                num_groups: 11,
                ..base()
            },
            RunConfig {
                participation: 0.0,
                ..base()
            },
            RunConfig {
                warmup_rounds: 0,
                joint_rounds: 0,
                ..base()
            },
        ] {
            assert!(matches!(
                cfg.validate(),
                Err(OrchestratorError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn disabled_generator_collapses_the_schedule() {
        let cfg = RunConfig {
            generator: GeneratorRole::Disabled,
            warmup_rounds: 40,
            joint_rounds: 5,
            ..base()
        }
        .normalized();
        assert_eq!(cfg.warmup_rounds, 0);
        assert_eq!(cfg.generated_epochs, 0);
        assert_eq!(cfg.generator_epochs, 0);
        assert_eq!(cfg.total_rounds(), 5);
    }
}
