//! The run driver: owns the global state, the client registry and the random
//! source, and executes warm-up to completion before joint training.

use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;

use fed_core::GlobalModelState;
use local_update::{
    ArtifactExporter, ClassifierUpdate, EvaluationGateway, GeneratorUpdate, Partition,
};

use crate::checkpoint;
use crate::config::RunConfig;
use crate::error::{OrchestratorError, Result};
use crate::registry::Registry;
use crate::rounds::RoundReport;
use crate::selector::ParticipantSelector;
use crate::state::RunState;

/// The external collaborators of a run, behind the contracts in
/// `local_update`.
pub struct Contracts<C, G, E, X> {
    pub classifier: C,
    pub generator: G,
    pub evaluator: E,
    pub exporter: X,
}

/// An initialized federated run, ready to execute.
pub struct Run<C, G, E, X> {
    pub(crate) cfg: RunConfig,
    pub(crate) selector: ParticipantSelector,
    pub(crate) registry: Registry,
    pub(crate) rng: StdRng,
    pub(crate) state: RunState,
    pub(crate) contracts: Contracts<C, G, E, X>,
}

/// What a finished run leaves behind.
#[derive(Debug)]
pub struct RunSummary {
    pub best_accuracy: Vec<f32>,
    pub reports: Vec<RoundReport>,
    pub checkpoint: PathBuf,
    pub global: GlobalModelState,
}

impl<C, G, E, X> Run<C, G, E, X>
where
    C: ClassifierUpdate + Sync,
    G: GeneratorUpdate + Sync,
    E: EvaluationGateway,
    X: ArtifactExporter,
{
    /// Validates the configuration against the initial state and registers
    /// one client per partition.
    pub fn new(
        cfg: RunConfig,
        initial: GlobalModelState,
        partitions: Vec<Partition>,
        contracts: Contracts<C, G, E, X>,
    ) -> Result<Self> {
        let cfg = cfg.normalized();
        cfg.validate()?;

        if partitions.len() != cfg.num_clients {
            return Err(OrchestratorError::InvalidConfig(format!(
                "{} partitions for {} clients",
                partitions.len(),
                cfg.num_clients
            )));
        }
        if initial.num_groups() != cfg.num_groups {
            return Err(OrchestratorError::InvalidConfig(format!(
                "{} classifier snapshots for {} groups",
                initial.num_groups(),
                cfg.num_groups
            )));
        }
        for (group, classifier) in initial.classifiers.iter().enumerate() {
            if let Err(e) = initial
                .extractor
                .check_layout(&classifier.subset(&cfg.extractor_prefix))
            {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "group {group} does not embed the shared extractor: {e}"
                )));
            }
        }

        let registry = Registry::new(
            partitions,
            cfg.num_groups,
            &initial.generator,
            &initial.critic,
        )?;
        Ok(Self {
            selector: ParticipantSelector::new(cfg.participation),
            registry,
            rng: StdRng::seed_from_u64(cfg.seed),
            state: RunState::new(initial),
            cfg,
            contracts,
        })
    }

    /// Runs the full schedule: warm-up first, then joint training, then the
    /// final generator checkpoint.
    pub fn execute(mut self) -> Result<RunSummary> {
        log::info!(
            "run {}: {} clients in {} groups, {} warm-up + {} joint rounds, seed {}",
            self.cfg.run_name,
            self.cfg.num_clients,
            self.cfg.num_groups,
            self.cfg.warmup_rounds,
            self.cfg.joint_rounds,
            self.cfg.seed,
        );

        self.warmup_phase()?;
        self.joint_phase()?;

        let checkpoint = checkpoint::save_generator(
            &self.cfg.output_dir,
            &self.cfg.run_name,
            self.cfg.seed,
            &self.state.global.generator,
        )?;
        log::info!("saved generator checkpoint to {}", checkpoint.display());

        Ok(RunSummary {
            best_accuracy: self.state.best_accuracy,
            reports: self.state.reports,
            checkpoint,
            global: self.state.global,
        })
    }
}
