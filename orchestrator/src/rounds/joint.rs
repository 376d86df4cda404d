//! Joint training: the main round loop interleaving classifier-head updates
//! (optionally aided by the shared generator) with generator refinement,
//! each followed by its aggregation step.

use fed_core::{WeightSnapshot, fed_avg_extractor_aware, fed_avg_groups};
use local_update::{
    ArtifactExporter, ClassifierRequest, ClassifierUpdate, EvaluationGateway, GeneratorUpdate,
    NO_LOSS,
};

use crate::config::{AggregationMode, GeneratorRole};
use crate::error::{OrchestratorError, Result};
use crate::rounds::{Phase, RoundReport, dispatch_slots, mean_or_sentinel, push_loss};
use crate::run::Run;

impl<C, G, E, X> Run<C, G, E, X>
where
    C: ClassifierUpdate + Sync,
    G: GeneratorUpdate + Sync,
    E: EvaluationGateway,
    X: ArtifactExporter,
{
    /// Runs all `joint_rounds`; the schedule is fixed-length with no early
    /// stopping. Round indices continue after the warm-up phase.
    pub(crate) fn joint_phase(&mut self) -> Result<()> {
        let warmup = self.cfg.warmup_rounds;
        let total = self.cfg.joint_rounds;

        for i in 1..=total {
            let round = warmup + i;
            self.state.round = round;
            let participants = self.selector.select(self.registry.len(), &mut self.rng)?;

            let (batches, real_losses, generated_losses) =
                self.dispatch_classifiers(round, &participants)?;

            // Generator refinement with the same optimizer-state threading
            // as warm-up; a frozen or disabled generator keeps prior state.
            let (generator_loss, critic_loss) =
                if self.cfg.generator == GeneratorRole::Trainable {
                    let outcome = self.refine_generator(&participants)?;
                    self.adopt_generator(outcome)?
                } else {
                    (NO_LOSS, NO_LOSS)
                };

            // Aggregation is the round's barrier: every contribution above
            // has been collected before global state is rewritten.
            {
                let global = &mut self.state.global;
                match self.cfg.aggregation {
                    AggregationMode::Plain => fed_avg_groups(&mut global.classifiers, &batches),
                    AggregationMode::ExtractorAware => fed_avg_extractor_aware(
                        &mut global.classifiers,
                        &batches,
                        &mut global.extractor,
                        &self.cfg.extractor_prefix,
                    ),
                }
                .map_err(|source| OrchestratorError::Aggregation { round, source })?;
            }

            let real_loss = mean_or_sentinel(&real_losses);
            let generated_loss = mean_or_sentinel(&generated_losses);
            log::info!(
                "round {round:3}: avg loss {real_loss:.3}, gen-sample loss {generated_loss:.3}, \
                 G loss {generator_loss:.3}, D loss {critic_loss:.3}"
            );
            self.state.reports.push(RoundReport {
                round,
                phase: Phase::Joint,
                real_loss,
                generated_loss,
                generator_loss,
                critic_loss,
            });

            let last = i == total;
            if i % self.cfg.eval_every == 0 || last {
                self.evaluate_groups(round)?;
            }
            self.maybe_export(i, last)?;
        }
        Ok(())
    }

    /// Dispatches the classifier update to every participant and buckets the
    /// returned snapshots by group.
    #[allow(clippy::type_complexity)]
    fn dispatch_classifiers(
        &mut self,
        round: usize,
        participants: &[usize],
    ) -> Result<(Vec<Vec<WeightSnapshot>>, Vec<f32>, Vec<f32>)> {
        let mut slots: Vec<_> = participants
            .iter()
            .map(|&id| self.registry.checkout(id))
            .collect();

        let replies = {
            let global = &self.state.global;
            let cfg = &self.cfg;
            let contract = &self.contracts.classifier;
            let aided = cfg.generator != GeneratorRole::Disabled;
            let share_extractor = cfg.aggregation == AggregationMode::ExtractorAware;

            dispatch_slots(cfg.parallel_dispatch, &mut slots, |slot| {
                let reference = &global.classifiers[slot.group];
                let req = ClassifierRequest {
                    client: slot.id,
                    weights: reference.clone(),
                    learning_rate: cfg.classifier_lr,
                    partition: &slot.partition,
                    mode: cfg.training_mode,
                    generator: aided.then_some(&global.generator),
                    extractor: share_extractor.then_some(&global.extractor),
                    extractor_prefix: &cfg.extractor_prefix,
                    real_epochs: cfg.real_epochs,
                    generated_epochs: cfg.generated_epochs,
                };
                let reply = contract.update(req).map_err(|source| {
                    OrchestratorError::Client {
                        round,
                        client: slot.id,
                        source,
                    }
                })?;
                reference.check_layout(&reply.weights).map_err(|source| {
                    OrchestratorError::ContractViolation {
                        round,
                        client: slot.id,
                        source,
                    }
                })?;
                Ok((slot.group, reply))
            })?
        };

        // Classifier dispatch leaves optimizer state untouched.
        for slot in slots {
            self.registry.checkin(slot);
        }

        let mut batches: Vec<Vec<WeightSnapshot>> = vec![Vec::new(); self.cfg.num_groups];
        let mut real_losses = Vec::new();
        let mut generated_losses = Vec::new();
        for (group, reply) in replies {
            batches[group].push(reply.weights);
            push_loss(&mut real_losses, reply.real_loss);
            if let Some(loss) = reply.generated_loss {
                push_loss(&mut generated_losses, loss);
            }
        }
        Ok((batches, real_losses, generated_losses))
    }

    /// Evaluates every group's current snapshot and tracks the best-seen
    /// accuracy per group across the run.
    fn evaluate_groups(&mut self, round: usize) -> Result<()> {
        for (group, weights) in self.state.global.classifiers.iter().enumerate() {
            let eval = self
                .contracts
                .evaluator
                .evaluate(weights, group)
                .map_err(|source| OrchestratorError::Evaluation {
                    round,
                    group,
                    source,
                })?;
            if eval.accuracy > self.state.best_accuracy[group] {
                self.state.best_accuracy[group] = eval.accuracy;
            }
            log::info!(
                "round {round:3}: group {group} test accuracy {:.2}",
                eval.accuracy
            );
        }
        Ok(())
    }
}
