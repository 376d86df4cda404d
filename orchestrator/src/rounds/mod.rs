//! Round plumbing shared by the warm-up and joint phases: dispatch over the
//! selected participants, generator-pair refinement and adoption, loss
//! accounting with the −1 sentinel, and the periodic artifact export.

pub mod joint;
pub mod warmup;

use std::mem;

use rayon::prelude::*;

use fed_core::{WeightSnapshot, fed_avg};
use local_update::{
    ArtifactExporter, ClassifierUpdate, EvaluationGateway, GeneratorRequest, GeneratorUpdate,
    NO_LOSS,
};

use crate::config::GeneratorRole;
use crate::error::{OrchestratorError, Result};
use crate::registry::DispatchSlot;
use crate::run::Run;

/// Which phase a round belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Warmup,
    Joint,
}

/// Round-level loss means. Values are [`NO_LOSS`] when the corresponding
/// pass contributed nothing this round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundReport {
    pub round: usize,
    pub phase: Phase,
    pub real_loss: f32,
    pub generated_loss: f32,
    pub generator_loss: f32,
    pub critic_loss: f32,
}

/// Mean over the losses actually contributed this round. The empty set is an
/// expected situation (generator frozen, aid disabled) and yields the
/// sentinel, never a division failure.
pub(crate) fn mean_or_sentinel(losses: &[f32]) -> f32 {
    if losses.is_empty() {
        NO_LOSS
    } else {
        losses.iter().sum::<f32>() / losses.len() as f32
    }
}

/// Collects `loss` unless the client reported the "no steps ran" sentinel.
pub(crate) fn push_loss(dst: &mut Vec<f32>, loss: f32) {
    if loss >= 0.0 {
        dst.push(loss);
    }
}

/// Runs `f` over every checked-out slot, on the rayon pool when `parallel`
/// is set. Client dispatches only read global state and own their slot, so
/// the loop is embarrassingly parallel; all results are collected before
/// returning, which makes the following aggregation a true barrier.
pub(crate) fn dispatch_slots<T, F>(
    parallel: bool,
    slots: &mut [DispatchSlot],
    f: F,
) -> Result<Vec<T>>
where
    F: Fn(&mut DispatchSlot) -> Result<T> + Sync,
    T: Send,
{
    if parallel {
        slots.par_iter_mut().map(|slot| f(slot)).collect()
    } else {
        slots.iter_mut().map(f).collect()
    }
}

/// One round's generator-pair contributions, consumed by adoption.
pub(crate) struct GeneratorRound {
    generator_batch: Vec<WeightSnapshot>,
    critic_batch: Vec<WeightSnapshot>,
    generator_losses: Vec<f32>,
    critic_losses: Vec<f32>,
}

impl<C, G, E, X> Run<C, G, E, X>
where
    C: ClassifierUpdate + Sync,
    G: GeneratorUpdate + Sync,
    E: EvaluationGateway,
    X: ArtifactExporter,
{
    /// Dispatches one generator-refinement update to every participant,
    /// threading each client's persisted optimizer states through the call.
    pub(crate) fn refine_generator(&mut self, participants: &[usize]) -> Result<GeneratorRound> {
        let round = self.state.round;
        let mut slots: Vec<_> = participants
            .iter()
            .map(|&id| self.registry.checkout(id))
            .collect();

        let contributions = {
            let generator = &self.state.global.generator;
            let critic = &self.state.global.critic;
            let contract = &self.contracts.generator;
            let hyper = self.cfg.adam;
            let epochs = self.cfg.generator_epochs;

            dispatch_slots(self.cfg.parallel_dispatch, &mut slots, |slot| {
                let req = GeneratorRequest {
                    client: slot.id,
                    generator: generator.clone(),
                    critic: critic.clone(),
                    opt_generator: mem::take(&mut slot.opt_generator),
                    opt_critic: mem::take(&mut slot.opt_critic),
                    hyper,
                    partition: &slot.partition,
                    epochs,
                };
                let reply = contract.update(req).map_err(|source| {
                    OrchestratorError::Client {
                        round,
                        client: slot.id,
                        source,
                    }
                })?;

                generator.check_layout(&reply.generator).map_err(|source| {
                    OrchestratorError::ContractViolation {
                        round,
                        client: slot.id,
                        source,
                    }
                })?;
                critic.check_layout(&reply.critic).map_err(|source| {
                    OrchestratorError::ContractViolation {
                        round,
                        client: slot.id,
                        source,
                    }
                })?;

                slot.opt_generator = reply.opt_generator;
                slot.opt_critic = reply.opt_critic;
                Ok((
                    reply.generator,
                    reply.critic,
                    reply.generator_loss,
                    reply.critic_loss,
                ))
            })?
        };

        for slot in slots {
            self.registry.checkin(slot);
        }

        let mut outcome = GeneratorRound {
            generator_batch: Vec::with_capacity(contributions.len()),
            critic_batch: Vec::with_capacity(contributions.len()),
            generator_losses: Vec::new(),
            critic_losses: Vec::new(),
        };
        for (generator, critic, generator_loss, critic_loss) in contributions {
            outcome.generator_batch.push(generator);
            outcome.critic_batch.push(critic);
            push_loss(&mut outcome.generator_losses, generator_loss);
            push_loss(&mut outcome.critic_losses, critic_loss);
        }
        Ok(outcome)
    }

    /// Adopts a round of generator contributions via plain averaging.
    /// An empty round keeps the prior global state and reports sentinels.
    pub(crate) fn adopt_generator(&mut self, outcome: GeneratorRound) -> Result<(f32, f32)> {
        if outcome.generator_batch.is_empty() {
            return Ok((NO_LOSS, NO_LOSS));
        }
        let round = self.state.round;
        self.state.global.generator = fed_avg(&outcome.generator_batch, "generator")
            .map_err(|source| OrchestratorError::Aggregation { round, source })?;
        self.state.global.critic = fed_avg(&outcome.critic_batch, "critic")
            .map_err(|source| OrchestratorError::Aggregation { round, source })?;
        Ok((
            mean_or_sentinel(&outcome.generator_losses),
            mean_or_sentinel(&outcome.critic_losses),
        ))
    }

    /// Exports synthetic samples on the configured cadence and on a phase's
    /// final round.
    pub(crate) fn maybe_export(&self, phase_round: usize, last: bool) -> Result<()> {
        if self.cfg.generator == GeneratorRole::Disabled {
            return Ok(());
        }
        if phase_round % self.cfg.sample_every == 0 || last {
            self.contracts
                .exporter
                .export(
                    &self.state.global.generator,
                    self.state.round,
                    self.cfg.sample_count,
                )
                .map_err(|source| OrchestratorError::Artifact {
                    round: self.state.round,
                    source,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_contribution_set_yields_the_sentinel() {
        assert_eq!(mean_or_sentinel(&[]), NO_LOSS);
        assert_eq!(mean_or_sentinel(&[2.0, 4.0]), 3.0);
    }

    #[test]
    fn sentinel_losses_are_not_collected() {
        let mut dst = Vec::new();
        push_loss(&mut dst, 1.5);
        push_loss(&mut dst, NO_LOSS);
        push_loss(&mut dst, 0.0);
        assert_eq!(dst, vec![1.5, 0.0]);
    }
}
