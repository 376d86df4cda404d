//! Generator warm-up: a fixed number of rounds training only the shared
//! generator and its critic, before any classifier round is dispatched.

use local_update::{
    ArtifactExporter, ClassifierUpdate, EvaluationGateway, GeneratorUpdate, NO_LOSS,
};

use crate::error::Result;
use crate::rounds::{Phase, RoundReport};
use crate::run::Run;

impl<C, G, E, X> Run<C, G, E, X>
where
    C: ClassifierUpdate + Sync,
    G: GeneratorUpdate + Sync,
    E: EvaluationGateway,
    X: ArtifactExporter,
{
    /// Runs all `warmup_rounds` to completion. With a zero-round warm-up the
    /// phase is a no-op and joint training starts immediately.
    pub(crate) fn warmup_phase(&mut self) -> Result<()> {
        let total = self.cfg.warmup_rounds;
        for round in 1..=total {
            self.state.round = round;
            let participants = self.selector.select(self.registry.len(), &mut self.rng)?;

            let outcome = self.refine_generator(&participants)?;
            let (generator_loss, critic_loss) = self.adopt_generator(outcome)?;

            log::info!(
                "warm-up round {round:3}/{total}: G loss {generator_loss:.3}, D loss {critic_loss:.3}"
            );
            self.state.reports.push(RoundReport {
                round,
                phase: Phase::Warmup,
                real_loss: NO_LOSS,
                generated_loss: NO_LOSS,
                generator_loss,
                critic_loss,
            });

            self.maybe_export(round, round == total)?;
        }
        Ok(())
    }
}
