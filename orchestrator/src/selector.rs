use rand::Rng;
use rand::seq::index;

use crate::error::{OrchestratorError, Result};

/// Samples the subset of registered clients that participates in a round.
///
/// Selection is uniform without replacement and fresh every round; the only
/// memory across rounds is the externally seeded random source, so a run is
/// reproducible from its seed alone.
#[derive(Debug, Clone, Copy)]
pub struct ParticipantSelector {
    fraction: f32,
}

impl ParticipantSelector {
    pub fn new(fraction: f32) -> Self {
        Self { fraction }
    }

    /// Picks `max(round(fraction * total), 1)` distinct client ids.
    pub fn select<R: Rng>(&self, total: usize, rng: &mut R) -> Result<Vec<usize>> {
        if total == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "cannot select participants from zero registered clients".into(),
            ));
        }
        let m = ((self.fraction * total as f32).round() as usize)
            .max(1)
            .min(total);
        let mut ids = index::sample(rng, total, m).into_vec();
        // Stable dispatch order; the draw itself stays uniform.
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn selection_size_and_distinctness() {
        let mut rng = StdRng::seed_from_u64(3);
        for (total, fraction, expected) in
            [(10, 0.5, 5), (10, 1.0, 10), (4, 0.26, 1), (7, 0.5, 4)]
        {
            let sel = ParticipantSelector::new(fraction);
            for _ in 0..50 {
                let ids = sel.select(total, &mut rng).unwrap();
                assert_eq!(ids.len(), expected);
                let mut dedup = ids.clone();
                dedup.dedup();
                assert_eq!(dedup, ids);
                assert!(ids.iter().all(|&id| id < total));
            }
        }
    }

    #[test]
    fn tiny_fraction_still_selects_one() {
        let mut rng = StdRng::seed_from_u64(0);
        let ids = ParticipantSelector::new(0.001).select(100, &mut rng).unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn zero_clients_is_a_configuration_error() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            ParticipantSelector::new(0.5).select(0, &mut rng),
            Err(OrchestratorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn every_client_is_eventually_sampled() {
        let mut rng = StdRng::seed_from_u64(42);
        let sel = ParticipantSelector::new(0.3);
        let mut seen = [false; 10];
        for _ in 0..200 {
            for id in sel.select(10, &mut rng).unwrap() {
                seen[id] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
