//! Adam with externally owned state.
//!
//! Federated clients keep momentum across rounds even when they sit out a
//! round, so the moment estimates live in a serializable value that the
//! orchestrator checks out to a client for one dispatch and checks back in
//! afterwards, rather than inside the optimizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreErr, Result};
use crate::params::WeightSnapshot;

/// Adam hyperparameters. Defaults are the usual GAN settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamHyper {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamHyper {
    fn default() -> Self {
        Self {
            learning_rate: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Per-model Adam moments, keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    beta1_t: f32,
    beta2_t: f32,
    v: BTreeMap<String, Vec<f32>>,
    s: BTreeMap<String, Vec<f32>>,
}

impl Default for AdamState {
    /// An empty placeholder, used when moving a client's real state out of
    /// its arena slot for the duration of one dispatch.
    fn default() -> Self {
        Self {
            beta1_t: 1.0,
            beta2_t: 1.0,
            v: BTreeMap::new(),
            s: BTreeMap::new(),
        }
    }
}

impl AdamState {
    /// Fresh state with zeroed moments matching `snapshot`'s layout.
    pub fn zeros_like(snapshot: &WeightSnapshot) -> Self {
        let moments: BTreeMap<String, Vec<f32>> = snapshot
            .iter()
            .map(|(name, t)| (name.clone(), vec![0.0; t.len()]))
            .collect();
        Self {
            beta1_t: 1.0,
            beta2_t: 1.0,
            v: moments.clone(),
            s: moments,
        }
    }

    /// Applies one Adam update to `params` in place.
    pub fn step(
        &mut self,
        hyper: &AdamHyper,
        params: &mut WeightSnapshot,
        grads: &WeightSnapshot,
    ) -> Result<()> {
        params.check_layout(grads)?;

        let AdamHyper {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
        } = *hyper;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1.0 - self.beta1_t;
        let bc2 = 1.0 - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        for (name, tensor) in params.iter_mut() {
            let grad = grads
                .get(name)
                .ok_or_else(|| CoreErr::MissingParam { param: name.clone() })?;
            let (v, s) = match (self.v.get_mut(name), self.s.get_mut(name)) {
                (Some(v), Some(s)) if v.len() == tensor.len() && s.len() == tensor.len() => (v, s),
                _ => return Err(CoreErr::StaleOptimizerState { param: name.clone() }),
            };

            tensor
                .data
                .iter_mut()
                .zip(&grad.data)
                .zip(v.iter_mut())
                .zip(s.iter_mut())
                .for_each(|(((p, g), v), s)| {
                    *v = b1 * *v + (1.0 - b1) * g;
                    *s = b2 * *s + (1.0 - b2) * g.powi(2);
                    *p -= step_size * *v / (s.sqrt() + eps);
                });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Tensor;

    fn snap(data: &[f32]) -> WeightSnapshot {
        let mut s = WeightSnapshot::new();
        s.insert("w", Tensor::new(vec![data.len()], data.to_vec()));
        s
    }

    #[test]
    fn step_moves_params_against_the_gradient() {
        let mut params = snap(&[1.0, 1.0]);
        let grads = snap(&[0.5, -0.5]);
        let mut state = AdamState::zeros_like(&params);

        state.step(&AdamHyper::default(), &mut params, &grads).unwrap();
        let w = &params.get("w").unwrap().data;
        assert!(w[0] < 1.0);
        assert!(w[1] > 1.0);
    }

    #[test]
    fn moments_carry_across_steps() {
        let hyper = AdamHyper::default();
        let grads = snap(&[1.0]);

        // Two steps with threaded state.
        let mut continued = snap(&[0.0]);
        let mut state = AdamState::zeros_like(&continued);
        state.step(&hyper, &mut continued, &grads).unwrap();
        let after_one = continued.clone();
        state.step(&hyper, &mut continued, &grads).unwrap();

        // Second step from a reset state lands somewhere else.
        let mut reset = after_one;
        let mut fresh = AdamState::zeros_like(&reset);
        fresh.step(&hyper, &mut reset, &grads).unwrap();

        assert_ne!(continued, reset);
    }

    #[test]
    fn state_survives_serde() {
        let mut params = snap(&[0.25, -0.25]);
        let grads = snap(&[1.0, 1.0]);
        let hyper = AdamHyper::default();

        let mut state = AdamState::zeros_like(&params);
        state.step(&hyper, &mut params, &grads).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        let mut restored: AdamState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, restored);

        let mut a = params.clone();
        let mut b = params.clone();
        state.step(&hyper, &mut a, &grads).unwrap();
        restored.step(&hyper, &mut b, &grads).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stale_state_is_rejected() {
        let mut params = snap(&[0.0]);
        let grads = snap(&[1.0]);
        let mut state = AdamState::zeros_like(&snap(&[0.0, 0.0]));
        assert!(matches!(
            state.step(&AdamHyper::default(), &mut params, &grads),
            Err(CoreErr::StaleOptimizerState { .. })
        ));
    }
}
