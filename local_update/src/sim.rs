//! Deterministic in-process clients.
//!
//! Real deployments plug neural-network training in behind the contracts in
//! [`crate::contract`]; the simulated clients here stand in for that layer so
//! the round protocol can be driven end to end without a tensor runtime.
//! Each partition induces a scalar signature, and "training" is quadratic
//! descent toward it: losses shrink monotonically, momentum matters, and
//! every contract detail (sentinels, optimizer threading, layout stability)
//! is exercised for real.

use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use fed_core::{AdamState, GlobalModelState, Tensor, WeightSnapshot};

use crate::contract::{
    ArtifactExporter, ClassifierReply, ClassifierRequest, ClassifierUpdate, Evaluation,
    EvaluationGateway, GeneratorReply, GeneratorRequest, GeneratorUpdate, TrainingMode, NO_LOSS,
};
use crate::error::{Result, UpdateErr};
use crate::partition::Partition;

/// Scalar summary of a partition, in [0, 1). Distinct stripes map to
/// distinct signatures, so clients pull the model in different directions.
fn signature(partition: &Partition) -> f32 {
    let mean =
        partition.indices().iter().sum::<usize>() as f64 / partition.indices().len() as f64;
    ((mean % 97.0) / 97.0) as f32
}

fn mean_param(snapshot: &WeightSnapshot) -> f32 {
    let n = snapshot.num_params();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = snapshot
        .iter()
        .flat_map(|(_, t)| t.data.iter())
        .map(|&x| f64::from(x))
        .sum();
    (sum / n as f64) as f32
}

/// One SGD step of every parameter toward `target`; returns the pre-step
/// mean squared distance. Parameters under `skip_prefix` are left untouched.
fn quad_step(
    weights: &mut WeightSnapshot,
    target: f32,
    lr: f32,
    skip_prefix: Option<&str>,
) -> f32 {
    let mut sum = 0.0f64;
    let mut n = 0usize;
    for (name, tensor) in weights.iter_mut() {
        if skip_prefix.is_some_and(|p| name.starts_with(p)) {
            continue;
        }
        for w in &mut tensor.data {
            let d = *w - target;
            sum += f64::from(d * d);
            n += 1;
            *w -= lr * 2.0 * d;
        }
    }
    if n == 0 {
        NO_LOSS
    } else {
        (sum / n as f64) as f32
    }
}

/// Simulated classifier client. The synthetic pass runs first and only
/// touches head parameters (it starts after the extractor), then the
/// real-data pass updates the whole network, as in generator-aided local
/// training.
#[derive(Debug, Default)]
pub struct SimClassifier;

impl ClassifierUpdate for SimClassifier {
    fn update(&self, req: ClassifierRequest<'_>) -> Result<ClassifierReply> {
        if req.partition.is_empty() {
            return Err(UpdateErr::NoLocalData { client: req.client });
        }
        let target = signature(req.partition);
        let mut weights = req.weights;

        let generated_loss = match (req.generator, req.mode) {
            (Some(generator), TrainingMode::RealPlusGenerated | TrainingMode::GeneratedOnly)
                if req.generated_epochs > 0 =>
            {
                let synthetic_target = mean_param(generator);
                let mut losses = Vec::with_capacity(req.generated_epochs);
                for _ in 0..req.generated_epochs {
                    let loss = quad_step(
                        &mut weights,
                        synthetic_target,
                        req.learning_rate,
                        Some(req.extractor_prefix),
                    );
                    if loss >= 0.0 {
                        losses.push(loss);
                    }
                }
                (!losses.is_empty())
                    .then(|| losses.iter().sum::<f32>() / losses.len() as f32)
            }
            _ => None,
        };

        let real_loss = if req.mode == TrainingMode::GeneratedOnly || req.real_epochs == 0 {
            NO_LOSS
        } else {
            let mut losses = Vec::with_capacity(req.real_epochs);
            for _ in 0..req.real_epochs {
                losses.push(quad_step(&mut weights, target, req.learning_rate, None));
            }
            losses.iter().sum::<f32>() / losses.len() as f32
        };

        log::debug!(
            "client {}: real loss {real_loss:.4}, generated loss {generated_loss:?}",
            req.client
        );
        Ok(ClassifierReply {
            weights,
            real_loss,
            generated_loss,
        })
    }
}

/// Simulated generator-pair client: Adam descent of the generator toward the
/// partition signature and of the critic away from it, through the client's
/// persisted optimizer states.
#[derive(Debug, Default)]
pub struct SimGenerator;

fn quad_grads(weights: &WeightSnapshot, target: f32) -> (WeightSnapshot, f32) {
    let mut grads = weights.clone();
    let mut sum = 0.0f64;
    let mut n = 0usize;
    for (_, tensor) in grads.iter_mut() {
        for g in &mut tensor.data {
            let d = *g - target;
            sum += f64::from(d * d);
            n += 1;
            *g = 2.0 * d;
        }
    }
    let loss = if n == 0 { 0.0 } else { (sum / n as f64) as f32 };
    (grads, loss)
}

impl GeneratorUpdate for SimGenerator {
    fn update(&self, req: GeneratorRequest<'_>) -> Result<GeneratorReply> {
        if req.partition.is_empty() {
            return Err(UpdateErr::NoLocalData { client: req.client });
        }
        let GeneratorRequest {
            client: _,
            mut generator,
            mut critic,
            mut opt_generator,
            mut opt_critic,
            hyper,
            partition,
            epochs,
        } = req;

        let target = signature(partition);
        let mut gen_losses = Vec::with_capacity(epochs);
        let mut critic_losses = Vec::with_capacity(epochs);

        for _ in 0..epochs {
            let (grads, loss) = quad_grads(&generator, target);
            opt_generator.step(&hyper, &mut generator, &grads)?;
            gen_losses.push(loss);

            let (grads, loss) = quad_grads(&critic, 1.0 - target);
            opt_critic.step(&hyper, &mut critic, &grads)?;
            critic_losses.push(loss);
        }

        let mean = |l: &[f32]| {
            if l.is_empty() {
                NO_LOSS
            } else {
                l.iter().sum::<f32>() / l.len() as f32
            }
        };
        Ok(GeneratorReply {
            generator,
            critic,
            generator_loss: mean(&gen_losses),
            critic_loss: mean(&critic_losses),
            opt_generator,
            opt_critic,
        })
    }
}

/// Held-out evaluation surrogate: loss is the mean squared distance to a
/// fixed evaluation target, accuracy its reciprocal mapped to a percentage.
#[derive(Debug)]
pub struct SimEvaluator {
    pub target: f32,
}

impl Default for SimEvaluator {
    fn default() -> Self {
        Self { target: 0.5 }
    }
}

impl EvaluationGateway for SimEvaluator {
    fn evaluate(&self, weights: &WeightSnapshot, _group: usize) -> Result<Evaluation> {
        let mut sum = 0.0f64;
        let mut n = 0usize;
        for (_, tensor) in weights.iter() {
            for &w in &tensor.data {
                let d = w - self.target;
                sum += f64::from(d * d);
                n += 1;
            }
        }
        let loss = if n == 0 { 0.0 } else { (sum / n as f64) as f32 };
        Ok(Evaluation {
            accuracy: 100.0 / (1.0 + loss),
            loss,
        })
    }
}

#[derive(Serialize)]
struct SampleSheet {
    round: usize,
    samples: Vec<f32>,
}

/// Writes a JSON sheet of generator "samples" per export round, one file per
/// round, under `dir`.
#[derive(Debug)]
pub struct SampleSheetExporter {
    pub dir: PathBuf,
    pub run_name: String,
}

impl ArtifactExporter for SampleSheetExporter {
    fn export(&self, generator: &WeightSnapshot, round: usize, sample_count: usize) -> Result<()> {
        let level = mean_param(generator);
        let samples = (0..sample_count)
            .map(|i| level + (i as f32 / sample_count.max(1) as f32 - 0.5) * 1e-3)
            .collect();
        let sheet = SampleSheet { round, samples };

        fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("{}_samples_{round:04}.json", self.run_name));
        let body = serde_json::to_string(&sheet).map_err(std::io::Error::other)?;
        fs::write(&path, body)?;
        log::debug!("wrote sample sheet {}", path.display());
        Ok(())
    }
}

fn random_tensor(shape: Vec<usize>, rng: &mut StdRng) -> Tensor {
    let len = shape.iter().product();
    let data = (0..len).map(|_| rng.random_range(-0.5..0.5)).collect();
    Tensor::new(shape, data)
}

/// Freshly constructed global state for demos and tests: a shared extractor,
/// per-group classifiers with group-specific head widths, and a small
/// generator/critic pair.
pub fn demo_state(num_groups: usize, seed: u64) -> GlobalModelState {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut extractor = WeightSnapshot::new();
    extractor.insert("fe.w0", random_tensor(vec![4, 3], &mut rng));
    extractor.insert("fe.b0", random_tensor(vec![4], &mut rng));

    let classifiers = (0..num_groups)
        .map(|g| {
            let mut snapshot = extractor.clone();
            snapshot.insert("head.w1", random_tensor(vec![3 + g, 4], &mut rng));
            snapshot.insert("head.b1", random_tensor(vec![3 + g], &mut rng));
            snapshot
        })
        .collect();

    let mut generator = WeightSnapshot::new();
    generator.insert("gen.w0", random_tensor(vec![6], &mut rng));
    generator.insert("gen.b0", random_tensor(vec![3], &mut rng));

    let mut critic = WeightSnapshot::new();
    critic.insert("critic.w0", random_tensor(vec![6], &mut rng));
    critic.insert("critic.b0", random_tensor(vec![3], &mut rng));

    GlobalModelState {
        classifiers,
        extractor,
        generator,
        critic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fed_core::AdamHyper;

    fn request<'a>(
        weights: WeightSnapshot,
        partition: &'a Partition,
        generator: Option<&'a WeightSnapshot>,
        mode: TrainingMode,
    ) -> ClassifierRequest<'a> {
        ClassifierRequest {
            client: 0,
            weights,
            learning_rate: 0.1,
            partition,
            mode,
            generator,
            extractor: None,
            extractor_prefix: "fe.",
            real_epochs: 2,
            generated_epochs: 1,
        }
    }

    #[test]
    fn classifier_reply_preserves_layout_and_losses_shrink() {
        let state = demo_state(1, 7);
        let partition = Partition::even_split(100, 4, 0.4).remove(1);
        let dispatched = state.classifiers[0].clone();

        let first = SimClassifier
            .update(request(
                dispatched.clone(),
                &partition,
                None,
                TrainingMode::RealOnly,
            ))
            .unwrap();
        dispatched.check_layout(&first.weights).unwrap();
        assert!(first.real_loss >= 0.0);
        assert!(first.generated_loss.is_none());

        let second = SimClassifier
            .update(request(
                first.weights,
                &partition,
                None,
                TrainingMode::RealOnly,
            ))
            .unwrap();
        assert!(second.real_loss < first.real_loss);
    }

    #[test]
    fn generated_only_reports_real_sentinel_and_keeps_extractor() {
        let state = demo_state(1, 11);
        let partition = Partition::even_split(100, 4, 0.4).remove(2);
        let before = state.classifiers[0].clone();

        let reply = SimClassifier
            .update(request(
                before.clone(),
                &partition,
                Some(&state.generator),
                TrainingMode::GeneratedOnly,
            ))
            .unwrap();

        assert_eq!(reply.real_loss, NO_LOSS);
        assert!(reply.generated_loss.is_some());
        // The synthetic pass starts after the extractor.
        assert_eq!(reply.weights.subset("fe."), before.subset("fe."));
        assert_ne!(reply.weights.subset("head."), before.subset("head."));
    }

    #[test]
    fn generator_update_with_zero_epochs_is_a_no_op() {
        let state = demo_state(1, 3);
        let partition = Partition::even_split(50, 2, 0.5).remove(0);
        let reply = SimGenerator
            .update(GeneratorRequest {
                client: 0,
                generator: state.generator.clone(),
                critic: state.critic.clone(),
                opt_generator: AdamState::zeros_like(&state.generator),
                opt_critic: AdamState::zeros_like(&state.critic),
                hyper: AdamHyper::default(),
                partition: &partition,
                epochs: 0,
            })
            .unwrap();
        assert_eq!(reply.generator, state.generator);
        assert_eq!(reply.generator_loss, NO_LOSS);
        assert_eq!(reply.critic_loss, NO_LOSS);
    }

    #[test]
    fn empty_partition_is_rejected() {
        let state = demo_state(1, 3);
        let partition = Partition::new(vec![]);
        let err = SimClassifier
            .update(request(
                state.classifiers[0].clone(),
                &partition,
                None,
                TrainingMode::RealOnly,
            ))
            .unwrap_err();
        assert!(matches!(err, UpdateErr::NoLocalData { client: 0 }));
    }
}
