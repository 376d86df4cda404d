use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreErr, Result};

/// A flat, row-major parameter buffer with its logical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn same_layout(&self, other: &Tensor) -> bool {
        self.shape == other.shape
    }
}

/// One model's weights: an ordered mapping from parameter name to tensor.
///
/// Snapshots are the unit of exchange between the scheduler and client
/// updates. Iteration order is the sorted parameter name order, so two
/// snapshots with the same layout always align element for element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    tensors: BTreeMap<String, Tensor>,
}

impl WeightSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.tensors.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.tensors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Tensor)> {
        self.tensors.iter_mut()
    }

    /// Total number of scalar parameters across all tensors.
    pub fn num_params(&self) -> usize {
        self.tensors.values().map(Tensor::len).sum()
    }

    /// Verifies that `other` carries exactly the same parameter names with
    /// the same shapes as `self`.
    pub fn check_layout(&self, other: &WeightSnapshot) -> Result<()> {
        for (name, tensor) in &self.tensors {
            match other.tensors.get(name) {
                None => {
                    return Err(CoreErr::MissingParam { param: name.clone() });
                }
                Some(t) if !t.same_layout(tensor) => {
                    return Err(CoreErr::LayoutMismatch {
                        param: name.clone(),
                        got: t.shape.clone(),
                        expected: tensor.shape.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        if let Some(name) = other.tensors.keys().find(|n| !self.tensors.contains_key(*n)) {
            return Err(CoreErr::MissingParam { param: name.clone() });
        }
        Ok(())
    }

    /// Clones the parameters whose names start with `prefix` into a new
    /// snapshot, keeping the full names.
    pub fn subset(&self, prefix: &str) -> WeightSnapshot {
        let tensors = self
            .tensors
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, t)| (name.clone(), t.clone()))
            .collect();
        Self { tensors }
    }

    /// Overwrites every parameter named in `patch` with the patch's values.
    /// The patched parameters must already exist here with matching shapes.
    pub fn overwrite(&mut self, patch: &WeightSnapshot) -> Result<()> {
        for (name, tensor) in &patch.tensors {
            match self.tensors.get_mut(name) {
                None => {
                    return Err(CoreErr::MissingParam { param: name.clone() });
                }
                Some(t) if !t.same_layout(tensor) => {
                    return Err(CoreErr::LayoutMismatch {
                        param: name.clone(),
                        got: tensor.shape.clone(),
                        expected: t.shape.clone(),
                    });
                }
                Some(t) => t.data.copy_from_slice(&tensor.data),
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, Tensor)> for WeightSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

/// The canonical global state at a round boundary: one snapshot per
/// classifier group, the shared feature extractor, and the generator pair.
///
/// Every classifier snapshot embeds an extractor copy (parameters under the
/// extractor name prefix) that is structurally identical to `extractor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalModelState {
    pub classifiers: Vec<WeightSnapshot>,
    pub extractor: WeightSnapshot,
    pub generator: WeightSnapshot,
    pub critic: WeightSnapshot,
}

impl GlobalModelState {
    pub fn num_groups(&self) -> usize {
        self.classifiers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(pairs: &[(&str, &[usize], f32)]) -> WeightSnapshot {
        pairs
            .iter()
            .map(|(name, shape, fill)| {
                let len = shape.iter().product();
                (
                    name.to_string(),
                    Tensor::new(shape.to_vec(), vec![*fill; len]),
                )
            })
            .collect()
    }

    #[test]
    fn layout_check_accepts_identical_layouts() {
        let a = snap(&[("fe.w", &[2, 3], 0.0), ("head.w", &[3], 1.0)]);
        let b = snap(&[("fe.w", &[2, 3], 5.0), ("head.w", &[3], -1.0)]);
        assert!(a.check_layout(&b).is_ok());
    }

    #[test]
    fn layout_check_rejects_shape_and_name_drift() {
        let a = snap(&[("fe.w", &[2, 3], 0.0)]);
        let reshaped = snap(&[("fe.w", &[3, 2], 0.0)]);
        assert!(matches!(
            a.check_layout(&reshaped),
            Err(CoreErr::LayoutMismatch { .. })
        ));

        let extra = snap(&[("fe.w", &[2, 3], 0.0), ("head.w", &[3], 0.0)]);
        assert!(matches!(
            a.check_layout(&extra),
            Err(CoreErr::MissingParam { .. })
        ));
        assert!(matches!(
            extra.check_layout(&a),
            Err(CoreErr::MissingParam { .. })
        ));
    }

    #[test]
    fn subset_and_overwrite_round_trip() {
        let mut full = snap(&[("fe.w", &[2], 1.0), ("fe.b", &[2], 2.0), ("head.w", &[2], 3.0)]);
        let mut fe = full.subset("fe.");
        assert_eq!(fe.len(), 2);

        for (_, t) in fe.iter_mut() {
            t.data.fill(9.0);
        }
        full.overwrite(&fe).unwrap();
        assert_eq!(full.get("fe.w").unwrap().data, vec![9.0, 9.0]);
        assert_eq!(full.get("head.w").unwrap().data, vec![3.0, 3.0]);
    }

    #[test]
    fn global_state_serde_round_trip() {
        let state = GlobalModelState {
            classifiers: vec![snap(&[("fe.w", &[2], 0.5), ("head.w", &[4], 1.5)])],
            extractor: snap(&[("fe.w", &[2], 0.5)]),
            generator: snap(&[("g.w", &[3], 0.25)]),
            critic: snap(&[("d.w", &[3], 0.75)]),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: GlobalModelState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
        assert!(state.classifiers[0]
            .check_layout(&back.classifiers[0])
            .is_ok());
    }
}
