//! The two weight-aggregation algorithms: plain federated averaging and the
//! extractor-aware variant that federates the shared representation layer
//! while leaving per-group head parameters personal.
//!
//! Aggregation is the round's synchronization barrier: callers hand over the
//! complete set of this round's contributions, and the batch is consumed in
//! one pass. Sums are accumulated in `f64` so the result does not depend on
//! the order contributions were collected in.

use crate::error::{CoreErr, Result};
use crate::params::WeightSnapshot;

/// Unweighted elementwise mean over structurally identical snapshots.
///
/// `model` names the aggregated model in the error when the batch is empty.
pub fn fed_avg(batch: &[WeightSnapshot], model: &'static str) -> Result<WeightSnapshot> {
    let first = batch.first().ok_or(CoreErr::EmptyBatch { model })?;
    for other in &batch[1..] {
        first.check_layout(other)?;
    }

    let mut acc: Vec<Vec<f64>> = first.iter().map(|(_, t)| vec![0.0; t.len()]).collect();
    for snapshot in batch {
        // Layouts are identical and iteration is name-sorted, so tensors align.
        for (buf, (_, tensor)) in acc.iter_mut().zip(snapshot.iter()) {
            for (a, x) in buf.iter_mut().zip(&tensor.data) {
                *a += f64::from(*x);
            }
        }
    }

    let inv = 1.0 / batch.len() as f64;
    let mut out = first.clone();
    for ((_, tensor), buf) in out.iter_mut().zip(acc) {
        for (dst, a) in tensor.data.iter_mut().zip(buf) {
            *dst = (a * inv) as f32;
        }
    }
    Ok(out)
}

/// Plain per-group averaging: each group's snapshot is replaced by the mean
/// of that group's contributions. A group with zero contributions this round
/// keeps its prior snapshot.
pub fn fed_avg_groups(globals: &mut [WeightSnapshot], batches: &[Vec<WeightSnapshot>]) -> Result<()> {
    debug_assert_eq!(globals.len(), batches.len());
    for (global, batch) in globals.iter_mut().zip(batches) {
        if batch.is_empty() {
            continue;
        }
        // Contributions must match the layout the group was dispatched with.
        global.check_layout(&batch[0])?;
        *global = fed_avg(batch, "classifier group")?;
    }
    Ok(())
}

/// Extractor-aware averaging over heterogeneous classifier groups that embed
/// a common feature-extractor sub-module under `prefix`.
///
/// 1. Each group's full snapshot (head + embedded extractor copy) is averaged
///    over that group's own contributions.
/// 2. The extractor sub-parameters of every contributing group are averaged
///    across groups, weighted by contributing-client count, into a new shared
///    extractor.
/// 3. The new shared extractor is written back into every group's snapshot.
///
/// Afterwards the extractor sub-state is identical across all groups while
/// head parameters stay group-specific. A round with no contributions at all
/// leaves both the groups and the shared extractor untouched.
pub fn fed_avg_extractor_aware(
    globals: &mut [WeightSnapshot],
    batches: &[Vec<WeightSnapshot>],
    extractor: &mut WeightSnapshot,
    prefix: &str,
) -> Result<()> {
    fed_avg_groups(globals, batches)?;

    let total: usize = batches.iter().map(Vec::len).sum();
    if total == 0 {
        return Ok(());
    }

    let mut acc: Vec<Vec<f64>> = extractor.iter().map(|(_, t)| vec![0.0; t.len()]).collect();
    for (global, batch) in globals.iter().zip(batches) {
        if batch.is_empty() {
            continue;
        }
        let sub = global.subset(prefix);
        extractor.check_layout(&sub)?;
        let weight = batch.len() as f64;
        for (buf, (_, tensor)) in acc.iter_mut().zip(sub.iter()) {
            for (a, x) in buf.iter_mut().zip(&tensor.data) {
                *a += weight * f64::from(*x);
            }
        }
    }

    let inv = 1.0 / total as f64;
    for ((_, tensor), buf) in extractor.iter_mut().zip(acc) {
        for (dst, a) in tensor.data.iter_mut().zip(buf) {
            *dst = (a * inv) as f32;
        }
    }

    for global in globals.iter_mut() {
        global.overwrite(extractor)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Tensor;

    fn snap(fe: &[f32], head: &[f32]) -> WeightSnapshot {
        let mut s = WeightSnapshot::new();
        s.insert("fe.w", Tensor::new(vec![fe.len()], fe.to_vec()));
        s.insert("head.w", Tensor::new(vec![head.len()], head.to_vec()));
        s
    }

    #[test]
    fn singleton_mean_is_identity() {
        let only = snap(&[1.0, -2.0], &[0.5]);
        let avg = fed_avg(std::slice::from_ref(&only), "generator").unwrap();
        assert_eq!(avg, only);
    }

    #[test]
    fn mean_is_order_independent() {
        let batch = vec![
            snap(&[1.0, 8.0], &[3.0]),
            snap(&[2.0, 4.0], &[6.0]),
            snap(&[4.0, 2.0], &[0.0]),
        ];
        let mut reversed = batch.clone();
        reversed.reverse();

        let a = fed_avg(&batch, "generator").unwrap();
        let b = fed_avg(&reversed, "generator").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get("fe.w").unwrap().data, vec![7.0 / 3.0, 14.0 / 3.0]);
    }

    #[test]
    fn empty_batch_is_an_error() {
        let err = fed_avg(&[], "critic").unwrap_err();
        assert_eq!(err, CoreErr::EmptyBatch { model: "critic" });
    }

    #[test]
    fn mismatched_batch_is_an_error() {
        let batch = vec![snap(&[1.0], &[1.0]), snap(&[1.0, 2.0], &[1.0])];
        assert!(matches!(
            fed_avg(&batch, "generator"),
            Err(CoreErr::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn group_without_contributions_keeps_prior_weights() {
        let mut globals = vec![snap(&[0.0], &[0.0]), snap(&[5.0], &[5.0])];
        let batches = vec![vec![snap(&[2.0], &[4.0])], vec![]];
        fed_avg_groups(&mut globals, &batches).unwrap();
        assert_eq!(globals[0], snap(&[2.0], &[4.0]));
        assert_eq!(globals[1], snap(&[5.0], &[5.0]));
    }

    #[test]
    fn extractor_is_identical_across_groups_after_aggregation() {
        let mut globals = vec![snap(&[0.0, 0.0], &[1.0]), snap(&[0.0, 0.0], &[2.0])];
        let mut extractor = snap(&[0.0, 0.0], &[0.0]).subset("fe.");
        let batches = vec![
            vec![snap(&[1.0, 3.0], &[10.0]), snap(&[3.0, 5.0], &[20.0])],
            vec![snap(&[8.0, 0.0], &[-4.0])],
        ];

        fed_avg_extractor_aware(&mut globals, &batches, &mut extractor, "fe.").unwrap();

        let fe0 = globals[0].subset("fe.");
        let fe1 = globals[1].subset("fe.");
        assert_eq!(fe0, fe1);
        assert_eq!(fe0, extractor);
        // Heads remain group-specific.
        assert_eq!(globals[0].get("head.w").unwrap().data, vec![15.0]);
        assert_eq!(globals[1].get("head.w").unwrap().data, vec![-4.0]);
    }

    #[test]
    fn extractor_mean_is_weighted_by_contributing_clients() {
        // Group A: 3 clients all at 1.0, group B: 1 client at 5.0.
        // Count-weighted mean = (3*1 + 1*5) / 4 = 2.0; the simple mean of the
        // group averages would be 3.0.
        let mut globals = vec![snap(&[0.0], &[0.0]), snap(&[0.0], &[0.0])];
        let mut extractor = globals[0].subset("fe.");
        let batches = vec![
            vec![
                snap(&[1.0], &[0.0]),
                snap(&[1.0], &[0.0]),
                snap(&[1.0], &[0.0]),
            ],
            vec![snap(&[5.0], &[0.0])],
        ];

        fed_avg_extractor_aware(&mut globals, &batches, &mut extractor, "fe.").unwrap();
        assert_eq!(extractor.get("fe.w").unwrap().data, vec![2.0]);
    }

    #[test]
    fn extractor_aware_no_contributions_leaves_state_untouched() {
        let mut globals = vec![snap(&[1.0], &[2.0])];
        let mut extractor = globals[0].subset("fe.");
        let before = (globals.clone(), extractor.clone());

        fed_avg_extractor_aware(&mut globals, &[vec![]], &mut extractor, "fe.").unwrap();
        assert_eq!((globals, extractor), before);
    }
}
