use std::mem;

use fed_core::{AdamState, WeightSnapshot};
use local_update::Partition;

use crate::error::{OrchestratorError, Result};

/// One registered client: its partition, its group, and its persisted
/// generator/critic optimizer states.
///
/// Optimizer state belongs to this client alone. Momentum carries across
/// rounds even when the client is not sampled, and the state is only ever
/// read or written by this client's own dispatch.
#[derive(Debug)]
pub struct ClientRecord {
    pub id: usize,
    pub group: usize,
    pub partition: Partition,
    opt_generator: AdamState,
    opt_critic: AdamState,
}

/// A client's working set while one dispatch is in flight: the optimizer
/// states are moved out of the arena (never aliased) and moved back on
/// check-in.
#[derive(Debug)]
pub struct DispatchSlot {
    pub id: usize,
    pub group: usize,
    pub partition: Partition,
    pub opt_generator: AdamState,
    pub opt_critic: AdamState,
}

/// The arena of all registered clients for a run.
#[derive(Debug)]
pub struct Registry {
    records: Vec<ClientRecord>,
}

/// Deterministic partition of the client id-space into groups. The last
/// group absorbs the remainder when the division is not exact.
pub fn group_of(client: usize, total: usize, groups: usize) -> usize {
    debug_assert!(groups > 0 && groups <= total);
    (client / (total / groups)).min(groups - 1)
}

impl Registry {
    /// Registers one client per partition, assigns groups, and seeds fresh
    /// optimizer states matching the generator/critic layouts.
    pub fn new(
        partitions: Vec<Partition>,
        num_groups: usize,
        generator: &WeightSnapshot,
        critic: &WeightSnapshot,
    ) -> Result<Self> {
        let total = partitions.len();
        if total == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "at least one client partition is required".into(),
            ));
        }
        if num_groups == 0 || num_groups > total {
            return Err(OrchestratorError::InvalidConfig(format!(
                "num_groups {num_groups} is invalid for {total} clients"
            )));
        }

        let records = partitions
            .into_iter()
            .enumerate()
            .map(|(id, partition)| ClientRecord {
                id,
                group: group_of(id, total, num_groups),
                partition,
                opt_generator: AdamState::zeros_like(generator),
                opt_critic: AdamState::zeros_like(critic),
            })
            .collect();
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: usize) -> &ClientRecord {
        &self.records[id]
    }

    /// Moves a client's optimizer states out for the duration of one
    /// dispatch.
    pub fn checkout(&mut self, id: usize) -> DispatchSlot {
        let record = &mut self.records[id];
        DispatchSlot {
            id: record.id,
            group: record.group,
            partition: record.partition.clone(),
            opt_generator: mem::take(&mut record.opt_generator),
            opt_critic: mem::take(&mut record.opt_critic),
        }
    }

    /// Returns a slot's (possibly updated) optimizer states to the arena.
    pub fn checkin(&mut self, slot: DispatchSlot) {
        let record = &mut self.records[slot.id];
        record.opt_generator = slot.opt_generator;
        record.opt_critic = slot.opt_critic;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_group_absorbs_the_remainder() {
        // N = 10, 3 groups: 0-2 -> 0, 3-5 -> 1, 6-9 -> 2.
        let expected = [0, 0, 0, 1, 1, 1, 2, 2, 2, 2];
        for (client, want) in expected.into_iter().enumerate() {
            assert_eq!(group_of(client, 10, 3), want, "client {client}");
        }
    }

    #[test]
    fn exact_division_splits_evenly() {
        let expected = [0, 0, 1, 1];
        for (client, want) in expected.into_iter().enumerate() {
            assert_eq!(group_of(client, 4, 2), want, "client {client}");
        }
    }

    #[test]
    fn checkout_checkin_round_trips_optimizer_state() {
        let mut snapshot = WeightSnapshot::new();
        snapshot.insert("g.w", fed_core::Tensor::zeros(vec![2]));
        let partitions = vec![Partition::new(vec![0]), Partition::new(vec![1])];
        let mut registry = Registry::new(partitions, 1, &snapshot, &snapshot).unwrap();

        let slot = registry.checkout(1);
        assert_eq!(slot.id, 1);
        let expected = AdamState::zeros_like(&snapshot);
        assert_eq!(slot.opt_generator, expected);
        registry.checkin(slot);
        assert_eq!(registry.record(1).opt_generator, expected);
    }

    #[test]
    fn invalid_group_counts_are_rejected() {
        let snapshot = WeightSnapshot::new();
        let parts = vec![Partition::new(vec![0])];
        assert!(Registry::new(parts.clone(), 0, &snapshot, &snapshot).is_err());
        assert!(Registry::new(parts, 2, &snapshot, &snapshot).is_err());
        assert!(Registry::new(vec![], 1, &snapshot, &snapshot).is_err());
    }
}
