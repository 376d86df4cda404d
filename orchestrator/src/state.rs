use fed_core::GlobalModelState;

use crate::rounds::RoundReport;

/// All mutable run-scoped state, owned by the scheduler.
///
/// Created once at round 0 and threaded explicitly through both phases;
/// `global` is only rewritten at round boundaries by aggregation, and the
/// final checkpoint is the teardown boundary.
#[derive(Debug)]
pub struct RunState {
    /// Global round index, counted across warm-up and joint phases.
    pub round: usize,
    pub global: GlobalModelState,
    /// Best held-out accuracy seen per group over the whole run.
    pub best_accuracy: Vec<f32>,
    pub reports: Vec<RoundReport>,
}

impl RunState {
    pub fn new(global: GlobalModelState) -> Self {
        let groups = global.num_groups();
        Self {
            round: 0,
            global,
            best_accuracy: vec![0.0; groups],
            reports: Vec::new(),
        }
    }
}
