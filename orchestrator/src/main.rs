use anyhow::Result;

use local_update::Partition;
use local_update::sim::{SampleSheetExporter, SimClassifier, SimEvaluator, SimGenerator, demo_state};
use orchestrator::{Contracts, Run, RunConfig};

fn main() -> Result<()> {
    env_logger::init();

    let cfg = RunConfig {
        run_name: "demo".into(),
        num_clients: 6,
        num_groups: 2,
        warmup_rounds: 5,
        joint_rounds: 10,
        eval_every: 5,
        sample_every: 5,
        sample_count: 16,
        ..RunConfig::default()
    };

    let partitions = Partition::even_split(600, cfg.num_clients, cfg.data_fraction);
    let initial = demo_state(cfg.num_groups, cfg.seed);
    let contracts = Contracts {
        classifier: SimClassifier,
        generator: SimGenerator,
        evaluator: SimEvaluator::default(),
        exporter: SampleSheetExporter {
            dir: cfg.output_dir.join("samples"),
            run_name: cfg.run_name.clone(),
        },
    };

    let summary = Run::new(cfg, initial, partitions, contracts)?.execute()?;

    for (group, accuracy) in summary.best_accuracy.iter().enumerate() {
        println!("group {group}: best test accuracy {accuracy:.2}");
    }
    println!("generator checkpoint: {}", summary.checkpoint.display());
    Ok(())
}
