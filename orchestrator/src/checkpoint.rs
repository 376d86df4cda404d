//! End-of-run persistence of the global generator snapshot, keyed by run
//! name and reproducibility seed.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use fed_core::WeightSnapshot;

use crate::error::Result;

/// Serializes `generator` under `dir` and returns the checkpoint path.
pub fn save_generator(
    dir: &Path,
    run_name: &str,
    seed: u64,
    generator: &WeightSnapshot,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("fedgen_{run_name}{seed}.json"));
    let file = fs::File::create(&path)?;
    serde_json::to_writer(BufWriter::new(file), generator)?;
    Ok(path)
}

/// Reads a snapshot previously written by [`save_generator`].
pub fn load_generator(path: &Path) -> Result<WeightSnapshot> {
    let file = fs::File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fed_core::Tensor;

    #[test]
    fn checkpoint_round_trips() {
        let mut generator = WeightSnapshot::new();
        generator.insert("gen.w0", Tensor::new(vec![2, 2], vec![0.1, 0.2, 0.3, 0.4]));

        let dir = std::env::temp_dir().join(format!("fedgen_ckpt_{}", std::process::id()));
        let path = save_generator(&dir, "test", 3, &generator).unwrap();
        assert!(path.ends_with("fedgen_test3.json"));

        let restored = load_generator(&path).unwrap();
        assert_eq!(restored, generator);
        generator.check_layout(&restored).unwrap();

        fs::remove_dir_all(&dir).ok();
    }
}
