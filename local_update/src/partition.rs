use serde::{Deserialize, Serialize};

/// Opaque handle to one client's slice of the training data.
///
/// The orchestrator never looks inside; it only hands the partition to that
/// client's update contract. How the index set was produced (IID split,
/// Dirichlet, ...) is the data layer's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    indices: Vec<usize>,
}

impl Partition {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Deterministic IID-style split: each of `clients` takes a contiguous
    /// stripe of `total * fraction / clients` example indices (at least one),
    /// wrapping around the dataset.
    pub fn even_split(total: usize, clients: usize, fraction: f32) -> Vec<Partition> {
        assert!(total > 0 && clients > 0);
        let per_client = (((total as f32 * fraction) / clients as f32) as usize).max(1);
        (0..clients)
            .map(|c| {
                let start = c * per_client;
                Partition::new((start..start + per_client).map(|i| i % total).collect())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_gives_disjoint_stripes() {
        let parts = Partition::even_split(600, 6, 0.1);
        assert_eq!(parts.len(), 6);
        for p in &parts {
            assert_eq!(p.len(), 10);
        }
        assert_eq!(parts[0].indices()[0], 0);
        assert_eq!(parts[1].indices()[0], 10);
    }

    #[test]
    fn even_split_never_produces_an_empty_partition() {
        let parts = Partition::even_split(3, 5, 0.01);
        assert!(parts.iter().all(|p| !p.is_empty()));
    }
}
