use serde::{Deserialize, Serialize};

/// Sparse input features for one timestep: nonzero (index, value) pairs as
/// produced by the feature-extraction stage.
///
/// Indices refer to columns of the layer's sparse projection matrix; the
/// layer iterates the pairs without further validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(usize, f32)>,
}

impl SparseVector {
    pub fn new() -> Self {
        SparseVector::default()
    }

    pub fn from_pairs(entries: Vec<(usize, f32)>) -> Self {
        SparseVector { entries }
    }

    pub fn push(&mut self, index: usize, value: f32) {
        self.entries.push((index, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_iter() {
        let mut v = SparseVector::new();
        v.push(3, 1.0);
        v.push(17, -0.5);

        let pairs: Vec<_> = v.iter().collect();
        assert_eq!(pairs, vec![(3, 1.0), (17, -0.5)]);
        assert_eq!(v.len(), 2);
        assert!(!v.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut v = SparseVector::from_pairs(vec![(0, 1.0)]);
        v.clear();
        assert!(v.is_empty());
    }
}
