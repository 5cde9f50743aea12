use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::gates::{GateQuad, GateTriple};

/// Projection weight rows for one hidden unit: a 4-channel weight per
/// sparse feature and per dense feature. Giving each unit its own rows
/// makes a parallel pass over units race-free by construction.
#[derive(Debug, Clone)]
pub struct UnitWeights {
    pub sparse: Vec<GateQuad>,
    pub dense: Vec<GateQuad>,
}

impl UnitWeights {
    /// Small symmetric random initialization, matching the cell-internal
    /// scalar weights.
    pub fn random(sparse_size: usize, dense_size: usize, rng: &mut impl Rng) -> Self {
        let dist = Uniform::new(-0.1f32, 0.1f32);

        UnitWeights {
            sparse: (0..sparse_size).map(|_| random_quad(&dist, rng)).collect(),
            dense: (0..dense_size).map(|_| random_quad(&dist, rng)).collect(),
        }
    }

    pub fn from_rows(sparse: Vec<GateQuad>, dense: Vec<GateQuad>) -> Self {
        UnitWeights { sparse, dense }
    }
}

fn random_quad(dist: &Uniform<f32>, rng: &mut impl Rng) -> GateQuad {
    GateQuad::new(
        dist.sample(rng),
        dist.sample(rng),
        dist.sample(rng),
        dist.sample(rng),
    )
}

/// Training-only companion state for one unit: derivative-history rows
/// (decayed per step by the forget gate) and the per-weight squared-gradient
/// accumulators behind the adaptive learning rate.
#[derive(Debug, Clone)]
pub struct UnitTrainState {
    pub sparse_deri: Vec<GateTriple>,
    pub dense_deri: Vec<GateTriple>,
    pub sparse_rate: Vec<GateQuad>,
    pub dense_rate: Vec<GateQuad>,
    pub peephole_rate: GateTriple,
    pub cell_rate: GateQuad,
}

impl UnitTrainState {
    pub fn new(sparse_size: usize, dense_size: usize) -> Self {
        UnitTrainState {
            sparse_deri: vec![GateTriple::default(); sparse_size],
            dense_deri: vec![GateTriple::default(); dense_size],
            sparse_rate: vec![GateQuad::default(); sparse_size],
            dense_rate: vec![GateQuad::default(); dense_size],
            peephole_rate: GateTriple::default(),
            cell_rate: GateQuad::default(),
        }
    }

    /// Zeroes the squared-gradient accumulators at the start of a corpus
    /// pass.
    pub fn reset_rates(&mut self) {
        self.sparse_rate.fill(GateQuad::default());
        self.dense_rate.fill(GateQuad::default());
        self.peephole_rate = GateTriple::default();
        self.cell_rate = GateQuad::default();
    }

    /// Zeroes the derivative history at a sequence boundary.
    pub fn reset_history(&mut self) {
        self.sparse_deri.fill(GateTriple::default());
        self.dense_deri.fill(GateTriple::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_init_shapes_and_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let w = UnitWeights::random(5, 3, &mut rng);

        assert_eq!(w.sparse.len(), 5);
        assert_eq!(w.dense.len(), 3);
        for q in w.sparse.iter().chain(w.dense.iter()) {
            for v in [q.input, q.forget, q.cell, q.output] {
                assert!(v.abs() < 0.1);
            }
        }
    }

    #[test]
    fn test_reset_rates_and_history() {
        let mut state = UnitTrainState::new(2, 2);
        state.sparse_rate[0] = GateQuad::splat(4.0);
        state.dense_deri[1] = GateTriple::splat(0.5);
        state.cell_rate = GateQuad::splat(1.0);

        state.reset_rates();
        assert_eq!(state.sparse_rate[0], GateQuad::default());
        assert_eq!(state.cell_rate, GateQuad::default());
        // history survives a learning-rate reset
        assert_eq!(state.dense_deri[1], GateTriple::splat(0.5));

        state.reset_history();
        assert_eq!(state.dense_deri[1], GateTriple::default());
    }
}
