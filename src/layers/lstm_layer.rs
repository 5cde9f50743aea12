use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use tracing::debug;

use crate::config::LSTMLayerConfig;
use crate::features::SparseVector;
use crate::gates::{GateQuad, GateTriple};
use crate::layers::cell::LSTMCell;
use crate::layers::weights::{UnitTrainState, UnitWeights};
use crate::utils::{
    adaptive_rate3, adaptive_rate4, normalize_gradient, sigmoid, sigmoid_derivative,
    tanh_derivative,
};

/// Capability a non-LSTM downstream layer exposes so this layer can pull
/// error back through it: its size, its per-unit error, and the weight from
/// one of this layer's units into one of its units.
pub trait ErrorSource: Sync {
    fn layer_size(&self) -> usize;
    fn error(&self, unit: usize) -> f32;
    fn input_weight(&self, unit: usize, input: usize) -> f32;
}

/// Downstream layer kind, resolved once when layers are wired together.
pub enum Downstream<'a> {
    /// Next layer is another LSTM layer; error flows back through the
    /// output-gate channel of its dense projection weights.
    Lstm(&'a LSTMLayer),
    /// Any other layer kind, consumed through the generic capability.
    Other(&'a dyn ErrorSource),
}

/// Trainable peephole LSTM layer.
///
/// Holds one [`LSTMCell`] per hidden unit plus per-unit projection weight
/// rows, derivative history, and learning-rate accumulators. Forward,
/// backward, and error-propagation passes run data-parallel across units;
/// each parallel task owns exactly its unit's state, so a pass needs no
/// locking, and the pass itself is a synchronization barrier between
/// timesteps.
#[derive(Clone, Debug)]
pub struct LSTMLayer {
    pub(crate) config: LSTMLayerConfig,
    pub(crate) sparse_feature_size: usize,
    pub(crate) dense_feature_size: usize,

    pub(crate) cells: Vec<LSTMCell>,
    pub(crate) weights: Vec<UnitWeights>,
    train: Vec<UnitTrainState>,

    output: Vec<f32>,
    previous_output: Vec<f32>,
    pub(crate) er: Vec<f32>,

    // features captured at forward time for the matching backward step
    sparse_input: SparseVector,
    dense_input: Array1<f32>,
}

impl LSTMLayer {
    /// New layer with randomly initialized weights.
    pub fn new(config: LSTMLayerConfig, sparse_feature_size: usize, dense_feature_size: usize) -> Self {
        Self::with_rng(config, sparse_feature_size, dense_feature_size, &mut rand::thread_rng())
    }

    /// New layer drawing its initial weights from the supplied generator;
    /// a seeded generator makes construction reproducible.
    pub fn with_rng(
        config: LSTMLayerConfig,
        sparse_feature_size: usize,
        dense_feature_size: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let dist = Uniform::new(-0.1f64, 0.1f64);
        let cells = (0..config.layer_size)
            .map(|_| LSTMCell {
                w_peephole_in: dist.sample(rng),
                w_peephole_forget: dist.sample(rng),
                w_peephole_out: dist.sample(rng),
                w_cell_in: dist.sample(rng),
                w_cell_forget: dist.sample(rng),
                w_cell_state: dist.sample(rng),
                w_cell_out: dist.sample(rng),
                ..Default::default()
            })
            .collect();
        let weights = (0..config.layer_size)
            .map(|_| UnitWeights::random(sparse_feature_size, dense_feature_size, rng))
            .collect();

        debug!(
            layer_size = config.layer_size,
            sparse_feature_size, dense_feature_size, "initialized LSTM layer weights"
        );

        Self::from_parts(config, sparse_feature_size, dense_feature_size, cells, weights)
    }

    /// Assembles a layer around existing cells and weights (fresh training
    /// state, zero recurrent state). Weight loading lands here.
    pub(crate) fn from_parts(
        config: LSTMLayerConfig,
        sparse_feature_size: usize,
        dense_feature_size: usize,
        cells: Vec<LSTMCell>,
        weights: Vec<UnitWeights>,
    ) -> Self {
        let layer_size = config.layer_size;
        LSTMLayer {
            config,
            sparse_feature_size,
            dense_feature_size,
            cells,
            weights,
            train: (0..layer_size)
                .map(|_| UnitTrainState::new(sparse_feature_size, dense_feature_size))
                .collect(),
            output: vec![0.0; layer_size],
            previous_output: vec![0.0; layer_size],
            er: vec![0.0; layer_size],
            sparse_input: SparseVector::new(),
            dense_input: Array1::zeros(dense_feature_size),
        }
    }

    pub fn config(&self) -> &LSTMLayerConfig {
        &self.config
    }

    pub fn layer_size(&self) -> usize {
        self.config.layer_size
    }

    pub fn sparse_feature_size(&self) -> usize {
        self.sparse_feature_size
    }

    pub fn dense_feature_size(&self) -> usize {
        self.dense_feature_size
    }

    /// Current per-unit outputs.
    pub fn output(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(&self.output[..])
    }

    /// Current per-unit error signal.
    pub fn error(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(&self.er[..])
    }

    pub fn cells(&self) -> &[LSTMCell] {
        &self.cells
    }

    pub fn unit_weights(&self) -> &[UnitWeights] {
        &self.weights
    }

    /// One forward step over the given features, updating every unit's
    /// state and the layer output in parallel.
    ///
    /// The previous-output array is snapshotted before any unit runs, so
    /// units only ever read previous-step values. The features are kept for
    /// the matching `backward` call.
    pub fn forward(&mut self, sparse: &SparseVector, dense: &Array1<f32>) {
        self.sparse_input.clone_from(sparse);
        self.dense_input.clone_from(dense);
        self.previous_output.copy_from_slice(&self.output);

        (
            &mut self.cells[..],
            &self.weights[..],
            &mut self.output[..],
            &self.previous_output[..],
        )
            .into_par_iter()
            .for_each(|(cell, unit, out, &prev_out)| {
                cell.previous_cell_state = cell.cell_state;

                let mut acc = GateQuad::default();
                for (index, value) in sparse.iter() {
                    acc += unit.sparse[index] * value;
                }
                for (&value, &weight) in dense.iter().zip(unit.dense.iter()) {
                    acc += weight * value;
                }

                cell.net_in = acc.input as f64;
                cell.net_forget = acc.forget as f64;
                cell.net_cell_state = acc.cell as f64;
                cell.net_out = acc.output as f64;

                let prev_out = prev_out as f64;

                cell.net_in +=
                    cell.previous_cell_state * cell.w_peephole_in + prev_out * cell.w_cell_in;
                cell.y_in = sigmoid(cell.net_in);

                cell.net_forget +=
                    cell.previous_cell_state * cell.w_peephole_forget + prev_out * cell.w_cell_forget;
                cell.y_forget = sigmoid(cell.net_forget);

                cell.net_cell_state += prev_out * cell.w_cell_state;
                cell.y_cell_state = cell.net_cell_state.tanh();

                cell.cell_state =
                    cell.y_forget * cell.previous_cell_state + cell.y_in * cell.y_cell_state;

                // output gate peeks at the current cell state, not the
                // previous one
                cell.net_out += cell.cell_state * cell.w_peephole_out + prev_out * cell.w_cell_out;
                cell.y_out = sigmoid(cell.net_out);

                *out = (cell.cell_state.tanh() * cell.y_out) as f32;
            });
    }

    /// One truncated backward step for the features captured by the last
    /// `forward`, consuming the layer's current error signal.
    ///
    /// `time_step` is the position within the current sequence; at step 0
    /// the derivative history contributes nothing and is overwritten.
    pub fn backward(&mut self, time_step: usize) {
        let base_rate = self.config.learning_rate;
        let cutoff = self.config.gradient_cutoff;
        let sparse = &self.sparse_input;
        let dense = &self.dense_input;

        (
            &mut self.cells[..],
            &mut self.weights[..],
            &mut self.train[..],
            &self.er[..],
            &self.previous_output[..],
        )
            .into_par_iter()
            .for_each(|(c, unit, train, &err, &prev_out)| {
                let gradient_output_gate =
                    (sigmoid_derivative(c.net_out) * c.cell_state.tanh() * err as f64) as f32;

                let cell_state_error = (c.y_out * err as f64 * tanh_derivative(c.cell_state)
                    + gradient_output_gate as f64 * c.w_peephole_out)
                    as f32;

                let vec_err = GateQuad::new(
                    cell_state_error,
                    cell_state_error,
                    cell_state_error,
                    gradient_output_gate,
                );

                let d_in = c.net_cell_state.tanh() * sigmoid_derivative(c.net_in);
                let d_forget = c.previous_cell_state * sigmoid_derivative(c.net_forget);
                let d_cell = tanh_derivative(c.net_cell_state) * c.y_in;

                let derivative = GateTriple::new(d_in as f32, d_forget as f32, d_cell as f32);
                let y_forget = c.y_forget as f32;

                for (index, value) in sparse.iter() {
                    let mut wd = derivative * value;
                    if time_step > 0 {
                        // decayed history: truncated-BPTT approximation
                        wd += train.sparse_deri[index] * y_forget;
                    }
                    train.sparse_deri[index] = wd;

                    let delta = (vec_err * GateQuad::from_triple(wd, value)).clamp(cutoff);
                    let rate = adaptive_rate4(delta, &mut train.sparse_rate[index], base_rate);
                    unit.sparse[index] += rate * delta;
                }

                for (j, &value) in dense.iter().enumerate() {
                    let mut wd = derivative * value;
                    if time_step > 0 {
                        wd += train.dense_deri[j] * y_forget;
                    }
                    train.dense_deri[j] = wd;

                    let delta = (vec_err * GateQuad::from_triple(wd, value)).clamp(cutoff);
                    let rate = adaptive_rate4(delta, &mut train.dense_rate[j], base_rate);
                    unit.dense[j] += rate * delta;
                }

                // peephole weights, decayed per-unit accumulators
                c.ds_w_peephole_in =
                    c.ds_w_peephole_in * c.y_forget + d_in * c.previous_cell_state;
                c.ds_w_peephole_forget =
                    c.ds_w_peephole_forget * c.y_forget + d_forget * c.previous_cell_state;

                // third lane carries the output peephole, driven by the
                // current cell state
                let delta3 = (GateTriple::new(
                    c.ds_w_peephole_in as f32,
                    c.ds_w_peephole_forget as f32,
                    c.cell_state as f32,
                ) * GateTriple::new(cell_state_error, cell_state_error, gradient_output_gate))
                .clamp(cutoff);
                let rate3 = adaptive_rate3(delta3, &mut train.peephole_rate, base_rate);
                let update3 = rate3 * delta3;
                c.w_peephole_in += update3.input as f64;
                c.w_peephole_forget += update3.forget as f64;
                c.w_peephole_out += update3.cell as f64;

                // recurrent weights from the previous unit output
                let prev = prev_out as f64;
                c.ds_w_cell_in = c.ds_w_cell_in * c.y_forget + d_in * prev;
                c.ds_w_cell_forget = c.ds_w_cell_forget * c.y_forget + d_forget * prev;
                c.ds_w_cell_state = c.ds_w_cell_state * c.y_forget + d_cell * prev;

                let delta4 = (vec_err
                    * GateQuad::new(
                        c.ds_w_cell_in as f32,
                        c.ds_w_cell_forget as f32,
                        c.ds_w_cell_state as f32,
                        prev_out,
                    ))
                .clamp(cutoff);
                let rate4 = adaptive_rate4(delta4, &mut train.cell_rate, base_rate);
                let update4 = rate4 * delta4;
                c.w_cell_in += update4.input as f64;
                c.w_cell_forget += update4.forget as f64;
                c.w_cell_state += update4.cell as f64;
                c.w_cell_out += update4.output as f64;
            });
    }

    /// Overwrites the error signal with a fully computed array, for callers
    /// that derive this layer's error themselves.
    pub fn set_error(&mut self, err: ArrayView1<'_, f32>) {
        debug_assert_eq!(err.len(), self.er.len());
        for (dst, &src) in self.er.iter_mut().zip(err.iter()) {
            *dst = src;
        }
    }

    /// Pulls error back from the downstream layer, applying the shared
    /// gradient-cutoff normalization per unit.
    pub fn propagate_error_from(&mut self, downstream: &Downstream<'_>) {
        let cutoff = self.config.gradient_cutoff;
        match *downstream {
            Downstream::Lstm(next) => {
                debug_assert_eq!(self.config.layer_size, next.dense_feature_size);
                self.er.par_iter_mut().enumerate().for_each(|(i, e)| {
                    let mut err = 0.0f32;
                    for (unit, &next_err) in next.weights.iter().zip(next.er.iter()) {
                        err += next_err * unit.dense[i].output;
                    }
                    *e = normalize_gradient(err, cutoff);
                });
            }
            Downstream::Other(source) => {
                self.er.par_iter_mut().enumerate().for_each(|(i, e)| {
                    let mut err = 0.0f32;
                    for k in 0..source.layer_size() {
                        err += source.error(k) * source.input_weight(k, i);
                    }
                    *e = normalize_gradient(err, cutoff);
                });
            }
        }
    }

    /// Sequence boundary: zero outputs, cell states, and every derivative
    /// accumulator so the next sequence starts from a clean slate.
    pub fn reset(&mut self) {
        self.output.fill(0.0);
        self.previous_output.fill(0.0);
        for cell in &mut self.cells {
            cell.reset();
        }
        for train in &mut self.train {
            train.reset_history();
        }
    }

    /// Zeroes the adaptive learning-rate accumulators at the start of a
    /// training pass over the corpus.
    pub fn reset_learning_rate(&mut self) {
        for train in &mut self.train {
            train.reset_rates();
        }
    }
}
