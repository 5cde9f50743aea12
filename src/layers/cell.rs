/// Full mutable state of one hidden unit.
///
/// The `net_*`/`y_*` fields are transients overwritten by every forward
/// step and consumed by the matching backward step. The `ds_*` fields are
/// the decayed partial-derivative accumulators carried across timesteps;
/// decaying them by the current forget gate is what makes the backward pass
/// a single-step truncated approximation rather than full
/// backpropagation-through-time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LSTMCell {
    // recurrent weights: cell state -> gate (peephole) and
    // previous output -> gate
    pub w_peephole_in: f64,
    pub w_peephole_forget: f64,
    pub w_peephole_out: f64,
    pub w_cell_in: f64,
    pub w_cell_forget: f64,
    pub w_cell_state: f64,
    pub w_cell_out: f64,

    // gate pre-activations for the current step
    pub net_in: f64,
    pub net_forget: f64,
    pub net_cell_state: f64,
    pub net_out: f64,

    // gate outputs for the current step
    pub y_in: f64,
    pub y_forget: f64,
    pub y_cell_state: f64,
    pub y_out: f64,

    pub cell_state: f64,
    pub previous_cell_state: f64,

    // decayed derivative accumulators for the recurrent weights
    pub ds_w_peephole_in: f64,
    pub ds_w_peephole_forget: f64,
    pub ds_w_cell_in: f64,
    pub ds_w_cell_forget: f64,
    pub ds_w_cell_state: f64,
}

impl LSTMCell {
    /// Clears the recurrent state and derivative accumulators at a sequence
    /// boundary. Weights are untouched.
    pub fn reset(&mut self) {
        self.previous_cell_state = 0.0;
        self.cell_state = 0.0;

        self.ds_w_peephole_in = 0.0;
        self.ds_w_peephole_forget = 0.0;
        self.ds_w_cell_in = 0.0;
        self.ds_w_cell_forget = 0.0;
        self.ds_w_cell_state = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_state_but_not_weights() {
        let mut cell = LSTMCell {
            w_peephole_in: 0.3,
            w_cell_out: -0.2,
            cell_state: 1.5,
            previous_cell_state: 0.7,
            ds_w_peephole_in: 0.1,
            ds_w_cell_state: -0.4,
            ..Default::default()
        };

        cell.reset();

        assert_eq!(cell.cell_state, 0.0);
        assert_eq!(cell.previous_cell_state, 0.0);
        assert_eq!(cell.ds_w_peephole_in, 0.0);
        assert_eq!(cell.ds_w_cell_state, 0.0);
        assert_eq!(cell.w_peephole_in, 0.3);
        assert_eq!(cell.w_cell_out, -0.2);
    }
}
