//! Shared numeric primitives: activations, their derivatives, and the
//! adaptive learning-rate rule used by every weight class.

use crate::gates::{GateQuad, GateTriple};

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// σ'(x) = σ(x)(1 - σ(x))
pub fn sigmoid_derivative(x: f64) -> f64 {
    let s = sigmoid(x);
    s * (1.0 - s)
}

/// tanh'(x) = 1 - tanh²(x)
pub fn tanh_derivative(x: f64) -> f64 {
    let t = x.tanh();
    1.0 - t * t
}

/// Gradient-scaling policy shared across the system: clamp the propagated
/// error to the symmetric cutoff range.
pub fn normalize_gradient(err: f32, cutoff: f32) -> f32 {
    err.clamp(-cutoff, cutoff)
}

/// Per-weight adaptive learning rate, four-channel form.
///
/// Accumulates the squared delta into `accumulator` and returns
/// `base_rate / (sqrt(accumulator) + 1)` per channel. The accumulator only
/// ever grows between learning-rate resets, so the effective rate of a
/// frequently-updated weight decays over the pass.
pub fn adaptive_rate4(delta: GateQuad, accumulator: &mut GateQuad, base_rate: f32) -> GateQuad {
    *accumulator += delta * delta;
    GateQuad::splat(base_rate) / (accumulator.sqrt() + GateQuad::splat(1.0))
}

/// Three-channel form, used for the peephole weights.
pub fn adaptive_rate3(delta: GateTriple, accumulator: &mut GateTriple, base_rate: f32) -> GateTriple {
    *accumulator += delta * delta;
    GateTriple::splat(base_rate) / (accumulator.sqrt() + GateTriple::splat(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
        assert!(sigmoid(1000.0) > 0.99);
        assert!(sigmoid(-1000.0) < 0.01);
    }

    #[test]
    fn test_sigmoid_derivative() {
        // Peaks at x = 0 with value 0.25.
        assert!((sigmoid_derivative(0.0) - 0.25).abs() < 1e-10);
        assert!(sigmoid_derivative(5.0) < sigmoid_derivative(0.0));
        assert!((sigmoid_derivative(2.0) - sigmoid_derivative(-2.0)).abs() < 1e-10);
    }

    #[test]
    fn test_tanh_derivative() {
        assert!((tanh_derivative(0.0) - 1.0).abs() < 1e-10);
        let t = 0.7f64.tanh();
        assert!((tanh_derivative(0.7) - (1.0 - t * t)).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_gradient() {
        assert_eq!(normalize_gradient(100.0, 15.0), 15.0);
        assert_eq!(normalize_gradient(-100.0, 15.0), -15.0);
        assert_eq!(normalize_gradient(3.5, 15.0), 3.5);
    }

    #[test]
    fn test_adaptive_rate_first_step() {
        let mut acc = GateQuad::default();
        let delta = GateQuad::splat(3.0);
        let rate = adaptive_rate4(delta, &mut acc, 0.1);

        // acc = 9, rate = 0.1 / (3 + 1)
        assert_eq!(acc, GateQuad::splat(9.0));
        assert!((rate.input - 0.025).abs() < 1e-7);
    }

    #[test]
    fn test_adaptive_rate_decays_with_history() {
        let mut acc = GateTriple::default();
        let delta = GateTriple::splat(1.0);

        let first = adaptive_rate3(delta, &mut acc, 0.1);
        let second = adaptive_rate3(delta, &mut acc, 0.1);
        let third = adaptive_rate3(delta, &mut acc, 0.1);

        assert!(first.input > second.input);
        assert!(second.input > third.input);
    }
}
