use serde::{Deserialize, Serialize};

/// Numeric configuration for an LSTM layer, fixed at construction time.
///
/// The base learning rate and gradient cutoff are deliberately per-layer
/// values handed in by the caller rather than process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LSTMLayerConfig {
    /// Number of hidden units.
    pub layer_size: usize,
    /// Base rate fed into the adaptive per-weight learning-rate rule.
    pub learning_rate: f32,
    /// Symmetric clipping bound applied to every weight delta and to
    /// propagated layer error.
    pub gradient_cutoff: f32,
}

impl LSTMLayerConfig {
    /// Layer of `layer_size` units with the default training constants.
    pub fn new(layer_size: usize) -> Self {
        LSTMLayerConfig {
            layer_size,
            ..Default::default()
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_gradient_cutoff(mut self, gradient_cutoff: f32) -> Self {
        self.gradient_cutoff = gradient_cutoff;
        self
    }
}

impl Default for LSTMLayerConfig {
    fn default() -> Self {
        LSTMLayerConfig {
            layer_size: 200,
            learning_rate: 0.1,
            gradient_cutoff: 15.0,
        }
    }
}
