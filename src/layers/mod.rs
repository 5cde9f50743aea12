//! Layer implementations and their per-unit state.

pub mod cell;
pub mod lstm_layer;
pub mod weights;

pub use cell::LSTMCell;
pub use lstm_layer::{Downstream, ErrorSource, LSTMLayer};
pub use weights::{UnitTrainState, UnitWeights};
