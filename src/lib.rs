//! # seqlstm
//!
//! Trainable peephole LSTM layer for sequence-labeling systems: per-timestep
//! forward activation over sparse + dense features, single-step truncated
//! backward updates with forget-gate-decayed derivative history, per-weight
//! adaptive learning rates, and a compact binary weight format with optional
//! vector-quantized compression.
//!
//! ## Core Components
//!
//! - **LSTMLayer**: forward/backward engines and cross-layer error
//!   propagation, data-parallel across hidden units
//! - **LSTMCell**: per-unit gate state and decayed derivative accumulators
//! - **VectorQuantization**: per-channel codebooks behind the compressed
//!   weight format
//! - **Persistence**: the binary weight-file codec plus a JSON checkpoint
//!   path with metadata
//!
//! ## Quick Start
//!
//! ```rust
//! use seqlstm::{LSTMLayer, LSTMLayerConfig, SparseVector};
//! use ndarray::Array1;
//!
//! // 8 hidden units fed by 16 sparse and 4 dense features
//! let config = LSTMLayerConfig::new(8);
//! let mut layer = LSTMLayer::new(config, 16, 4);
//!
//! let mut features = SparseVector::new();
//! features.push(3, 1.0);
//! let dense = Array1::zeros(4);
//!
//! layer.forward(&features, &dense);
//! assert_eq!(layer.output().len(), 8);
//! ```

/// Main library module.
pub mod config;
pub mod features;
pub mod gates;
pub mod layers;
pub mod persistence;
pub mod quantization;
pub mod utils;

// Re-export commonly used items
pub use config::LSTMLayerConfig;
pub use features::SparseVector;
pub use gates::{GateQuad, GateTriple};
pub use layers::{Downstream, ErrorSource, LSTMCell, LSTMLayer};
pub use persistence::{ModelMetadata, ModelPersistence, PersistenceError, VQ_CODEBOOK_SIZE};
pub use quantization::VectorQuantization;
