use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use seqlstm::{Downstream, ErrorSource, LSTMLayer, LSTMLayerConfig, SparseVector};

fn seeded_layer(layer_size: usize, sparse: usize, dense: usize, seed: u64) -> LSTMLayer {
    LSTMLayer::with_rng(
        LSTMLayerConfig::new(layer_size),
        sparse,
        dense,
        &mut StdRng::seed_from_u64(seed),
    )
}

fn step_features(t: usize, sparse_size: usize) -> SparseVector {
    SparseVector::from_pairs(vec![(t % sparse_size, 1.0), ((t * 3 + 1) % sparse_size, 0.5)])
}

#[test]
fn test_training_steps_change_weights_and_stay_finite() {
    let mut layer = seeded_layer(5, 12, 3, 1);

    let mut before = Vec::new();
    layer.save(&mut before, false).unwrap();

    let dense = Array1::from(vec![0.2f32, -0.4, 0.6]);
    let errors = [0.3f32, -0.2, 0.1, 0.05, -0.4];
    for t in 0..6 {
        layer.forward(&step_features(t, 12), &dense);
        layer.set_error(ArrayView1::from(&errors[..]));
        layer.backward(t);
    }

    assert!(layer.output().iter().all(|v| v.is_finite()));

    let mut after = Vec::new();
    layer.save(&mut after, false).unwrap();
    assert_ne!(before, after, "training left every weight untouched");
}

#[test]
fn test_identical_seeds_build_identical_layers() {
    let a = seeded_layer(4, 8, 2, 99);
    let b = seeded_layer(4, 8, 2, 99);

    let mut bytes_a = Vec::new();
    let mut bytes_b = Vec::new();
    a.save(&mut bytes_a, false).unwrap();
    b.save(&mut bytes_b, false).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn test_sequence_reset_between_sentences() {
    let mut layer = seeded_layer(3, 6, 0, 5);
    let empty_dense = Array1::zeros(0);

    for t in 0..4 {
        layer.forward(&step_features(t, 6), &empty_dense);
    }
    let end_of_first = layer.output().to_vec();

    layer.reset();
    assert!(layer.output().iter().all(|&v| v == 0.0));

    // second sentence starts from clean state: its first step differs from
    // where the previous sentence left off
    layer.forward(&step_features(0, 6), &empty_dense);
    assert_ne!(layer.output().to_vec(), end_of_first);
    assert!(layer.output().iter().all(|v| v.is_finite()));
}

#[test]
fn test_two_layer_error_flow() {
    let mut first = seeded_layer(4, 8, 0, 10);
    let mut second = seeded_layer(3, 0, 4, 11);

    // forward through the stack: second layer consumes the first's output
    // as dense features
    first.forward(&step_features(0, 8), &Array1::zeros(0));
    let hidden = first.output().to_owned();
    second.forward(&SparseVector::new(), &hidden);

    // downstream collaborator hands the top layer its error, then it flows
    // back through the output-gate channel
    second.set_error(ArrayView1::from(&[0.5f32, -0.25, 0.75][..]));
    first.propagate_error_from(&Downstream::Lstm(&second));

    let cutoff = first.config().gradient_cutoff;
    assert!(first.error().iter().all(|e| e.abs() <= cutoff && e.is_finite()));

    // both layers can take their backward step
    second.backward(0);
    first.backward(0);
}

#[test]
fn test_generic_downstream_through_public_trait() {
    struct OutputLayer {
        errors: Vec<f32>,
        weights: Vec<Vec<f32>>,
    }

    impl ErrorSource for OutputLayer {
        fn layer_size(&self) -> usize {
            self.errors.len()
        }
        fn error(&self, unit: usize) -> f32 {
            self.errors[unit]
        }
        fn input_weight(&self, unit: usize, input: usize) -> f32 {
            self.weights[unit][input]
        }
    }

    let mut layer = seeded_layer(2, 4, 0, 17);
    let output_layer = OutputLayer {
        errors: vec![1.0, -2.0],
        weights: vec![vec![0.5, 0.1], vec![0.2, 0.3]],
    };

    layer.propagate_error_from(&Downstream::Other(&output_layer));

    let expected0 = 1.0 * 0.5 - 2.0 * 0.2;
    let expected1 = 1.0 * 0.1 - 2.0 * 0.3;
    assert!((layer.error()[0] - expected0).abs() < 1e-6);
    assert!((layer.error()[1] - expected1).abs() < 1e-6);
}

#[test]
fn test_learning_rate_reset_starts_a_fresh_pass() {
    let mut layer = seeded_layer(3, 5, 2, 23);
    let dense = Array1::from(vec![0.3f32, -0.3]);
    let errors = [0.2f32, -0.1, 0.3];

    // first pass accumulates squared gradients, shrinking the rates
    for t in 0..5 {
        layer.forward(&step_features(t, 5), &dense);
        layer.set_error(ArrayView1::from(&errors[..]));
        layer.backward(t);
    }

    layer.reset();
    layer.reset_learning_rate();

    // a fresh pass still trains and stays numerically sane
    for t in 0..5 {
        layer.forward(&step_features(t, 5), &dense);
        layer.set_error(ArrayView1::from(&errors[..]));
        layer.backward(t);
    }
    assert!(layer.output().iter().all(|v| v.is_finite()));
    for cell in layer.cells() {
        assert!(cell.cell_state.is_finite());
        assert!(cell.w_peephole_in.is_finite());
    }
}
