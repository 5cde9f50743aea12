//! Scalar vector quantization for weight compression.
//!
//! One `VectorQuantization` instance handles one gate channel: it collects
//! every weight of that channel, clusters them into a small codebook, and
//! maps each weight to its nearest codeword index. Compression happens only
//! at serialization time; the training and inference paths never see
//! quantized weights.

const MAX_ITERATIONS: usize = 32;
const CONVERGENCE_EPSILON: f64 = 1e-10;

/// Codebook builder and nearest-codeword encoder for a single channel.
///
/// The build is fully deterministic (midpoint-quantile seeding, no RNG), so
/// compressing the same weights twice yields byte-identical output and a
/// decode→re-encode round-trip does not drift.
#[derive(Debug, Clone, Default)]
pub struct VectorQuantization {
    samples: Vec<f32>,
    codebook: Vec<f32>,
}

impl VectorQuantization {
    pub fn new() -> Self {
        VectorQuantization::default()
    }

    /// Collect one training sample for the codebook build.
    pub fn add(&mut self, sample: f32) {
        self.samples.push(sample);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Codewords in ascending order; valid after `build_codebook`.
    pub fn codebook(&self) -> &[f32] {
        &self.codebook
    }

    /// Cluster the collected samples into `size` codewords and return the
    /// mean squared distortion over the samples.
    ///
    /// When the samples have no more distinct values than codewords, the
    /// codebook is the distinct values themselves (padded by repeating the
    /// largest) and the distortion is exactly zero.
    pub fn build_codebook(&mut self, size: usize) -> f64 {
        if size == 0 || self.samples.is_empty() {
            self.codebook = vec![0.0; size];
            return 0.0;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_by(f32::total_cmp);

        let mut distinct = sorted.clone();
        distinct.dedup();
        if distinct.len() <= size {
            let pad = distinct[distinct.len() - 1];
            distinct.resize(size, pad);
            self.codebook = distinct;
            return 0.0;
        }

        let n = sorted.len();
        let mut centroids: Vec<f32> = (0..size)
            .map(|k| sorted[((2 * k + 1) * n) / (2 * size)])
            .collect();

        let mut distortion = f64::INFINITY;
        for _ in 0..MAX_ITERATIONS {
            centroids.sort_by(f32::total_cmp);

            let mut sums = vec![0.0f64; size];
            let mut counts = vec![0usize; size];
            let mut err = 0.0f64;

            // Samples and centroids are both ascending, so the nearest
            // centroid index never moves backwards across samples.
            let mut c = 0usize;
            for &v in &sorted {
                while c + 1 < size && (centroids[c + 1] - v).abs() < (centroids[c] - v).abs() {
                    c += 1;
                }
                let d = (v - centroids[c]) as f64;
                err += d * d;
                sums[c] += v as f64;
                counts[c] += 1;
            }

            let new_distortion = err / n as f64;
            for k in 0..size {
                // empty clusters keep their codeword
                if counts[k] > 0 {
                    centroids[k] = (sums[k] / counts[k] as f64) as f32;
                }
            }

            let converged = (distortion - new_distortion).abs() < CONVERGENCE_EPSILON;
            distortion = new_distortion;
            if converged {
                break;
            }
        }

        centroids.sort_by(f32::total_cmp);
        self.codebook = centroids;
        distortion
    }

    /// Index of the codeword nearest to `value`; ties resolve to the lower
    /// index so that encoding a codeword returns a stable index.
    pub fn compute_vq(&self, value: f32) -> usize {
        let cb = &self.codebook;
        if cb.len() <= 1 {
            return 0;
        }
        let i = cb.partition_point(|&c| c < value);
        if i == 0 {
            return 0;
        }
        if i == cb.len() {
            return cb.len() - 1;
        }
        if value - cb[i - 1] <= cb[i] - value {
            i - 1
        } else {
            i
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_codebook_for_few_distinct_values() {
        let mut vq = VectorQuantization::new();
        for _ in 0..10 {
            vq.add(0.5);
            vq.add(-0.25);
            vq.add(1.0);
        }

        let distortion = vq.build_codebook(8);
        assert_eq!(distortion, 0.0);
        assert_eq!(vq.codebook().len(), 8);

        // Each distinct value decodes back to itself.
        for &v in &[-0.25f32, 0.5, 1.0] {
            let idx = vq.compute_vq(v);
            assert_eq!(vq.codebook()[idx], v);
        }
    }

    #[test]
    fn test_nearest_codeword() {
        let mut vq = VectorQuantization::new();
        for &v in &[0.0f32, 0.0, 1.0, 1.0, 10.0, 10.0] {
            vq.add(v);
        }
        vq.build_codebook(3);

        let idx = vq.compute_vq(1.2);
        assert_eq!(vq.codebook()[idx], 1.0);
        let idx = vq.compute_vq(7.0);
        assert_eq!(vq.codebook()[idx], 10.0);
    }

    #[test]
    fn test_out_of_range_values_clamp_to_ends() {
        let mut vq = VectorQuantization::new();
        for i in 0..100 {
            vq.add(i as f32 * 0.01);
        }
        vq.build_codebook(4);

        assert_eq!(vq.compute_vq(-50.0), 0);
        assert_eq!(vq.compute_vq(50.0), vq.codebook().len() - 1);
    }

    #[test]
    fn test_reencoding_decoded_values_is_stable() {
        // More distinct values than codewords forces the clustering path.
        let mut vq = VectorQuantization::new();
        for i in 0..200 {
            vq.add((i % 17) as f32 * 0.3 - 2.0);
        }
        vq.build_codebook(4);

        let decoded: Vec<f32> = (0..200)
            .map(|i| vq.codebook()[vq.compute_vq((i % 17) as f32 * 0.3 - 2.0)])
            .collect();

        // Rebuilding from the decoded values must reproduce them exactly.
        let mut vq2 = VectorQuantization::new();
        for &v in &decoded {
            vq2.add(v);
        }
        let distortion = vq2.build_codebook(4);
        assert_eq!(distortion, 0.0);
        for &v in &decoded {
            assert_eq!(vq2.codebook()[vq2.compute_vq(v)], v);
        }
    }

    #[test]
    fn test_clustering_reduces_distortion_below_naive() {
        let mut vq = VectorQuantization::new();
        // two tight clusters far apart
        for i in 0..50 {
            vq.add(0.001 * i as f32);
            vq.add(100.0 + 0.001 * i as f32);
        }
        let distortion = vq.build_codebook(2);

        // each cluster gets its own codeword, distortion stays tiny
        assert!(distortion < 1e-3, "distortion was {distortion}");
        assert!(vq.codebook()[0] < 1.0 && vq.codebook()[1] > 99.0);
    }
}
