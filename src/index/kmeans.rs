//! Spherical k-means over unit vectors.
//!
//! Centroids are re-normalized after every update, so "nearest" means
//! highest inner product. Assignment runs on the rayon pool.

use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::embedding::l2_normalize;

/// Inner product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Index of the centroid with the highest inner product against `v`.
pub fn nearest_centroid(centroids: &[Vec<f32>], v: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let score = dot(c, v);
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

/// Train `k` centroids on `samples`.
///
/// `k` is clamped to the sample count. Initial centroids are `k` distinct
/// samples chosen by `rng`; a cluster that loses all members keeps its
/// previous centroid. Stops early once assignments are stable.
pub fn train(samples: &[&[f32]], k: usize, iterations: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let k = k.min(samples.len());
    if k == 0 {
        return Vec::new();
    }
    let dims = samples[0].len();

    let mut centroids: Vec<Vec<f32>> = rand::seq::index::sample(rng, samples.len(), k)
        .into_iter()
        .map(|i| samples[i].to_vec())
        .collect();
    let mut assignments = vec![usize::MAX; samples.len()];

    for _ in 0..iterations.max(1) {
        let next: Vec<usize> = samples
            .par_iter()
            .map(|s| nearest_centroid(&centroids, s))
            .collect();
        if next == assignments {
            break;
        }
        assignments = next;

        let mut sums = vec![vec![0.0f32; dims]; k];
        let mut counts = vec![0usize; k];
        for (sample, &cluster) in samples.iter().zip(&assignments) {
            counts[cluster] += 1;
            for (acc, x) in sums[cluster].iter_mut().zip(sample.iter()) {
                *acc += x;
            }
        }
        for ((centroid, mut sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            if count > 0 {
                l2_normalize(&mut sum);
                *centroid = sum;
            }
        }
    }

    centroids
}
