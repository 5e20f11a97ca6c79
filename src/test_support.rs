//! Synthetic eigenspaces and samples shared by the unit tests.

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::eigenspace::EigenBasis;
use crate::features::FeatureVector;
use crate::interpolate::interpolate;
use crate::training::{ConceptId, TrainingSet};

pub const DIMS: usize = 4;
pub const BINS: usize = 21;
pub const CENTERS: [[f64; DIMS]; 3] = [
    [0.5, 0.5, -0.5, 0.0],
    [-0.5, 0.5, 0.5, 0.0],
    [0.0, -0.5, 0.0, 0.5],
];
pub const CONCEPTS: [ConceptId; 3] = [ConceptId(3), ConceptId(11), ConceptId(42)];

/// Six eigenfunctions over four dimensions with bins evenly spaced on [-1, 1].
/// The first four are the identity of their dimension; the last two are a
/// cosine and a sine of dimensions 0 and 1.
pub fn basis() -> EigenBasis
{
    let index_map = vec![0, 1, 2, 3, 0, 1];
    let mut bins = Array2::<f64>::zeros((BINS, DIMS));
    let mut table = Array2::<f64>::zeros((BINS, index_map.len()));
    for b in 0..BINS {
        let x = -1.0 + 2.0 * (b as f64) / ((BINS - 1) as f64);
        for d in 0..DIMS {
            bins[[b, d]] = x;
        }
        for j in 0..DIMS {
            table[[b, j]] = x;
        }
        table[[b, 4]] = (std::f64::consts::PI * x).cos();
        table[[b, 5]] = (std::f64::consts::PI * x).sin();
    }
    EigenBasis::load(table, bins, index_map).unwrap()
}

/// Deterministic jitter in [-scale, scale).
pub struct Jitter(ChaCha8Rng);

impl Jitter
{
    pub fn new(seed: u64) -> Self
    {
        Jitter(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn sample(&mut self, scale: f64) -> f64
    {
        self.0.gen_range(-scale..scale)
    }
}

/// `count` samples cycling through the clusters, with their concepts.
pub fn samples(count: usize, seed: u64) -> (Vec<FeatureVector>, Vec<ConceptId>)
{
    let mut jitter = Jitter::new(seed);
    let mut features = Vec::with_capacity(count);
    let mut labels = Vec::with_capacity(count);
    for i in 0..count {
        let cluster = i % CENTERS.len();
        let values: Vec<f64> = CENTERS[cluster].iter().map(|c| c + jitter.sample(0.1)).collect();
        features.push(FeatureVector::new(values));
        labels.push(CONCEPTS[cluster]);
    }
    (features, labels)
}

/// Training eigenvectors interpolated from 60 labelled samples.
pub fn training(basis: &EigenBasis) -> (TrainingSet, Vec<FeatureVector>)
{
    let (features, labels) = samples(60, 7);
    let eigenvectors = interpolate(basis, &features).unwrap().eigenvectors;
    (TrainingSet::new(eigenvectors, labels).unwrap(), features)
}

pub fn eigenvalues(rank: usize) -> Array1<f64>
{
    Array1::from_iter((0..rank).map(|j| 0.01 * (j + 1) as f64))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn jitter_is_seeded_and_bounded()
    {
        let (mut a, mut b) = (Jitter::new(7), Jitter::new(7));
        for _ in 0..100 {
            let x = a.sample(0.1);
            assert_eq!(x, b.sample(0.1));
            assert!((-0.1..0.1).contains(&x));
        }
        assert_ne!(Jitter::new(7).sample(0.1), Jitter::new(8).sample(0.1));
    }
}
