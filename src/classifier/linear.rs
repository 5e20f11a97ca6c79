//! Linear maximum-margin classifier.
//!
//! Trains an L2-regularized, L2-loss support vector classifier by dual
//! coordinate descent (Hsieh et al. 2008, the liblinear default solver).
//! The bias is learned as the weight of a constant feature, so it is
//! regularized along with the other weights, as in liblinear.
//!
//! Two-concept problems train a single separator. With more concepts, one
//! separator per concept is trained against the rest.

use log::{debug, warn};
use ndarray::{Array1, ArrayView1, ArrayView2, ArrayViewMut1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::training::{ConceptId, TrainingSet};

// Value of the constant feature the bias is learned on.
const BIAS_FEATURE: f64 = 1.0;
const MAX_ITERATIONS: usize = 1000;
// Stopping tolerance on the spread of the projected gradient.
const TOLERANCE: f64 = 1e-3;

/// One separating hyperplane: decision value w·x + b.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperplane
{
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl Hyperplane
{
    #[inline]
    pub fn decision_value(&self, x: ArrayView1<f64>) -> f64
    {
        ArrayView1::from(&self.weights[..]).dot(&x) + self.bias
    }
}

/// A trained linear model. Serializable so it can be trained once and
/// loaded for later requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel
{
    concepts: Vec<ConceptId>,
    /// A single hyperplane for two concepts (positive side is the first
    /// concept); otherwise one hyperplane per concept.
    hyperplanes: Vec<Hyperplane>,
    c: f64,
}

impl LinearModel
{
    pub fn train(training: &TrainingSet, c: f64) -> Result<LinearModel>
    {
        if !(c.is_finite() && c > 0.0) {
            return Err(Error::InvalidParameter { name: "c", reason: format!("must be finite and positive, got {}", c) });
        }

        let concepts = training.concepts().to_vec();
        let positives: Vec<ConceptId> = if concepts.len() == 2 { vec![concepts[0]] } else { concepts.clone() };

        let now = std::time::Instant::now();
        let hyperplanes: Vec<Hyperplane> = positives
            .par_iter()
            .map(|concept| {
                let targets = training.one_vs_rest_targets(*concept);
                let (hyperplane, iterations) = solve_dual(training.eigenvectors(), targets.view(), c);
                if iterations == MAX_ITERATIONS {
                    warn!("Linear SVM for concept {} reached the maximum of {} iterations", concept, MAX_ITERATIONS);
                } else {
                    debug!("Linear SVM for concept {} converged after {} iterations", concept, iterations);
                }
                hyperplane
            })
            .collect();
        debug!("Trained {} linear separators in {:?}", hyperplanes.len(), now.elapsed());

        Ok(LinearModel { concepts, hyperplanes, c })
    }

    pub fn concepts(&self) -> &[ConceptId]
    {
        &self.concepts
    }

    pub fn hyperplanes(&self) -> &[Hyperplane]
    {
        &self.hyperplanes
    }

    pub fn c(&self) -> f64
    {
        self.c
    }

    pub fn rank(&self) -> usize
    {
        self.hyperplanes.first().map(|h| h.weights.len()).unwrap_or(0)
    }

    /// Writes one decision value per concept into `out`.
    /// For two concepts these are f(x) and -f(x).
    pub(crate) fn decision_values_into(&self, x: ArrayView1<f64>, mut out: ArrayViewMut1<f64>)
    {
        if self.concepts.len() == 2 {
            let f = self.hyperplanes[0].decision_value(x);
            out[0] = f;
            out[1] = -f;
            return;
        }
        for (o, h) in out.iter_mut().zip(self.hyperplanes.iter()) {
            *o = h.decision_value(x);
        }
    }

    /// Checks a deserialized model before it is used.
    pub fn validate(&self) -> Result<()>
    {
        let expected = if self.concepts.len() == 2 { 1 } else { self.concepts.len() };
        if self.concepts.len() < 2 || self.hyperplanes.len() != expected {
            return Err(Error::InvalidParameter {
                name: "linear model",
                reason: format!("{} hyperplanes for {} concepts", self.hyperplanes.len(), self.concepts.len()),
            });
        }
        if self.concepts.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidParameter {
                name: "linear model",
                reason: "concepts must be strictly ascending".to_string(),
            });
        }
        let rank = self.rank();
        if self.hyperplanes.iter().any(|h| h.weights.len() != rank) {
            return Err(Error::InvalidParameter { name: "linear model", reason: "hyperplanes differ in length".to_string() });
        }
        if self.hyperplanes.iter().any(|h| !h.bias.is_finite() || h.weights.iter().any(|w| !w.is_finite())) {
            return Err(Error::InvalidParameter {
                name: "linear model",
                reason: "hyperplanes contain non-finite values".to_string(),
            });
        }
        Ok(())
    }
}

/// Dual coordinate descent for the L2-loss SVM:
///   min_a  ½ aᵀ(Q + D)a - eᵀa,  a >= 0,  Q_ij = y_i y_j x_i·x_j,  D = I / 2C.
/// Samples are visited in a fixed order so training is reproducible.
/// Returns the hyperplane and the number of outer iterations run.
fn solve_dual(x: ArrayView2<f64>, y: ArrayView1<f64>, c: f64) -> (Hyperplane, usize)
{
    let (samples, rank) = x.dim();
    let diag = 0.5 / c;

    let qd: Vec<f64> = x
        .rows()
        .into_iter()
        .map(|row| row.dot(&row) + BIAS_FEATURE * BIAS_FEATURE + diag)
        .collect();

    let mut alpha = vec![0.0f64; samples];
    let mut w = Array1::<f64>::zeros(rank);
    let mut b = 0.0f64;

    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let mut pg_max = f64::NEG_INFINITY;
        let mut pg_min = f64::INFINITY;

        for i in 0..samples {
            let xi = x.row(i);
            let yi = y[i];
            let g = yi * (w.dot(&xi) + b * BIAS_FEATURE) - 1.0 + diag * alpha[i];
            let pg = if alpha[i] == 0.0 { g.min(0.0) } else { g };
            pg_max = pg_max.max(pg);
            pg_min = pg_min.min(pg);

            if pg.abs() > 1e-12 {
                let old = alpha[i];
                alpha[i] = (old - g / qd[i]).max(0.0);
                let d = (alpha[i] - old) * yi;
                w.scaled_add(d, &xi);
                b += d * BIAS_FEATURE;
            }
        }

        if pg_max - pg_min <= TOLERANCE {
            break;
        }
    }

    (Hyperplane { weights: w.to_vec(), bias: b }, iterations)
}
