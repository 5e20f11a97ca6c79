//! Incremental interpolation of eigenvectors for new samples.
//!
//! Each eigenfunction is piecewise linear between the bins of its input
//! dimension. A sample's coordinate is located with a binary search over
//! those bins and the eigenfunction values on either side are blended.
//! Coordinates beyond the outermost bins are clamped to the edge value;
//! this degrades the estimate slightly instead of dropping the sample.

use log::{trace, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1};

use crate::eigenspace::EigenBasis;
use crate::error::{Error, Result};
use crate::features::FeatureVector;

/// Interpolated eigenvectors for one batch of samples.
#[derive(Debug, Clone)]
pub struct Interpolated
{
    /// Shape: (samples, rank)
    pub eigenvectors: Array2<f64>,
    /// How many coordinates fell outside the trained bin range and were clamped.
    pub clamped: usize,
}

/// The position of a coordinate within the bins of one dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BinLocation
{
    /// Index of the lower bin.
    pub lower: usize,
    /// Blend weight of the bin above `lower`, in [0, 1].
    pub t: f64,
    pub clamped: bool,
}

/// Locates `x` among the non-decreasing `bins`.
/// `x` must not be NaN.
pub(crate) fn locate(bins: ArrayView1<f64>, x: f64) -> BinLocation
{
    let last = bins.len() - 1;
    if x < bins[0] {
        return BinLocation { lower: 0, t: 0.0, clamped: true };
    }
    if x >= bins[last] {
        return BinLocation { lower: last, t: 0.0, clamped: x > bins[last] };
    }

    // bins[0] <= x < bins[last], so the partition point lies in 1..=last and
    // x sits on or after the last bin edge equal to it.
    let upper = match bins.as_slice() {
        Some(slice) => slice.partition_point(|b| *b <= x),
        None => {
            let (mut lo, mut hi) = (0, bins.len());
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if bins[mid] <= x { lo = mid + 1 } else { hi = mid }
            }
            lo
        }
    };
    let lower = upper - 1;
    // bins[lower] <= x < bins[upper], so the width is positive.
    let t = (x - bins[lower]) / (bins[upper] - bins[lower]);
    BinLocation { lower, t, clamped: false }
}

/// Interpolates the eigenvector of one sample into `out`.
/// Returns the number of clamped coordinates.
fn interpolate_into(basis: &EigenBasis, sample_index: usize, sample: &FeatureVector, mut out: ArrayViewMut1<f64>) -> Result<usize>
{
    if sample.len() != basis.input_dim() {
        return Err(Error::DimensionMismatch { what: "feature vector", expected: basis.input_dim(), found: sample.len() });
    }
    if let Some(dimension) = sample.as_slice().iter().position(|v| v.is_nan()) {
        return Err(Error::NonFiniteFeature { sample: sample_index, dimension });
    }

    let projected: Option<Array1<f64>> = basis.projection().map(|p| p.apply(sample.view()));
    let z = match &projected {
        Some(z) => z.view(),
        None => sample.view(),
    };
    // Projection may turn infinities into NaN.
    if let Some(dimension) = z.iter().position(|v| v.is_nan()) {
        return Err(Error::NonFiniteFeature { sample: sample_index, dimension });
    }

    let bins = basis.bins();
    let locations: Vec<BinLocation> = basis
        .active_dims()
        .iter()
        .map(|&dim| locate(bins.column(dim), z[dim]))
        .collect();

    let clamped = locations.iter().filter(|l| l.clamped).count();
    if clamped > 0 {
        trace!("Sample {} has {} coordinates outside the trained bin range; clamping to the nearest bin", sample_index, clamped);
    }

    let table = basis.eigenfunctions();
    let last = basis.bin_count() - 1;
    for (j, slot) in basis.slots().iter().enumerate() {
        let loc = locations[*slot];
        let below = table[[loc.lower, j]];
        out[j] = if loc.t == 0.0 || loc.lower == last {
            below
        } else {
            let above = table[[loc.lower + 1, j]];
            below + loc.t * (above - below)
        };
    }

    Ok(clamped)
}

/// Interpolates the eigenvectors of a batch of samples.
///
/// `offset` is the index of the first sample within the whole request and
/// is only used for error reporting and logging. Samples are independent,
/// so the result for a sample does not depend on the rest of the batch.
pub fn interpolate_batch(basis: &EigenBasis, batch: &[FeatureVector], offset: usize) -> Result<Interpolated>
{
    interpolate_rows(basis, batch.iter(), offset)
}

/// `interpolate_batch` over borrowed samples that are not laid out as a
/// slice of feature vectors.
pub(crate) fn interpolate_rows<'f, I>(basis: &EigenBasis, samples: I, offset: usize) -> Result<Interpolated>
where
    I: ExactSizeIterator<Item = &'f FeatureVector>,
{
    let count = samples.len();
    let mut eigenvectors = Array2::<f64>::zeros((count, basis.rank()));
    let mut clamped = 0;
    for (i, (sample, row)) in samples.zip(eigenvectors.rows_mut()).enumerate() {
        clamped += interpolate_into(basis, offset + i, sample, row)?;
    }
    if clamped > 0 {
        warn!(
            "Clamped {} out-of-range coordinates while interpolating samples {}..{}",
            clamped,
            offset,
            offset + count
        );
    }
    Ok(Interpolated { eigenvectors, clamped })
}

/// Interpolates the eigenvectors of `batch`.
pub fn interpolate(basis: &EigenBasis, batch: &[FeatureVector]) -> Result<Interpolated>
{
    interpolate_batch(basis, batch, 0)
}
