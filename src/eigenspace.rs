//! The eigenspace store: the trained eigenfunction table and the bins it is
//! sampled on, validated once at load time and read-only afterwards.
//!
//! Eigenfunction `j` is a one-dimensional function of input dimension
//! `index_map[j]`. Its values at the bin positions of that dimension are
//! stored in column `j` of the eigenfunction table, so interpolating a new
//! sample never requires a new decomposition.

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{Error, Result};

/// An optional linear map from raw descriptors into the space the bins live
/// in, usually the PCA rotation applied before the eigenfunctions were fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection
{
    /// Shape: (input_dim)
    pub mean: Array1<f64>,
    /// Shape: (input_dim, bin_dims)
    pub rotation: Array2<f64>,
}

impl Projection
{
    pub fn input_dim(&self) -> usize
    {
        self.rotation.nrows()
    }

    /// Computes (x - mean)·rotation.
    pub fn apply(&self, x: ArrayView1<f64>) -> Array1<f64>
    {
        let centered = &x - &self.mean;
        centered.dot(&self.rotation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EigenBasis
{
    /// Shape: (bins, k). The `uu1` table.
    eigenfunctions: Array2<f64>,
    /// Shape: (bins, dims). The `bins_out` table, non-decreasing per column.
    bins: Array2<f64>,
    /// Length k. The `jj` vector: the input dimension of each eigenfunction.
    index_map: Vec<usize>,
    projection: Option<Projection>,
    /// The distinct input dimensions read by any eigenfunction, in first-use order.
    active_dims: Vec<usize>,
    /// For each eigenfunction, its dimension's position in `active_dims`.
    slots: Vec<usize>,
}

impl EigenBasis
{
    /// Validates and takes ownership of the trained eigenspace.
    ///
    /// Fails with `MalformedBasis` if the tables disagree on their number of
    /// bins, if the index map does not have one entry per eigenfunction or
    /// points past the last bin column, if any bin column decreases, or if
    /// either table holds a non-finite value.
    pub fn load(basis: Array2<f64>, bin_bounds: Array2<f64>, index_map: Vec<usize>) -> Result<EigenBasis>
    {
        let (bin_count, rank) = basis.dim();
        if bin_count == 0 || rank == 0 {
            return Err(Error::MalformedBasis(format!("Eigenfunction table is empty ({} x {})", bin_count, rank)));
        }
        if bin_bounds.nrows() != bin_count {
            return Err(Error::MalformedBasis(format!(
                "Eigenfunction table has {} bins but the bin table has {}",
                bin_count,
                bin_bounds.nrows()
            )));
        }
        if bin_bounds.ncols() == 0 {
            return Err(Error::MalformedBasis("Bin table has no dimensions".to_string()));
        }
        if index_map.len() != rank {
            return Err(Error::MalformedBasis(format!(
                "Index map has {} entries for {} eigenfunctions",
                index_map.len(),
                rank
            )));
        }
        if let Some((j, dim)) = index_map.iter().enumerate().find(|(_, d)| **d >= bin_bounds.ncols()) {
            return Err(Error::MalformedBasis(format!(
                "Eigenfunction {} refers to dimension {} but the bin table has {} dimensions",
                j,
                dim,
                bin_bounds.ncols()
            )));
        }
        if basis.iter().any(|v| !v.is_finite()) {
            return Err(Error::MalformedBasis("Eigenfunction table contains non-finite values".to_string()));
        }
        for (dim, column) in bin_bounds.columns().into_iter().enumerate() {
            if column.iter().any(|v| !v.is_finite()) {
                return Err(Error::MalformedBasis(format!("Bins of dimension {} contain non-finite values", dim)));
            }
            if column.windows(2).into_iter().any(|w| w[1] < w[0]) {
                return Err(Error::MalformedBasis(format!("Bins of dimension {} are not non-decreasing", dim)));
            }
        }

        let mut active_dims: Vec<usize> = Vec::new();
        let slots = index_map
            .iter()
            .map(|dim| match active_dims.iter().position(|d| d == dim) {
                Some(slot) => slot,
                None => {
                    active_dims.push(*dim);
                    active_dims.len() - 1
                }
            })
            .collect();

        Ok(EigenBasis { eigenfunctions: basis, bins: bin_bounds, index_map, projection: None, active_dims, slots })
    }

    /// Attaches a projection applied to every sample before interpolation.
    pub fn with_projection(mut self, projection: Projection) -> Result<EigenBasis>
    {
        if projection.rotation.ncols() != self.bins.ncols() {
            return Err(Error::MalformedBasis(format!(
                "Projection produces {} dimensions but the bin table has {}",
                projection.rotation.ncols(),
                self.bins.ncols()
            )));
        }
        if projection.mean.len() != projection.rotation.nrows() {
            return Err(Error::MalformedBasis(format!(
                "Projection mean has length {} but the rotation expects {} inputs",
                projection.mean.len(),
                projection.rotation.nrows()
            )));
        }
        if projection.mean.iter().chain(projection.rotation.iter()).any(|v| !v.is_finite()) {
            return Err(Error::MalformedBasis("Projection contains non-finite values".to_string()));
        }
        self.projection = Some(projection);
        Ok(self)
    }

    /// Number of eigenfunctions, i.e. the length of an interpolated eigenvector.
    pub fn rank(&self) -> usize
    {
        self.eigenfunctions.ncols()
    }

    pub fn bin_count(&self) -> usize
    {
        self.bins.nrows()
    }

    /// Number of dimensions the bins are defined over.
    pub fn bin_dims(&self) -> usize
    {
        self.bins.ncols()
    }

    /// The dimensionality a feature vector must have.
    pub fn input_dim(&self) -> usize
    {
        match &self.projection {
            Some(projection) => projection.input_dim(),
            None => self.bin_dims(),
        }
    }

    pub fn eigenfunctions(&self) -> &Array2<f64>
    {
        &self.eigenfunctions
    }

    pub fn bins(&self) -> &Array2<f64>
    {
        &self.bins
    }

    pub fn index_map(&self) -> &[usize]
    {
        &self.index_map
    }

    pub fn projection(&self) -> Option<&Projection>
    {
        self.projection.as_ref()
    }

    pub(crate) fn active_dims(&self) -> &[usize]
    {
        &self.active_dims
    }

    pub(crate) fn slots(&self) -> &[usize]
    {
        &self.slots
    }
}

#[cfg(test)]
mod tests
{
    use ndarray::array;

    use super::*;

    fn expect_malformed(result: Result<EigenBasis>)
    {
        match result {
            Err(Error::MalformedBasis(_)) => {},
            other => panic!("Expected MalformedBasis, got {:?}", other),
        }
    }

    #[test]
    fn load_valid_basis()
    {
        let basis = EigenBasis::load(
            array![[0.1, 1.0, -1.0], [0.2, 2.0, -2.0], [0.3, 3.0, -3.0]],
            array![[0.0, 10.0], [1.0, 20.0], [2.0, 30.0]],
            vec![0, 1, 0],
        ).unwrap();
        assert_eq!(basis.rank(), 3);
        assert_eq!(basis.bin_count(), 3);
        assert_eq!(basis.input_dim(), 2);
        assert_eq!(basis.active_dims(), &[0, 1]);
        assert_eq!(basis.slots(), &[0, 1, 0]);
    }

    #[test]
    fn load_rejects_bin_count_mismatch()
    {
        expect_malformed(EigenBasis::load(array![[0.1], [0.2]], array![[0.0], [1.0], [2.0]], vec![0]));
    }

    #[test]
    fn load_rejects_index_map_length()
    {
        expect_malformed(EigenBasis::load(array![[0.1, 0.2], [0.3, 0.4]], array![[0.0], [1.0]], vec![0]));
    }

    #[test]
    fn load_rejects_out_of_range_index()
    {
        expect_malformed(EigenBasis::load(array![[0.1], [0.2]], array![[0.0], [1.0]], vec![1]));
    }

    #[test]
    fn load_rejects_decreasing_bins()
    {
        expect_malformed(EigenBasis::load(array![[0.1], [0.2], [0.3]], array![[0.0], [2.0], [1.0]], vec![0]));
    }

    #[test]
    fn load_accepts_repeated_bin_edges()
    {
        assert!(EigenBasis::load(array![[0.1], [0.2], [0.3]], array![[0.0], [1.0], [1.0]], vec![0]).is_ok());
    }

    #[test]
    fn load_rejects_non_finite_values()
    {
        expect_malformed(EigenBasis::load(array![[f64::NAN], [0.2]], array![[0.0], [1.0]], vec![0]));
        expect_malformed(EigenBasis::load(array![[0.1], [0.2]], array![[0.0], [f64::INFINITY]], vec![0]));
    }

    #[test]
    fn projection_must_match_bins()
    {
        let basis = EigenBasis::load(array![[0.1], [0.2]], array![[0.0, 0.0], [1.0, 1.0]], vec![0]).unwrap();
        let bad = Projection { mean: array![0.0, 0.0, 0.0], rotation: Array2::zeros((3, 1)) };
        expect_malformed(basis.clone().with_projection(bad));

        let good = Projection { mean: array![0.0, 0.0, 0.0], rotation: Array2::zeros((3, 2)) };
        let basis = basis.with_projection(good).unwrap();
        assert_eq!(basis.input_dim(), 3);
        assert_eq!(basis.bin_dims(), 2);
    }

    #[test]
    fn projection_centers_then_rotates()
    {
        let projection = Projection { mean: array![1.0, 1.0], rotation: array![[1.0, 0.0], [1.0, 2.0]] };
        let z = projection.apply(array![2.0, 3.0].view());
        // centered [1, 2]
        assert_eq!(z, array![3.0, 4.0]);
    }
}
