//! Random-matrix-theory denoising of a sample correlation matrix.
//!
//! For T observations of N assets, Q = T / N and noise level σ, the
//! eigenvalues of a pure-noise correlation matrix fall in the bulk
//!
//!   [σ²(1 − 1/√Q)², σ²(1 + 1/√Q)²]
//!
//! Eigenvalues inside the bulk are replaced with 0; the rest are kept.
//! The filtered matrix V·diag(λ)·Vᵗ is symmetrized and its diagonal reset
//! to exactly 1.0.

use crate::domain::risk::covariance::symmetrize;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarchenkoPastur {
    /// Observations-to-assets ratio; `None` derives T / N from the data.
    pub q: Option<f64>,
    /// Noise standard deviation; `None` means 1.0.
    pub sigma: Option<f64>,
}

impl MarchenkoPastur {
    pub fn new(q: Option<f64>, sigma: Option<f64>) -> Self {
        MarchenkoPastur { q, sigma }
    }

    /// Theoretical (min, max) eigenvalue of the noise bulk.
    pub fn bulk(&self, observations: usize, assets: usize) -> (f64, f64) {
        let q = self
            .q
            .unwrap_or_else(|| observations as f64 / assets as f64);
        let sigma = self.sigma.unwrap_or(1.0);
        let root = (1.0 / q).sqrt();
        (
            (sigma * (1.0 - root)).powi(2),
            (sigma * (1.0 + root)).powi(2),
        )
    }

    pub fn filter(&self, correlation: &DMatrix<f64>, observations: usize) -> DMatrix<f64> {
        let n = correlation.nrows();
        if n == 0 {
            return correlation.clone();
        }
        let (lo, hi) = self.bulk(observations, n);

        let eigen = symmetrize(correlation).symmetric_eigen();
        let filtered = DVector::from_iterator(
            n,
            eigen
                .eigenvalues
                .iter()
                .map(|&l| if l >= lo && l <= hi { 0.0 } else { l }),
        );

        let v = &eigen.eigenvectors;
        let rebuilt = v * DMatrix::from_diagonal(&filtered) * v.transpose();
        let mut out = symmetrize(&rebuilt);
        out.fill_diagonal(1.0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bulk_edges() {
        // Q = 4: 1/sqrt(Q) = 0.5
        let (lo, hi) = MarchenkoPastur::default().bulk(400, 100);
        assert_relative_eq!(lo, 0.25, epsilon = 1e-12);
        assert_relative_eq!(hi, 2.25, epsilon = 1e-12);

        let (lo, hi) = MarchenkoPastur::new(Some(4.0), Some(2.0)).bulk(10, 10);
        assert_relative_eq!(lo, 1.0, epsilon = 1e-12);
        assert_relative_eq!(hi, 9.0, epsilon = 1e-12);
    }

    #[test]
    fn signal_eigenvalue_survives() {
        // Two perfectly correlated assets: eigenvalues {0, 2}. With Q = 100
        // the bulk is [0.81, 1.21]; both lie outside and survive.
        let corr = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let out = MarchenkoPastur::default().filter(&corr, 200);
        assert_relative_eq!(out[(0, 1)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn noise_eigenvalues_are_zeroed() {
        // Eigenvalues {0.9, 1.1} both inside the bulk for Q = 100: the
        // off-diagonal structure is removed entirely.
        let corr = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.1, 1.0]);
        let out = MarchenkoPastur::default().filter(&corr, 200);
        assert_relative_eq!(out[(0, 1)], 0.0, epsilon = 1e-12);
        assert_eq!(out[(0, 0)], 1.0);
        assert_eq!(out[(1, 1)], 1.0);
    }

    #[test]
    fn output_is_symmetric_with_unit_diagonal() {
        let corr = DMatrix::from_row_slice(
            3,
            3,
            &[1.0, 0.6, -0.2, 0.6, 1.0, 0.1, -0.2, 0.1, 1.0],
        );
        let out = MarchenkoPastur::default().filter(&corr, 5);
        for i in 0..3 {
            assert_eq!(out[(i, i)], 1.0);
            for j in 0..3 {
                assert_eq!(out[(i, j)], out[(j, i)]);
            }
        }
    }
}
