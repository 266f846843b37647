//! Asset covariance and correlation matrices.
//!
//! Covariance is reconstructed from a correlation matrix and per-asset
//! volatilities: Σ = D·C·D with D = diag(volatility). Only the upper
//! triangle is computed and mirrored, so M[i][j] == M[j][i] exactly.

use crate::domain::error::PortconError;
use crate::domain::returns::ReturnSeries;
use nalgebra::DMatrix;

/// Square, symmetric matrix indexed by asset on both axes.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    pub assets: Vec<String>,
    pub values: DMatrix<f64>,
}

impl CovarianceMatrix {
    pub fn new(assets: Vec<String>, values: DMatrix<f64>) -> Result<Self, PortconError> {
        if !values.is_square() || values.nrows() != assets.len() {
            return Err(PortconError::configuration(format!(
                "covariance matrix is {}x{} but indexed by {} assets",
                values.nrows(),
                values.ncols(),
                assets.len()
            )));
        }
        Ok(CovarianceMatrix {
            assets,
            values: symmetrize(&values),
        })
    }

    /// Σ = D·C·D.
    pub fn from_correlation(
        assets: Vec<String>,
        volatility: &[f64],
        correlation: &DMatrix<f64>,
    ) -> Result<Self, PortconError> {
        let n = assets.len();
        if volatility.len() != n || correlation.nrows() != n || correlation.ncols() != n {
            return Err(PortconError::configuration(format!(
                "cannot combine {} volatilities with a {}x{} correlation matrix over {} assets",
                volatility.len(),
                correlation.nrows(),
                correlation.ncols(),
                n
            )));
        }

        let mut values = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let c = if i == j {
                    correlation[(i, i)]
                } else {
                    0.5 * (correlation[(i, j)] + correlation[(j, i)])
                };
                let v = volatility[i] * c * volatility[j];
                values[(i, j)] = v;
                values[(j, i)] = v;
            }
        }
        Ok(CovarianceMatrix { assets, values })
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn index_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.values[(self.index_of(a)?, self.index_of(b)?)])
    }

    pub fn variance(&self, asset: &str) -> Option<f64> {
        self.get(asset, asset)
    }
}

/// Mirror the average of the two triangles into both.
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows();
    let mut out = m.clone();
    for i in 0..n {
        for j in (i + 1)..n {
            let v = 0.5 * (m[(i, j)] + m[(j, i)]);
            out[(i, j)] = v;
            out[(j, i)] = v;
        }
    }
    out
}

/// Sample Pearson correlation of the return columns, unit diagonal.
///
/// An asset whose returns have zero variance is uncorrelated with every
/// other asset; its covariance row vanishes through its zero volatility.
pub fn sample_correlation(returns: &ReturnSeries) -> DMatrix<f64> {
    let n = returns.asset_count();
    let t = returns.observations();
    let means = returns.mean();

    let centered = DMatrix::from_fn(t, n, |r, c| returns.values[(r, c)] - means[c]);
    let scatter = centered.transpose() * &centered;

    let mut corr = DMatrix::identity(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let denom = (scatter[(i, i)] * scatter[(j, j)]).sqrt();
            let c = if denom > 0.0 {
                (scatter[(i, j)] / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            corr[(i, j)] = c;
            corr[(j, i)] = c;
        }
    }
    corr
}
