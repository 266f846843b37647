//! Risk models: a denoised or sample covariance matrix over the universe.
//!
//! Pipeline shared by every strategy:
//! 1. fetch closes for `assets_at(dt)` up to `dt`
//! 2. build returns (optionally trailing-filtered)
//! 3. estimate per-asset volatility
//! 4. estimate the correlation matrix (sample, Marchenko–Pastur, custom)
//! 5. Σ = D·C·D

pub mod covariance;
pub mod marchenko_pastur;

use crate::domain::error::PortconError;
use crate::domain::market::Timestamp;
use crate::domain::returns::{ReturnSeries, ReturnSettings};
use crate::ports::data_port::{PriceDataPort, UniversePort};
use covariance::{CovarianceMatrix, sample_correlation};
use marchenko_pastur::MarchenkoPastur;
use nalgebra::DMatrix;
use std::fmt;
use std::sync::Arc;

/// Sample volatility needs at least two observations.
pub const MIN_RETURN_OBSERVATIONS: usize = 2;

pub type VolatilityFn = Arc<dyn Fn(&ReturnSeries) -> Vec<f64> + Send + Sync>;
pub type CorrelationFn = Arc<dyn Fn(&ReturnSeries) -> DMatrix<f64> + Send + Sync>;

#[derive(Clone, Default)]
pub enum VolatilityEstimator {
    /// Sample standard deviation.
    #[default]
    Sample,
    Custom(VolatilityFn),
}

#[derive(Clone, Default)]
pub enum CorrelationEstimator {
    /// Sample Pearson correlation.
    #[default]
    Sample,
    MarchenkoPastur(MarchenkoPastur),
    Custom(CorrelationFn),
}

impl fmt::Debug for VolatilityEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityEstimator::Sample => write!(f, "Sample"),
            VolatilityEstimator::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl fmt::Debug for CorrelationEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationEstimator::Sample => write!(f, "Sample"),
            CorrelationEstimator::MarchenkoPastur(mp) => write!(f, "MarchenkoPastur({mp:?})"),
            CorrelationEstimator::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl VolatilityEstimator {
    fn estimate(&self, returns: &ReturnSeries) -> Result<Vec<f64>, PortconError> {
        let vol = match self {
            VolatilityEstimator::Sample => returns.std_dev(),
            VolatilityEstimator::Custom(f) => f(returns),
        };
        if vol.len() != returns.asset_count() {
            return Err(PortconError::configuration(format!(
                "volatility estimator returned {} values for {} assets",
                vol.len(),
                returns.asset_count()
            )));
        }
        Ok(vol)
    }
}

impl CorrelationEstimator {
    fn estimate(&self, returns: &ReturnSeries) -> Result<DMatrix<f64>, PortconError> {
        let n = returns.asset_count();
        let corr = match self {
            CorrelationEstimator::Sample => sample_correlation(returns),
            CorrelationEstimator::MarchenkoPastur(mp) => {
                mp.filter(&sample_correlation(returns), returns.observations())
            }
            CorrelationEstimator::Custom(f) => {
                let mut corr = f(returns);
                if corr.nrows() == n && corr.ncols() == n {
                    corr.fill_diagonal(1.0);
                }
                corr
            }
        };
        if corr.nrows() != n || corr.ncols() != n {
            return Err(PortconError::configuration(format!(
                "correlation estimator returned a {}x{} matrix for {} assets",
                corr.nrows(),
                corr.ncols(),
                n
            )));
        }
        Ok(corr)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskModel {
    pub returns: ReturnSettings,
    pub volatility: VolatilityEstimator,
    pub correlation: CorrelationEstimator,
}

impl RiskModel {
    pub fn sample(returns: ReturnSettings) -> Self {
        RiskModel {
            returns,
            ..RiskModel::default()
        }
    }

    pub fn rmt(returns: ReturnSettings, filter: MarchenkoPastur) -> Self {
        RiskModel {
            returns,
            correlation: CorrelationEstimator::MarchenkoPastur(filter),
            ..RiskModel::default()
        }
    }

    pub fn with_volatility(mut self, volatility: VolatilityEstimator) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationEstimator) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn covariance(
        &self,
        dt: Timestamp,
        universe: &dyn UniversePort,
        data: &dyn PriceDataPort,
    ) -> Result<CovarianceMatrix, PortconError> {
        let assets = universe.assets_at(dt);
        if assets.is_empty() {
            return Err(PortconError::InsufficientData {
                context: format!("risk model at {dt}: empty universe"),
                observations: 0,
                minimum: MIN_RETURN_OBSERVATIONS,
            });
        }
        let prices = data.historical_closes(&assets, dt, None)?;
        let returns = self.returns.build(&prices);
        self.covariance_from_returns(&returns)
            .map_err(|e| match e {
                PortconError::InsufficientData {
                    observations,
                    minimum,
                    ..
                } => PortconError::InsufficientData {
                    context: format!("risk model at {dt}"),
                    observations,
                    minimum,
                },
                other => other,
            })
    }

    pub fn covariance_from_returns(
        &self,
        returns: &ReturnSeries,
    ) -> Result<CovarianceMatrix, PortconError> {
        if returns.observations() < MIN_RETURN_OBSERVATIONS || returns.asset_count() == 0 {
            return Err(PortconError::InsufficientData {
                context: "risk model".to_string(),
                observations: returns.observations(),
                minimum: MIN_RETURN_OBSERVATIONS,
            });
        }

        let volatility = self.volatility.estimate(returns)?;
        let correlation = self.correlation.estimate(returns)?;
        CovarianceMatrix::from_correlation(returns.assets.clone(), &volatility, &correlation)
    }
}

impl fmt::Display for RiskModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.correlation {
            CorrelationEstimator::Sample => "SampleCovariance",
            CorrelationEstimator::MarchenkoPastur(_) => "RMTCovariance",
            CorrelationEstimator::Custom(_) => "CustomCovariance",
        };
        match self.returns.trailing_window {
            Some(window) => write!(f, "Tailing{name}({}d)", window.num_days()),
            None => write!(f, "{name}"),
        }
    }
}
