//! Alpha models: per-asset scalar forecasts ("expected return" or a fixed
//! signal) for the assets in the universe at a given time.

use crate::domain::error::PortconError;
use crate::domain::market::Timestamp;
use crate::domain::returns::ReturnSettings;
use crate::ports::data_port::{PriceDataPort, UniversePort};
use std::collections::BTreeMap;
use std::fmt;

pub type ForecastVector = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub enum AlphaModel {
    /// Caller-supplied constant mapping; ignores time and history.
    Fixed(ForecastVector),
    /// The same signal for every asset in the universe at `dt`.
    SingleFixed { signal: f64 },
    /// Mean of each asset's historical returns.
    ExpectedReturns(ReturnSettings),
}

impl Default for AlphaModel {
    fn default() -> Self {
        AlphaModel::SingleFixed { signal: 1.0 }
    }
}

impl AlphaModel {
    pub fn forecast(
        &self,
        dt: Timestamp,
        universe: &dyn UniversePort,
        data: &dyn PriceDataPort,
    ) -> Result<ForecastVector, PortconError> {
        match self {
            AlphaModel::Fixed(signals) => Ok(signals.clone()),
            AlphaModel::SingleFixed { signal } => Ok(universe
                .assets_at(dt)
                .into_iter()
                .map(|asset| (asset, *signal))
                .collect()),
            AlphaModel::ExpectedReturns(settings) => {
                let assets = universe.assets_at(dt);
                if assets.is_empty() {
                    return Ok(ForecastVector::new());
                }

                let prices = data.historical_closes(&assets, dt, None)?;
                let returns = settings.build(&prices);
                if returns.is_empty() {
                    return Err(PortconError::InsufficientData {
                        context: format!("expected-returns alpha at {dt}"),
                        observations: 0,
                        minimum: 1,
                    });
                }

                Ok(returns.assets.iter().cloned().zip(returns.mean()).collect())
            }
        }
    }
}

impl fmt::Display for AlphaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlphaModel::Fixed(signals) => write!(f, "FixedWeights(n={})", signals.len()),
            AlphaModel::SingleFixed { signal } => write!(f, "SingleFixedWeight({signal})"),
            AlphaModel::ExpectedReturns(settings) => match settings.trailing_window {
                Some(window) => write!(
                    f,
                    "TailingExpectedReturns({}, {}d)",
                    settings.mode,
                    window.num_days()
                ),
                None => write!(f, "ExpectedReturns({})", settings.mode),
            },
        }
    }
}
