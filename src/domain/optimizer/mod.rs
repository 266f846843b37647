//! Portfolio optimizers: forecast vector + covariance matrix -> target
//! weights.

pub mod constraints;
pub mod objective;
pub mod solver;

use crate::domain::alpha::ForecastVector;
use crate::domain::error::PortconError;
use crate::domain::risk::covariance::CovarianceMatrix;
use constraints::{Bounds, EqualityConstraint, ExposureTargets, InitialGuess};
use nalgebra::DVector;
use objective::Objective;
use solver::SolverSettings;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Asset -> target weight; the only artifact handed to order sizing.
pub type TargetWeights = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default)]
pub struct MeanVarianceConfig {
    pub objective: Objective,
    pub exposure: ExposureTargets,
    pub bounds: Bounds,
    pub initial_guess: InitialGuess,
    /// Caller-supplied equalities, imposed in addition to the exposures.
    pub constraints: Vec<EqualityConstraint>,
    pub solver: SolverSettings,
}

impl MeanVarianceConfig {
    pub fn with_objective(objective: Objective) -> Self {
        MeanVarianceConfig {
            objective,
            ..MeanVarianceConfig::default()
        }
    }

    /// All equality constraints in evaluation order.
    pub fn equality_constraints(&self) -> Result<Vec<EqualityConstraint>, PortconError> {
        let mut all = self.exposure.constraints()?;
        all.extend(self.constraints.iter().cloned());
        Ok(all)
    }
}

#[derive(Debug, Clone, Default)]
pub enum PortfolioOptimizer {
    /// Returns the forecast unchanged.
    #[default]
    FixedWeight,
    /// `scale / N` for each of the N forecast assets.
    EqualWeight { scale: f64 },
    MeanVariance(Box<MeanVarianceConfig>),
}

impl PortfolioOptimizer {
    pub fn equal_weight() -> Self {
        PortfolioOptimizer::EqualWeight { scale: 1.0 }
    }

    /// Validates exposure targets up front so conflicts surface at
    /// construction time.
    pub fn mean_variance(config: MeanVarianceConfig) -> Result<Self, PortconError> {
        let exposure = config.exposure.resolve()?;
        if let Bounds::Uniform { .. } = config.bounds {
            config.bounds.resolve(1)?;
        }
        Ok(PortfolioOptimizer::MeanVariance(Box::new(MeanVarianceConfig {
            exposure,
            ..config
        })))
    }

    pub fn minimum_variance(exposure: ExposureTargets) -> Result<Self, PortconError> {
        Self::preset(Objective::Volatility, exposure)
    }

    pub fn max_sharpe(exposure: ExposureTargets) -> Result<Self, PortconError> {
        Self::preset(Objective::Sharpe, exposure)
    }

    pub fn mean_variance_preset(exposure: ExposureTargets) -> Result<Self, PortconError> {
        Self::preset(Objective::MeanVariance, exposure)
    }

    fn preset(objective: Objective, exposure: ExposureTargets) -> Result<Self, PortconError> {
        Self::mean_variance(MeanVarianceConfig {
            objective,
            exposure,
            ..MeanVarianceConfig::default()
        })
    }

    pub fn requires_risk(&self) -> bool {
        matches!(self, PortfolioOptimizer::MeanVariance(_))
    }

    pub fn optimize(
        &self,
        forecast: &ForecastVector,
        risk: Option<&CovarianceMatrix>,
    ) -> Result<TargetWeights, PortconError> {
        if let Some(risk) = risk {
            check_alignment(forecast, risk)?;
        }

        match self {
            PortfolioOptimizer::FixedWeight => Ok(forecast.clone()),
            PortfolioOptimizer::EqualWeight { scale } => {
                let n = forecast.len() as f64;
                Ok(forecast
                    .keys()
                    .map(|asset| (asset.clone(), scale / n))
                    .collect())
            }
            PortfolioOptimizer::MeanVariance(config) => {
                let risk = risk.ok_or_else(|| {
                    PortconError::configuration("mean-variance optimizer requires a risk model")
                })?;
                optimize_mean_variance(config, forecast, risk)
            }
        }
    }
}

/// Forecast keys must equal the covariance index set exactly.
pub fn check_alignment(
    forecast: &ForecastVector,
    risk: &CovarianceMatrix,
) -> Result<(), PortconError> {
    let missing: Vec<&str> = risk
        .assets
        .iter()
        .filter(|a| !forecast.contains_key(*a))
        .map(String::as_str)
        .collect();
    let extra: Vec<&str> = forecast
        .keys()
        .filter(|a| risk.index_of(a).is_none())
        .map(String::as_str)
        .collect();

    if missing.is_empty() && extra.is_empty() && forecast.len() == risk.len() {
        return Ok(());
    }
    Err(PortconError::configuration(format!(
        "forecast assets do not match risk matrix: missing forecast for [{}], no risk for [{}]",
        missing.join(", "),
        extra.join(", ")
    )))
}

fn optimize_mean_variance(
    config: &MeanVarianceConfig,
    forecast: &ForecastVector,
    risk: &CovarianceMatrix,
) -> Result<TargetWeights, PortconError> {
    let n = risk.len();
    if n == 0 {
        return Err(PortconError::InsufficientData {
            context: "mean-variance optimizer: empty forecast".to_string(),
            observations: 0,
            minimum: 1,
        });
    }

    // forecast in covariance order
    let mu = DVector::from_iterator(n, risk.assets.iter().map(|a| forecast[a]));
    let sigma = &risk.values;
    let constraints = config.equality_constraints()?;
    let bounds = config.bounds.resolve(n)?;
    let x0 = config.initial_guess.resolve(n)?;

    let objective = &config.objective;
    let loss = |w: &DVector<f64>| objective.loss(w, &mu, sigma);
    let loss_gradient = |w: &DVector<f64>| objective.loss_gradient(w, &mu, sigma);

    match solver::minimize(&loss, &loss_gradient, &constraints, &bounds, x0, &config.solver) {
        Ok(solution) => {
            debug!(
                objective = %objective,
                iterations = solution.iterations,
                violation = solution.violation,
                "mean-variance solve converged"
            );
            Ok(risk
                .assets
                .iter()
                .cloned()
                .zip(solution.x.iter().copied())
                .collect())
        }
        Err(failure) => Err(PortconError::Optimization {
            objective: objective.name().to_string(),
            constraints: constraints.iter().map(|c| c.name.clone()).collect(),
            iterations: failure.last.iterations,
            violation: failure.last.violation,
            last_iterate: failure.last.x.iter().copied().collect(),
            reason: failure.reason,
        }),
    }
}

impl fmt::Display for PortfolioOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortfolioOptimizer::FixedWeight => write!(f, "FixedWeightOptimizer"),
            PortfolioOptimizer::EqualWeight { scale } => {
                write!(f, "EqualWeightOptimizer(scale={scale})")
            }
            PortfolioOptimizer::MeanVariance(config) => match config.objective {
                Objective::Volatility => write!(f, "MinimumVarianceOptimizer"),
                Objective::Sharpe => write!(f, "MaximumSharpeOptimizer"),
                _ => write!(f, "MeanVarianceOptimizer({})", config.objective),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn forecast(pairs: &[(&str, f64)]) -> ForecastVector {
        pairs.iter().map(|(a, v)| (a.to_string(), *v)).collect()
    }

    fn cov(assets: &[&str], values: &[f64]) -> CovarianceMatrix {
        let n = assets.len();
        CovarianceMatrix::new(
            assets.iter().map(|a| a.to_string()).collect(),
            DMatrix::from_row_slice(n, n, values),
        )
        .unwrap()
    }

    fn diagonal(assets: &[&str], variances: &[f64]) -> CovarianceMatrix {
        let n = assets.len();
        let mut values = vec![0.0; n * n];
        for (i, v) in variances.iter().enumerate() {
            values[i * n + i] = *v;
        }
        cov(assets, &values)
    }

    fn gross(w: &TargetWeights) -> f64 {
        w.values().map(|x| x.abs()).sum()
    }

    #[test]
    fn equal_weight_divides_scale() {
        let f = forecast(&[("A", 0.01), ("B", 0.02), ("C", -0.01)]);
        let w = PortfolioOptimizer::equal_weight().optimize(&f, None).unwrap();
        for v in w.values() {
            assert_relative_eq!(*v, 1.0 / 3.0, epsilon = 1e-15);
        }

        let w = PortfolioOptimizer::EqualWeight { scale: 0.5 }
            .optimize(&f, None)
            .unwrap();
        assert_relative_eq!(w["B"], 0.5 / 3.0, epsilon = 1e-15);
    }

    #[test]
    fn fixed_weight_passes_forecast_through() {
        let f = forecast(&[("A", 0.7), ("B", -0.2)]);
        let risk = diagonal(&["A", "B"], &[0.04, 0.09]);
        assert_eq!(
            PortfolioOptimizer::FixedWeight.optimize(&f, Some(&risk)).unwrap(),
            f
        );
    }

    #[test]
    fn mismatched_assets_are_configuration_error() {
        let f = forecast(&[("A", 0.01), ("B", 0.02)]);
        let risk = diagonal(&["A", "C"], &[0.04, 0.04]);
        let err = PortfolioOptimizer::mean_variance_preset(ExposureTargets::default())
            .unwrap()
            .optimize(&f, Some(&risk))
            .unwrap_err();
        assert!(matches!(err, PortconError::Configuration { .. }));
        assert!(err.to_string().contains("C"));
    }

    #[test]
    fn mean_variance_without_risk_is_configuration_error() {
        let f = forecast(&[("A", 0.01)]);
        let result = PortfolioOptimizer::mean_variance(MeanVarianceConfig::default())
            .unwrap()
            .optimize(&f, None);
        assert!(matches!(result, Err(PortconError::Configuration { .. })));
    }

    #[test]
    fn symmetric_problem_gives_equal_weights() {
        let f = forecast(&[("A", 0.02), ("B", 0.02), ("C", 0.02)]);
        let risk = diagonal(&["A", "B", "C"], &[0.04, 0.04, 0.04]);
        let w = PortfolioOptimizer::mean_variance(MeanVarianceConfig::default())
            .unwrap()
            .optimize(&f, Some(&risk))
            .unwrap();

        for asset in ["A", "B", "C"] {
            assert_relative_eq!(w[asset], 1.0 / 3.0, epsilon = 1e-6);
        }
        assert_relative_eq!(gross(&w), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn max_sharpe_meets_gross_exposure() {
        let f = forecast(&[("A", 0.01), ("B", 0.02), ("C", 0.03)]);
        let risk = cov(
            &["A", "B", "C"],
            &[0.04, 0.006, 0.002, 0.006, 0.09, 0.009, 0.002, 0.009, 0.0225],
        );
        let w = PortfolioOptimizer::max_sharpe(ExposureTargets::default())
            .unwrap()
            .optimize(&f, Some(&risk))
            .unwrap();
        assert_relative_eq!(gross(&w), 1.0, epsilon = 1e-6);
        // highest forecast, lowest variance
        assert!(w["C"] > w["A"]);
    }

    #[test]
    fn minimum_variance_matches_closed_form() {
        // uncorrelated, fully invested: w_i ∝ 1/σ_i²
        let f = forecast(&[("A", 0.0), ("B", 0.0), ("C", 0.0)]);
        let risk = diagonal(&["A", "B", "C"], &[0.04, 0.09, 0.01]);
        let targets = ExposureTargets {
            gross: None,
            net: Some(1.0),
            ..ExposureTargets::unconstrained()
        };
        let w = PortfolioOptimizer::minimum_variance(targets)
            .unwrap()
            .optimize(&f, Some(&risk))
            .unwrap();

        let inv = [25.0, 100.0 / 9.0, 100.0];
        let total: f64 = inv.iter().sum();
        assert_relative_eq!(w["A"], inv[0] / total, epsilon = 1e-5);
        assert_relative_eq!(w["B"], inv[1] / total, epsilon = 1e-5);
        assert_relative_eq!(w["C"], inv[2] / total, epsilon = 1e-5);
    }

    #[test]
    fn long_short_targets() {
        let f = forecast(&[("A", 0.05), ("B", 0.03), ("C", -0.02)]);
        let risk = diagonal(&["A", "B", "C"], &[0.04, 0.04, 0.04]);
        let config = MeanVarianceConfig {
            exposure: ExposureTargets {
                gross: None,
                net: None,
                long: Some(1.3),
                short: Some(-0.3),
            },
            initial_guess: InitialGuess::Weights(vec![0.6, 0.6, -0.2]),
            ..MeanVarianceConfig::default()
        };
        let w = PortfolioOptimizer::mean_variance(config)
            .unwrap()
            .optimize(&f, Some(&risk))
            .unwrap();

        let long: f64 = w.values().filter(|x| **x > 0.0).sum();
        let short: f64 = w.values().filter(|x| **x < 0.0).sum();
        assert_relative_eq!(long, 1.3, epsilon = 1e-6);
        assert_relative_eq!(short, -0.3, epsilon = 1e-6);
        assert_relative_eq!(w.values().sum::<f64>(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn conflicting_exposures_fail_at_construction() {
        let config = MeanVarianceConfig {
            exposure: ExposureTargets {
                gross: None,
                net: Some(0.0),
                long: Some(1.0),
                short: Some(-0.5),
            },
            ..MeanVarianceConfig::default()
        };
        assert!(matches!(
            PortfolioOptimizer::mean_variance(config),
            Err(PortconError::Configuration { .. })
        ));
    }

    #[test]
    fn infeasible_bounds_report_optimization_error() {
        let f = forecast(&[("A", 0.02), ("B", 0.02), ("C", 0.02)]);
        let risk = diagonal(&["A", "B", "C"], &[0.04, 0.04, 0.04]);
        let config = MeanVarianceConfig {
            bounds: Bounds::Uniform {
                lower: 0.0,
                upper: 0.1,
            },
            solver: SolverSettings {
                max_iterations: 15,
                ..SolverSettings::default()
            },
            ..MeanVarianceConfig::default()
        };
        let err = PortfolioOptimizer::mean_variance(config)
            .unwrap()
            .optimize(&f, Some(&risk))
            .unwrap_err();

        match err {
            PortconError::Optimization {
                objective,
                constraints,
                last_iterate,
                violation,
                ..
            } => {
                assert_eq!(objective, "mean_variance");
                assert_eq!(constraints, vec!["gross_exposure"]);
                assert_eq!(last_iterate.len(), 3);
                assert_relative_eq!(violation, 0.7, epsilon = 1e-6);
            }
            other => panic!("expected optimization error, got {other:?}"),
        }
    }

    #[test]
    fn custom_constraint_is_imposed() {
        let f = forecast(&[("A", 0.02), ("B", 0.02)]);
        let risk = diagonal(&["A", "B"], &[0.04, 0.04]);
        let config = MeanVarianceConfig {
            constraints: vec![EqualityConstraint::new("a_is_sixty_percent", |w| w[0] - 0.6)],
            ..MeanVarianceConfig::default()
        };
        let w = PortfolioOptimizer::mean_variance(config)
            .unwrap()
            .optimize(&f, Some(&risk))
            .unwrap();
        assert_relative_eq!(w["A"], 0.6, epsilon = 1e-6);
        assert_relative_eq!(w["B"], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn custom_objective_uses_finite_differences() {
        // min Σ(w_i − t_i)² with Σw = 1 and t = (0.5, 0.3, 0.2) feasible
        let f = forecast(&[("A", 0.0), ("B", 0.0), ("C", 0.0)]);
        let risk = diagonal(&["A", "B", "C"], &[0.04, 0.04, 0.04]);
        let target = DVector::from_vec(vec![0.5, 0.3, 0.2]);
        let config = MeanVarianceConfig {
            objective: Objective::Custom {
                name: "tracking".into(),
                function: std::sync::Arc::new(move |w, _, _| (w - &target).norm_squared()),
                maximize: false,
            },
            exposure: ExposureTargets {
                gross: None,
                net: Some(1.0),
                ..ExposureTargets::unconstrained()
            },
            ..MeanVarianceConfig::default()
        };
        let w = PortfolioOptimizer::mean_variance(config)
            .unwrap()
            .optimize(&f, Some(&risk))
            .unwrap();
        assert_relative_eq!(w["A"], 0.5, epsilon = 1e-5);
        assert_relative_eq!(w["B"], 0.3, epsilon = 1e-5);
        assert_relative_eq!(w["C"], 0.2, epsilon = 1e-5);
    }

    #[test]
    fn display_names() {
        assert_eq!(
            PortfolioOptimizer::minimum_variance(ExposureTargets::default())
                .unwrap()
                .to_string(),
            "MinimumVarianceOptimizer"
        );
        assert_eq!(
            PortfolioOptimizer::equal_weight().to_string(),
            "EqualWeightOptimizer(scale=1)"
        );
    }
}
