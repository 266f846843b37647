//! Portfolio objectives.
//!
//! return(w)        = μᵗw
//! volatility(w)    = √(wᵗΣw)
//! sharpe(w)        = return(w) / volatility(w)
//! mean_variance(w) = return(w) − volatility(w)
//!
//! Volatility is minimized directly; the others are maximized, so their
//! loss is the negated value.
//!
//! Gradients, with v = volatility(w):
//!   ∇return        = μ
//!   ∇volatility    = Σw / v
//!   ∇sharpe        = μ / v − (μᵗw) Σw / v³
//!   ∇mean_variance = μ − Σw / v

use crate::domain::error::PortconError;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// `f(w, μ, Σ)`.
pub type ObjectiveFn = Arc<dyn Fn(&DVector<f64>, &DVector<f64>, &DMatrix<f64>) -> f64 + Send + Sync>;

#[derive(Clone, Default)]
pub enum Objective {
    Return,
    Volatility,
    Sharpe,
    #[default]
    MeanVariance,
    Custom {
        name: String,
        function: ObjectiveFn,
        maximize: bool,
    },
}

pub fn portfolio_return(w: &DVector<f64>, mu: &DVector<f64>) -> f64 {
    mu.dot(w)
}

pub fn portfolio_volatility(w: &DVector<f64>, sigma: &DMatrix<f64>) -> f64 {
    // rounding can push a zero variance slightly negative
    w.dot(&(sigma * w)).max(0.0).sqrt()
}

impl Objective {
    pub fn name(&self) -> &str {
        match self {
            Objective::Return => "return",
            Objective::Volatility => "volatility",
            Objective::Sharpe => "sharpe",
            Objective::MeanVariance => "mean_variance",
            Objective::Custom { name, .. } => name,
        }
    }

    pub fn maximize(&self) -> bool {
        match self {
            Objective::Volatility => false,
            Objective::Custom { maximize, .. } => *maximize,
            _ => true,
        }
    }

    pub fn value(&self, w: &DVector<f64>, mu: &DVector<f64>, sigma: &DMatrix<f64>) -> f64 {
        match self {
            Objective::Return => portfolio_return(w, mu),
            Objective::Volatility => portfolio_volatility(w, sigma),
            Objective::Sharpe => portfolio_return(w, mu) / portfolio_volatility(w, sigma),
            Objective::MeanVariance => portfolio_return(w, mu) - portfolio_volatility(w, sigma),
            Objective::Custom { function, .. } => function(w, mu, sigma),
        }
    }

    /// The quantity handed to the minimizer.
    pub fn loss(&self, w: &DVector<f64>, mu: &DVector<f64>, sigma: &DMatrix<f64>) -> f64 {
        let v = self.value(w, mu, sigma);
        if self.maximize() { -v } else { v }
    }

    /// Closed-form gradient of `value`. `None` for custom objectives.
    ///
    /// At zero volatility the volatility term contributes nothing.
    pub fn gradient(
        &self,
        w: &DVector<f64>,
        mu: &DVector<f64>,
        sigma: &DMatrix<f64>,
    ) -> Option<DVector<f64>> {
        let vol = portfolio_volatility(w, sigma);
        let vol_gradient = || {
            if vol > 0.0 {
                (sigma * w) / vol
            } else {
                DVector::zeros(w.len())
            }
        };
        match self {
            Objective::Return => Some(mu.clone()),
            Objective::Volatility => Some(vol_gradient()),
            Objective::Sharpe if vol > 0.0 => {
                let ret = portfolio_return(w, mu);
                Some(mu / vol - (sigma * w) * (ret / vol.powi(3)))
            }
            Objective::Sharpe => Some(DVector::zeros(w.len())),
            Objective::MeanVariance => Some(mu - vol_gradient()),
            Objective::Custom { .. } => None,
        }
    }

    /// Gradient of `loss`.
    pub fn loss_gradient(
        &self,
        w: &DVector<f64>,
        mu: &DVector<f64>,
        sigma: &DMatrix<f64>,
    ) -> Option<DVector<f64>> {
        let g = self.gradient(w, mu, sigma)?;
        Some(if self.maximize() { -g } else { g })
    }
}

impl fmt::Debug for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Custom { name, maximize, .. } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("maximize", maximize)
                .finish_non_exhaustive(),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Objective {
    type Err = PortconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "return" => Ok(Objective::Return),
            "volatility" => Ok(Objective::Volatility),
            "sharpe" => Ok(Objective::Sharpe),
            "mean_variance" | "mean-variance" => Ok(Objective::MeanVariance),
            other => Err(PortconError::configuration(format!(
                "unknown objective '{other}', expected return, volatility, sharpe or mean_variance"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn inputs() -> (DVector<f64>, DVector<f64>, DMatrix<f64>) {
        let w = DVector::from_vec(vec![0.5, 0.5]);
        let mu = DVector::from_vec(vec![0.02, 0.04]);
        let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.09]);
        (w, mu, sigma)
    }

    #[test]
    fn builtin_values() {
        let (w, mu, sigma) = inputs();
        let vol = (0.25f64 * 0.04 + 0.25 * 0.09).sqrt();

        assert_relative_eq!(Objective::Return.value(&w, &mu, &sigma), 0.03, epsilon = 1e-15);
        assert_relative_eq!(Objective::Volatility.value(&w, &mu, &sigma), vol, epsilon = 1e-15);
        assert_relative_eq!(Objective::Sharpe.value(&w, &mu, &sigma), 0.03 / vol, epsilon = 1e-12);
        assert_relative_eq!(
            Objective::MeanVariance.value(&w, &mu, &sigma),
            0.03 - vol,
            epsilon = 1e-15
        );
    }

    #[test]
    fn only_volatility_is_minimized() {
        let (w, mu, sigma) = inputs();
        assert_eq!(
            Objective::Volatility.loss(&w, &mu, &sigma),
            Objective::Volatility.value(&w, &mu, &sigma)
        );
        assert_eq!(
            Objective::Sharpe.loss(&w, &mu, &sigma),
            -Objective::Sharpe.value(&w, &mu, &sigma)
        );
    }

    #[test]
    fn builtin_gradients_match_finite_differences() {
        let (_, mu, _) = inputs();
        let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.01, 0.01, 0.09]);
        let w = DVector::from_vec(vec![0.7, -0.3]);
        for objective in [
            Objective::Return,
            Objective::Volatility,
            Objective::Sharpe,
            Objective::MeanVariance,
        ] {
            let analytic = objective.loss_gradient(&w, &mu, &sigma).unwrap();
            let numeric = crate::domain::optimizer::solver::numerical_gradient(
                &|x: &DVector<f64>| objective.loss(x, &mu, &sigma),
                &w,
            );
            for (a, n) in analytic.iter().zip(numeric.iter()) {
                assert_relative_eq!(*a, *n, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn custom_objective_has_no_closed_form_gradient() {
        let (w, mu, sigma) = inputs();
        let obj = Objective::Custom {
            name: "concentration".into(),
            function: Arc::new(|w, _, _| w.norm_squared()),
            maximize: false,
        };
        assert!(obj.gradient(&w, &mu, &sigma).is_none());
    }

    #[test]
    fn custom_objective() {
        let (w, mu, sigma) = inputs();
        let obj = Objective::Custom {
            name: "concentration".into(),
            function: Arc::new(|w, _, _| w.norm_squared()),
            maximize: false,
        };
        assert_eq!(obj.name(), "concentration");
        assert_relative_eq!(obj.loss(&w, &mu, &sigma), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn parse_objective() {
        assert_eq!("Sharpe".parse::<Objective>().unwrap().name(), "sharpe");
        assert_eq!(
            "mean-variance".parse::<Objective>().unwrap().name(),
            "mean_variance"
        );
        assert!("utility".parse::<Objective>().is_err());
    }
}
