//! Equality constraints, box bounds and initial guesses for the
//! mean-variance family.
//!
//! Every constraint is an equality `h(w) = 0`.

use crate::domain::error::PortconError;
use crate::domain::optimizer::solver::numerical_gradient;
use nalgebra::DVector;
use std::fmt;
use std::sync::Arc;

pub type ConstraintFn = Arc<dyn Fn(&DVector<f64>) -> f64 + Send + Sync>;
pub type ConstraintGradientFn = Arc<dyn Fn(&DVector<f64>) -> DVector<f64> + Send + Sync>;

#[derive(Clone)]
pub struct EqualityConstraint {
    pub name: String,
    pub function: ConstraintFn,
    /// Closed-form ∇h; finite differences are used when absent.
    pub gradient: Option<ConstraintGradientFn>,
}

impl EqualityConstraint {
    pub fn new(
        name: impl Into<String>,
        function: impl Fn(&DVector<f64>) -> f64 + Send + Sync + 'static,
    ) -> Self {
        EqualityConstraint {
            name: name.into(),
            function: Arc::new(function),
            gradient: None,
        }
    }

    pub fn with_gradient(
        mut self,
        gradient: impl Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    ) -> Self {
        self.gradient = Some(Arc::new(gradient));
        self
    }

    pub fn residual(&self, w: &DVector<f64>) -> f64 {
        (self.function)(w)
    }

    pub fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
        match &self.gradient {
            Some(gradient) => gradient(w),
            None => numerical_gradient(&|x: &DVector<f64>| self.residual(x), w),
        }
    }
}

impl fmt::Debug for EqualityConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EqualityConstraint")
            .field("name", &self.name)
            .field("analytic_gradient", &self.gradient.is_some())
            .finish_non_exhaustive()
    }
}

/// Exposure targets. Each is independently optional; `None` means the
/// constraint is not imposed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureTargets {
    /// Σ|w_i|
    pub gross: Option<f64>,
    /// Σw_i
    pub net: Option<f64>,
    /// Σ_{w_i>0} w_i
    pub long: Option<f64>,
    /// Σ_{w_i<0} w_i, never positive
    pub short: Option<f64>,
}

impl Default for ExposureTargets {
    fn default() -> Self {
        ExposureTargets {
            gross: Some(1.0),
            net: None,
            long: None,
            short: None,
        }
    }
}

const EXPOSURE_EPSILON: f64 = 1e-12;

impl ExposureTargets {
    pub fn unconstrained() -> Self {
        ExposureTargets {
            gross: None,
            net: None,
            long: None,
            short: None,
        }
    }

    /// Validate the targets and make the derived net exposure explicit.
    ///
    /// With both long and short given, net exposure is `long + short`. An
    /// explicit net target that disagrees is rejected rather than
    /// overwritten; so is a gross target other than `long − short`.
    pub fn resolve(&self) -> Result<ExposureTargets, PortconError> {
        for (name, value) in [
            ("gross", self.gross),
            ("net", self.net),
            ("long", self.long),
            ("short", self.short),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(PortconError::configuration(format!(
                    "{name} exposure must be finite"
                )));
            }
        }
        if self.gross.is_some_and(|g| g < 0.0) {
            return Err(PortconError::configuration("gross exposure must be non-negative"));
        }
        if self.long.is_some_and(|l| l < 0.0) {
            return Err(PortconError::configuration("long exposure must be non-negative"));
        }
        if self.short.is_some_and(|s| s > 0.0) {
            return Err(PortconError::configuration("short exposure must not be positive"));
        }

        let net = match (self.long, self.short) {
            (Some(long), Some(short)) => {
                let derived = long + short;
                if let Some(net) = self.net.filter(|n| (n - derived).abs() > EXPOSURE_EPSILON) {
                    return Err(PortconError::configuration(format!(
                        "net exposure {net} conflicts with long {long} + short {short} = {derived}"
                    )));
                }
                let gross_derived = long - short;
                if let Some(gross) = self
                    .gross
                    .filter(|g| (g - gross_derived).abs() > EXPOSURE_EPSILON)
                {
                    return Err(PortconError::configuration(format!(
                        "gross exposure {gross} conflicts with long {long} - short {short} = {gross_derived}"
                    )));
                }
                Some(derived)
            }
            _ => self.net,
        };

        Ok(ExposureTargets { net, ..*self })
    }

    /// Equality constraints for the resolved targets.
    pub fn constraints(&self) -> Result<Vec<EqualityConstraint>, PortconError> {
        let targets = self.resolve()?;
        let mut out = Vec::new();
        if let Some(g) = targets.gross {
            out.push(
                EqualityConstraint::new("gross_exposure", move |w| {
                    w.iter().map(|x| x.abs()).sum::<f64>() - g
                })
                .with_gradient(|w| w.map(|x| if x == 0.0 { 0.0 } else { x.signum() })),
            );
        }
        if let Some(n) = targets.net {
            out.push(
                EqualityConstraint::new("net_exposure", move |w| w.sum() - n)
                    .with_gradient(|w| DVector::from_element(w.len(), 1.0)),
            );
        }
        if let Some(l) = targets.long {
            out.push(
                EqualityConstraint::new("long_exposure", move |w| {
                    w.iter().filter(|x| **x > 0.0).sum::<f64>() - l
                })
                .with_gradient(|w| w.map(|x| if x > 0.0 { 1.0 } else { 0.0 })),
            );
        }
        if let Some(s) = targets.short {
            out.push(
                EqualityConstraint::new("short_exposure", move |w| {
                    w.iter().filter(|x| **x < 0.0).sum::<f64>() - s
                })
                .with_gradient(|w| w.map(|x| if x < 0.0 { 1.0 } else { 0.0 })),
            );
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Bounds {
    /// Shorting and leverage permitted.
    #[default]
    Unbounded,
    Uniform { lower: f64, upper: f64 },
    /// One `(lower, upper)` pair per asset, in optimizer asset order.
    PerAsset(Vec<(f64, f64)>),
}

impl Bounds {
    pub fn resolve(&self, n: usize) -> Result<Vec<(f64, f64)>, PortconError> {
        let pairs = match self {
            Bounds::Unbounded => vec![(f64::NEG_INFINITY, f64::INFINITY); n],
            Bounds::Uniform { lower, upper } => vec![(*lower, *upper); n],
            Bounds::PerAsset(pairs) => {
                if pairs.len() != n {
                    return Err(PortconError::configuration(format!(
                        "{} bounds given for {n} assets",
                        pairs.len()
                    )));
                }
                pairs.clone()
            }
        };
        if let Some((lo, hi)) = pairs.iter().find(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi) {
            return Err(PortconError::configuration(format!(
                "invalid bounds ({lo}, {hi})"
            )));
        }
        Ok(pairs)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum InitialGuess {
    /// 1/N per asset.
    #[default]
    EqualWeight,
    Weights(Vec<f64>),
}

impl InitialGuess {
    pub fn resolve(&self, n: usize) -> Result<DVector<f64>, PortconError> {
        match self {
            InitialGuess::EqualWeight => Ok(DVector::from_element(n, 1.0 / n as f64)),
            InitialGuess::Weights(w) if w.len() == n && w.iter().all(|x| x.is_finite()) => {
                Ok(DVector::from_column_slice(w))
            }
            InitialGuess::Weights(w) => Err(PortconError::configuration(format!(
                "initial guess has {} finite values for {n} assets",
                w.iter().filter(|x| x.is_finite()).count()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn w(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[test]
    fn default_is_unit_gross_only() {
        let constraints = ExposureTargets::default().constraints().unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].name, "gross_exposure");
        assert_relative_eq!(constraints[0].residual(&w(&[0.5, -0.5])), 0.0);
        assert_relative_eq!(constraints[0].residual(&w(&[0.5, 0.25])), -0.25);
    }

    #[test]
    fn exposure_gradients_match_finite_differences() {
        let targets = ExposureTargets {
            gross: None,
            net: None,
            long: Some(1.3),
            short: Some(-0.3),
        };
        let x = w(&[0.8, -0.25, 0.5, -0.05]);
        for c in targets.constraints().unwrap() {
            let analytic = c.gradient(&x);
            let numeric = EqualityConstraint {
                gradient: None,
                ..c.clone()
            }
            .gradient(&x);
            for (a, n) in analytic.iter().zip(numeric.iter()) {
                assert_relative_eq!(*a, *n, epsilon = 1e-6);
            }
        }
        let gross = ExposureTargets::default().constraints().unwrap();
        assert_eq!(gross[0].gradient(&x).as_slice(), &[1.0, -1.0, 1.0, -1.0]);
    }

    #[test]
    fn zero_net_exposure_is_imposed() {
        let targets = ExposureTargets {
            net: Some(0.0),
            ..ExposureTargets::default()
        };
        let names: Vec<_> = targets
            .constraints()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["gross_exposure", "net_exposure"]);
    }

    #[test]
    fn long_and_short_derive_net() {
        let targets = ExposureTargets {
            gross: None,
            net: None,
            long: Some(1.3),
            short: Some(-0.3),
        }
        .resolve()
        .unwrap();
        assert_relative_eq!(targets.net.unwrap(), 1.0, epsilon = 1e-15);

        let constraints = targets.constraints().unwrap();
        let x = w(&[0.8, 0.5, -0.3]);
        for c in &constraints {
            assert_relative_eq!(c.residual(&x), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn conflicting_targets_are_rejected() {
        let net_conflict = ExposureTargets {
            gross: None,
            net: Some(0.5),
            long: Some(1.3),
            short: Some(-0.3),
        };
        assert!(matches!(
            net_conflict.resolve(),
            Err(PortconError::Configuration { .. })
        ));

        let gross_conflict = ExposureTargets {
            long: Some(1.3),
            short: Some(-0.3),
            ..ExposureTargets::default()
        };
        assert!(gross_conflict.resolve().is_err());

        let agreeing = ExposureTargets {
            gross: Some(1.6),
            net: Some(1.0),
            long: Some(1.3),
            short: Some(-0.3),
        };
        assert!(agreeing.resolve().is_ok());
    }

    #[test]
    fn sign_checks() {
        let positive_short = ExposureTargets {
            short: Some(0.2),
            ..ExposureTargets::unconstrained()
        };
        assert!(positive_short.resolve().is_err());

        let negative_gross = ExposureTargets {
            gross: Some(-1.0),
            ..ExposureTargets::unconstrained()
        };
        assert!(negative_gross.resolve().is_err());
    }

    #[test]
    fn bounds_resolution() {
        assert_eq!(
            Bounds::Uniform { lower: 0.0, upper: 0.5 }.resolve(2).unwrap(),
            vec![(0.0, 0.5); 2]
        );
        assert!(Bounds::Uniform { lower: 1.0, upper: 0.0 }.resolve(2).is_err());
        assert!(Bounds::PerAsset(vec![(0.0, 1.0)]).resolve(2).is_err());
        assert!(Bounds::Unbounded.resolve(3).unwrap()[0].0.is_infinite());
    }

    #[test]
    fn initial_guess_resolution() {
        let eq = InitialGuess::EqualWeight.resolve(4).unwrap();
        assert!(eq.iter().all(|x| *x == 0.25));

        let custom = InitialGuess::Weights(vec![0.6, 0.4]).resolve(2).unwrap();
        assert_eq!(custom[0], 0.6);
        assert!(InitialGuess::Weights(vec![1.0]).resolve(2).is_err());
    }
}
