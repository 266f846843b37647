//! Local constrained minimizer.
//!
//! minimize f(x) subject to h_j(x) = 0 and l ≤ x ≤ u.
//!
//! Outer loop: augmented Lagrangian
//!   L(x; λ, ρ) = f(x) + Σ λ_j h_j(x) + ρ/2 Σ h_j(x)²
//! with multiplier update λ_j ← λ_j + ρ h_j and ρ ← 10ρ whenever the
//! violation fails to shrink by a factor of four.
//!
//! Inner loop: each subproblem min L(·; λ, ρ) over the box goes to argmin's
//! L-BFGS with a Moré–Thuente line search. Bounds are handled by
//! projection: the cost is evaluated at P(x), the clamp of x onto the box,
//! plus ½‖x − P(x)‖² so iterates that leave the box are pulled back to it.
//! When the line search gives up (kinks in |w| are typical) the subproblem
//! is finished with Nelder–Mead from the best point seen.
//!
//! Gradients are analytic where the caller provides them and central
//! finite differences otherwise.
//!
//! Both loops are bounded. The result is accepted only if every
//! constraint holds to `constraint_tolerance`; anything else is reported
//! as a failure carrying the last iterate.

use crate::domain::optimizer::constraints::EqualityConstraint;
use argmin::core::{CostFunction, Error, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use finitediff::FiniteDiff;
use nalgebra::DVector;
use std::cell::RefCell;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    /// Outer (multiplier update) iterations.
    pub max_iterations: usize,
    /// Iteration cap handed to each argmin executor.
    pub max_inner_iterations: usize,
    /// Largest |h_j(x)| accepted as feasible.
    pub constraint_tolerance: f64,
    /// L-BFGS stops once the gradient norm is this small.
    pub gradient_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iterations: 100,
            max_inner_iterations: 2000,
            constraint_tolerance: 1e-9,
            gradient_tolerance: 1e-10,
        }
    }
}

const INITIAL_PENALTY: f64 = 10.0;
const MAX_PENALTY: f64 = 1e12;
const DIVERGENCE_LIMIT: f64 = 1e12;
const LBFGS_MEMORY: usize = 10;
const PULL_BACK: f64 = 1.0;
const SIMPLEX_STEP: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub x: DVector<f64>,
    /// Outer iterations performed.
    pub iterations: usize,
    /// Largest |h_j(x)| at `x`.
    pub violation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverFailure {
    pub last: Solution,
    pub reason: String,
}

pub fn max_violation(constraints: &[EqualityConstraint], x: &DVector<f64>) -> f64 {
    constraints
        .iter()
        .map(|c| c.residual(x).abs())
        .fold(0.0, |acc, v| if v.is_nan() { f64::INFINITY } else { acc.max(v) })
}

/// Central-difference gradient of `f` at `x`.
pub fn numerical_gradient(f: &dyn Fn(&DVector<f64>) -> f64, x: &DVector<f64>) -> DVector<f64> {
    let point: Vec<f64> = x.iter().copied().collect();
    let g = point.central_diff(&|p: &Vec<f64>| f(&DVector::from_column_slice(p)));
    DVector::from_vec(g)
}

fn project(x: &[f64], bounds: &[(f64, f64)]) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter().zip(bounds).map(|(v, (lo, hi))| v.clamp(*lo, *hi)),
    )
}

/// Best point evaluated so far and, if it happened, where the iterate
/// left the finite range.
#[derive(Default)]
struct Trace {
    best: Option<(f64, Vec<f64>)>,
    diverged: Option<DVector<f64>>,
}

/// min L(x; λ, ρ) over the box, as seen by argmin.
#[derive(Clone, Copy)]
struct Subproblem<'a> {
    objective: &'a dyn Fn(&DVector<f64>) -> f64,
    objective_gradient: &'a dyn Fn(&DVector<f64>) -> Option<DVector<f64>>,
    constraints: &'a [EqualityConstraint],
    lambda: &'a [f64],
    rho: f64,
    bounds: &'a [(f64, f64)],
    trace: &'a RefCell<Trace>,
}

impl Subproblem<'_> {
    fn feasible_point(&self, x: &[f64]) -> Result<DVector<f64>, Error> {
        let p = project(x, self.bounds);
        if p.iter().any(|v| !v.is_finite() || v.abs() > DIVERGENCE_LIMIT) {
            self.trace.borrow_mut().diverged = Some(p);
            return Err(Error::msg("iterate left the finite range"));
        }
        Ok(p)
    }

    fn lagrangian(&self, w: &DVector<f64>) -> f64 {
        let mut value = (self.objective)(w);
        for (c, l) in self.constraints.iter().zip(self.lambda) {
            let h = c.residual(w);
            value += l * h + 0.5 * self.rho * h * h;
        }
        value
    }
}

impl CostFunction for Subproblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        let p = self.feasible_point(x)?;
        let outside: f64 = x.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum();
        let value = self.lagrangian(&p) + 0.5 * PULL_BACK * outside;

        let mut trace = self.trace.borrow_mut();
        if value.is_finite() && trace.best.as_ref().is_none_or(|(best, _)| value < *best) {
            trace.best = Some((value, x.clone()));
        }
        Ok(value)
    }
}

impl Gradient for Subproblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, Error> {
        let p = self.feasible_point(x)?;
        let mut g = (self.objective_gradient)(&p)
            .unwrap_or_else(|| numerical_gradient(self.objective, &p));
        for (c, l) in self.constraints.iter().zip(self.lambda) {
            let weight = l + self.rho * c.residual(&p);
            g.axpy(weight, &c.gradient(&p), 1.0);
        }
        // outside the box only the pull-back term depends on x
        Ok(x.iter()
            .zip(p.iter())
            .zip(g.iter())
            .map(|((xi, pi), gi)| if xi == pi { *gi } else { PULL_BACK * (xi - pi) })
            .collect())
    }
}

struct InnerSolve {
    x: DVector<f64>,
    iterations: u64,
    fallback: bool,
}

fn quasi_newton(
    problem: Subproblem<'_>,
    start: Vec<f64>,
    settings: &SolverSettings,
) -> Result<u64, Error> {
    let linesearch = MoreThuenteLineSearch::new().with_c(1e-4, 0.9)?;
    let solver = LBFGS::new(linesearch, LBFGS_MEMORY).with_tolerance_grad(settings.gradient_tolerance)?;
    let res = Executor::new(problem, solver)
        .configure(|state| state.param(start).max_iters(settings.max_inner_iterations as u64))
        .ctrlc(false)
        .run()?;
    Ok(res.state().get_iter())
}

fn nelder_mead(
    problem: Subproblem<'_>,
    start: Vec<f64>,
    settings: &SolverSettings,
) -> Result<u64, Error> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.clone());
    for i in 0..start.len() {
        let mut point = start.clone();
        point[i] += SIMPLEX_STEP * start[i].abs().max(1.0);
        simplex.push(point);
    }
    let solver = NelderMead::new(simplex).with_sd_tolerance(1e-14)?;
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(settings.max_inner_iterations as u64))
        .ctrlc(false)
        .run()?;
    Ok(res.state().get_iter())
}

/// Solve one subproblem. `Err` carries the point that left the finite
/// range.
fn solve_subproblem(
    problem: Subproblem<'_>,
    x0: &DVector<f64>,
    settings: &SolverSettings,
) -> Result<InnerSolve, DVector<f64>> {
    let start: Vec<f64> = x0.iter().copied().collect();
    let mut fallback = false;
    let mut iterations = match quasi_newton(problem, start.clone(), settings) {
        Ok(iterations) => iterations,
        Err(error) => {
            if let Some(point) = problem.trace.borrow_mut().diverged.take() {
                return Err(point);
            }
            debug!(%error, "l-bfgs stopped early, finishing with nelder-mead");
            fallback = true;
            0
        }
    };

    if fallback {
        let restart = problem
            .trace
            .borrow()
            .best
            .as_ref()
            .map_or_else(|| start.clone(), |(_, x)| x.clone());
        match nelder_mead(problem, restart, settings) {
            Ok(n) => iterations += n,
            Err(error) => debug!(%error, "nelder-mead stopped early"),
        }
        if let Some(point) = problem.trace.borrow_mut().diverged.take() {
            return Err(point);
        }
    }

    let best = problem.trace.borrow().best.as_ref().map(|(_, x)| x.clone());
    let x = best.map_or_else(|| project(&start, problem.bounds), |x| project(&x, problem.bounds));
    Ok(InnerSolve {
        x,
        iterations,
        fallback,
    })
}

/// Minimize `objective` from `x0` under `constraints` and `bounds`.
///
/// `gradient` returns the analytic gradient of `objective` when one is
/// known; `None` falls back to finite differences.
pub fn minimize(
    objective: &dyn Fn(&DVector<f64>) -> f64,
    gradient: &dyn Fn(&DVector<f64>) -> Option<DVector<f64>>,
    constraints: &[EqualityConstraint],
    bounds: &[(f64, f64)],
    x0: DVector<f64>,
    settings: &SolverSettings,
) -> Result<Solution, SolverFailure> {
    let start: Vec<f64> = x0.iter().copied().collect();
    let mut x = project(&start, bounds);
    let mut lambda = vec![0.0; constraints.len()];
    let mut rho = INITIAL_PENALTY;
    let mut violation = max_violation(constraints, &x);

    for iteration in 1..=settings.max_iterations {
        let fail = |x: DVector<f64>, violation: f64, reason: &str| SolverFailure {
            last: Solution {
                x,
                iterations: iteration,
                violation,
            },
            reason: reason.to_string(),
        };

        let trace = RefCell::new(Trace::default());
        let problem = Subproblem {
            objective,
            objective_gradient: gradient,
            constraints,
            lambda: &lambda,
            rho,
            bounds,
            trace: &trace,
        };
        let inner = match solve_subproblem(problem, &x, settings) {
            Ok(inner) => inner,
            Err(point) => {
                return Err(fail(point, violation, "iterate diverged; objective may be unbounded"));
            }
        };
        let next = inner.x;

        if next.iter().any(|v| !v.is_finite()) || next.amax() > DIVERGENCE_LIMIT {
            return Err(fail(next, violation, "iterate diverged; objective may be unbounded"));
        }
        if !objective(&next).is_finite() {
            return Err(fail(next, violation, "objective is not finite at the iterate"));
        }

        let next_violation = max_violation(constraints, &next);
        debug!(
            iteration,
            rho,
            violation = next_violation,
            inner_iterations = inner.iterations,
            nelder_mead = inner.fallback,
            "augmented lagrangian step"
        );
        x = next;

        if next_violation <= settings.constraint_tolerance {
            return Ok(Solution {
                x,
                iterations: iteration,
                violation: next_violation,
            });
        }

        for (c, l) in constraints.iter().zip(lambda.iter_mut()) {
            *l += rho * c.residual(&x);
        }
        if next_violation > 0.25 * violation {
            rho = (rho * 10.0).min(MAX_PENALTY);
        }
        violation = next_violation;
    }

    Err(SolverFailure {
        last: Solution {
            x,
            iterations: settings.max_iterations,
            violation,
        },
        reason: "constraint tolerance not reached".to_string(),
    })
}
