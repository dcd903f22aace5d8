//! Levenberg-Marquardt optimizer for non-linear least squares problems.
//!
//! Each iteration linearizes the model around the current parameters and solves the damped
//! normal equations `(J^T J + λ diag(J^T J)) δ = J^T r`, where `r = measurements - model(p)`.
//! A step is only accepted when it strictly reduces the residual norm; otherwise λ grows and
//! the step is recomputed.

use faer::prelude::*;
use faer::{Mat, Side};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jacobian::{numerical_jacobian, DifferenceScheme, JacobianScratch};
use crate::model::Model;

/// Lower bound applied to the diagonal of `J^T J` before scaling it by λ.
///
/// Keeps the damped system positive definite when a parameter has no influence on the model.
const DIAGONAL_FLOOR: f64 = 1e-9;

/// Errors that can occur when setting up an optimization.
#[derive(Debug, Error, PartialEq)]
pub enum OptimizerError {
    /// There are fewer measurements than parameters.
    #[error("Invalid problem size: {params} parameters but only {measurements} measurements")]
    InvalidProblemSize {
        /// Number of parameters.
        params: usize,
        /// Number of measurements.
        measurements: usize,
    },

    /// The finite difference step must be finite and strictly positive.
    #[error("Invalid step size: {0}")]
    InvalidStepSize(f64),

    /// At least one iteration must be allowed.
    #[error("Invalid maximum number of iterations: {0}")]
    InvalidMaxIterations(usize),
}

/// Reason why the optimizer terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// The step or the residual improvement fell below tolerance.
    Converged,
    /// The iteration cap was hit while the residual was still improving.
    MaxIterationsReached,
    /// No step reducing the residual was found within the retry budget.
    Stalled,
}

impl OptimizationStatus {
    /// Whether the optimizer reached a stationary point.
    pub fn is_converged(&self) -> bool {
        matches!(self, OptimizationStatus::Converged)
    }
}

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationReport {
    /// Reason for termination.
    pub status: OptimizationStatus,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Residual norm at the initial parameters.
    pub initial_residual_norm: f64,
    /// Residual norm at the returned parameters.
    pub residual_norm: f64,
    /// Damping parameter when the optimizer stopped.
    pub lambda: f64,
    /// Residual norm after every accepted step, starting with the initial norm.
    pub residual_history: Vec<f64>,
    /// Number of measurements in the problem.
    pub num_measurements: usize,
}

impl OptimizationReport {
    /// Root mean square of the final residual.
    pub fn rms(&self) -> f64 {
        if self.num_measurements == 0 {
            return 0.0;
        }
        self.residual_norm / (self.num_measurements as f64).sqrt()
    }
}

/// Levenberg-Marquardt optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevenbergMarquardt {
    /// Initial damping parameter.
    pub lambda_init: f64,
    /// Factor by which λ grows after a rejected step and shrinks after an accepted one.
    pub lambda_factor: f64,
    /// Smallest damping parameter.
    pub lambda_min: f64,
    /// Largest damping parameter. Exceeding it stalls the iteration.
    pub lambda_max: f64,
    /// Number of damped re-solves attempted per iteration before declaring a stall.
    pub max_retries: usize,
    /// Relative step norm below which the optimizer declares convergence.
    pub step_tolerance: f64,
    /// Relative residual improvement below which the optimizer declares convergence.
    pub cost_tolerance: f64,
    /// Finite difference scheme for the Jacobian.
    pub difference: DifferenceScheme,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            lambda_init: 1e-3,
            lambda_factor: 10.0,
            lambda_min: 1e-12,
            lambda_max: 1e12,
            max_retries: 10,
            step_tolerance: 1e-10,
            cost_tolerance: 1e-12,
            difference: DifferenceScheme::Central,
        }
    }
}

impl LevenbergMarquardt {
    /// Create a configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial damping parameter.
    pub fn with_lambda_init(mut self, lambda: f64) -> Self {
        self.lambda_init = lambda;
        self
    }

    /// Set the number of re-solves per iteration.
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the finite difference scheme.
    pub fn with_difference(mut self, scheme: DifferenceScheme) -> Self {
        self.difference = scheme;
        self
    }
}

/// Buffers reused across optimizer calls.
#[derive(Debug, Default)]
struct Workspace {
    predictions: Vec<f64>,
    residual: Vec<f64>,
    trial_predictions: Vec<f64>,
    trial_residual: Vec<f64>,
    plus: Vec<f64>,
    minus: Vec<f64>,
    jacobian: Vec<f64>,
    jtj: Vec<f64>,
    jtr: Vec<f64>,
    delta: Vec<f64>,
    trial_params: Vec<f64>,
}

impl Workspace {
    fn resize(&mut self, num_params: usize, num_measurements: usize) {
        let m = num_measurements;
        let p = num_params;
        for buf in [
            &mut self.predictions,
            &mut self.residual,
            &mut self.trial_predictions,
            &mut self.trial_residual,
            &mut self.plus,
            &mut self.minus,
        ] {
            buf.clear();
            buf.resize(m, 0.0);
        }
        self.jacobian.clear();
        self.jacobian.resize(m * p, 0.0);
        self.jtj.clear();
        self.jtj.resize(p * p, 0.0);
        for buf in [&mut self.jtr, &mut self.delta, &mut self.trial_params] {
            buf.clear();
            buf.resize(p, 0.0);
        }
    }
}

/// Levenberg-Marquardt solver owning its scratch buffers.
///
/// The buffers grow to the largest problem seen and are reused by later calls, so a solver kept
/// alive across frames does not allocate once it has warmed up.
#[derive(Debug, Default)]
pub struct Optimizer {
    config: LevenbergMarquardt,
    workspace: Workspace,
}

impl Optimizer {
    /// Create an optimizer with the given configuration.
    pub fn new(config: LevenbergMarquardt) -> Self {
        Self {
            config,
            workspace: Workspace::default(),
        }
    }

    /// The optimizer configuration.
    pub fn config(&self) -> &LevenbergMarquardt {
        &self.config
    }

    /// Optimize `params` in place so that `model(params)` best matches `measurements`.
    ///
    /// # Arguments
    ///
    /// * `params` - Initial parameters, overwritten with the best parameters found.
    /// * `measurements` - Observed values, at least as many as there are parameters.
    /// * `step_size` - Absolute finite difference step used to estimate the Jacobian.
    /// * `max_iterations` - Hard cap on the number of iterations.
    /// * `model` - Measurement model mapping parameters to predictions.
    ///
    /// # Returns
    ///
    /// The optimization report. Stagnation is reported through
    /// [`OptimizationStatus::Stalled`], never as an error.
    ///
    /// # Errors
    ///
    /// Returns an error only when the problem is malformed.
    pub fn optimize<M: Model + ?Sized>(
        &mut self,
        params: &mut [f64],
        measurements: &[f64],
        step_size: f64,
        max_iterations: usize,
        model: &mut M,
    ) -> Result<OptimizationReport, OptimizerError> {
        let num_params = params.len();
        let num_measurements = measurements.len();

        if num_measurements < num_params {
            return Err(OptimizerError::InvalidProblemSize {
                params: num_params,
                measurements: num_measurements,
            });
        }

        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(OptimizerError::InvalidStepSize(step_size));
        }

        if max_iterations == 0 {
            return Err(OptimizerError::InvalidMaxIterations(max_iterations));
        }

        let config = &self.config;
        let ws = &mut self.workspace;
        ws.resize(num_params, num_measurements);

        model.evaluate(params, &mut ws.predictions);
        let mut residual_norm = residual_into(measurements, &ws.predictions, &mut ws.residual);
        let initial_residual_norm = residual_norm;

        let mut report = OptimizationReport {
            status: OptimizationStatus::MaxIterationsReached,
            iterations: 0,
            initial_residual_norm,
            residual_norm,
            lambda: config.lambda_init,
            residual_history: vec![residual_norm],
            num_measurements,
        };

        if num_params == 0 {
            report.status = OptimizationStatus::Converged;
            return Ok(report);
        }

        let mut lambda = config.lambda_init;

        for iteration in 0..max_iterations {
            report.iterations = iteration + 1;

            numerical_jacobian(
                model,
                params,
                &ws.predictions,
                step_size,
                config.difference,
                JacobianScratch {
                    plus: &mut ws.plus,
                    minus: &mut ws.minus,
                },
                &mut ws.jacobian,
            );
            normal_equations(&ws.jacobian, &ws.residual, num_params, &mut ws.jtj, &mut ws.jtr);

            if ws.jtr.iter().all(|g| *g == 0.0) {
                report.status = OptimizationStatus::Converged;
                break;
            }

            let param_norm = norm(params);
            let mut converged = false;
            let mut accepted = false;
            let previous_norm = residual_norm;

            for _ in 0..=config.max_retries {
                if !solve_damped(&ws.jtj, &ws.jtr, num_params, lambda, &mut ws.delta) {
                    lambda = (lambda * config.lambda_factor).min(config.lambda_max);
                    continue;
                }

                let step_norm = norm(&ws.delta);
                if step_norm <= config.step_tolerance * (param_norm + config.step_tolerance) {
                    converged = true;
                    break;
                }

                for ((t, p), d) in ws.trial_params.iter_mut().zip(params.iter()).zip(ws.delta.iter()) {
                    *t = p + d;
                }
                model.evaluate(&ws.trial_params, &mut ws.trial_predictions);
                let trial_norm =
                    residual_into(measurements, &ws.trial_predictions, &mut ws.trial_residual);

                if trial_norm < residual_norm {
                    params.copy_from_slice(&ws.trial_params);
                    std::mem::swap(&mut ws.predictions, &mut ws.trial_predictions);
                    std::mem::swap(&mut ws.residual, &mut ws.trial_residual);
                    residual_norm = trial_norm;
                    lambda = (lambda / config.lambda_factor).max(config.lambda_min);
                    accepted = true;
                    break;
                }

                // no improvement left beyond round-off
                if (trial_norm - residual_norm).abs() <= config.cost_tolerance * residual_norm {
                    converged = true;
                    break;
                }

                log::trace!(
                    "rejected step: lambda {:e} residual {:e} >= {:e}",
                    lambda,
                    trial_norm,
                    residual_norm
                );
                lambda *= config.lambda_factor;
                if lambda > config.lambda_max {
                    break;
                }
            }

            if converged {
                report.status = OptimizationStatus::Converged;
                break;
            }

            if !accepted {
                report.status = OptimizationStatus::Stalled;
                break;
            }

            report.residual_history.push(residual_norm);
            log::debug!(
                "iteration {}: residual {:e} lambda {:e}",
                iteration,
                residual_norm,
                lambda
            );

            if previous_norm - residual_norm <= config.cost_tolerance * previous_norm {
                report.status = OptimizationStatus::Converged;
                break;
            }
        }

        report.residual_norm = residual_norm;
        report.lambda = lambda;

        Ok(report)
    }
}

/// Optimize with a default configured, single use [`Optimizer`].
///
/// See [`Optimizer::optimize`].
pub fn optimize<M: Model + ?Sized>(
    params: &mut [f64],
    measurements: &[f64],
    step_size: f64,
    max_iterations: usize,
    model: &mut M,
) -> Result<OptimizationReport, OptimizerError> {
    Optimizer::default().optimize(params, measurements, step_size, max_iterations, model)
}

fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Write `measurements - predictions` into `residual` and return its norm.
fn residual_into(measurements: &[f64], predictions: &[f64], residual: &mut [f64]) -> f64 {
    let mut sum_sq = 0.0;
    for ((r, m), p) in residual.iter_mut().zip(measurements).zip(predictions) {
        *r = m - p;
        sum_sq += *r * *r;
    }
    sum_sq.sqrt()
}

/// Accumulate `J^T J` (row-major, `p x p`) and `J^T r` from a row-major Jacobian.
fn normal_equations(jacobian: &[f64], residual: &[f64], p: usize, jtj: &mut [f64], jtr: &mut [f64]) {
    jtj.fill(0.0);
    jtr.fill(0.0);

    for (row, r) in jacobian.chunks_exact(p).zip(residual.iter()) {
        for a in 0..p {
            let ja = row[a];
            if ja == 0.0 {
                continue;
            }
            jtr[a] += ja * r;
            for b in a..p {
                jtj[a * p + b] += ja * row[b];
            }
        }
    }

    // mirror the upper triangle
    for a in 0..p {
        for b in 0..a {
            jtj[a * p + b] = jtj[b * p + a];
        }
    }
}

/// Solve `(J^T J + λ diag(J^T J)) δ = J^T r` with a Cholesky factorization.
///
/// Returns `false` when the damped system is not positive definite or the solution is not finite.
fn solve_damped(jtj: &[f64], jtr: &[f64], p: usize, lambda: f64, delta: &mut [f64]) -> bool {
    let a = Mat::<f64>::from_fn(p, p, |i, j| {
        let v = jtj[i * p + j];
        if i == j {
            v + lambda * v.max(DIAGONAL_FLOOR)
        } else {
            v
        }
    });
    let b = Mat::<f64>::from_fn(p, 1, |i, _| jtr[i]);

    let Ok(llt) = a.cholesky(Side::Lower) else {
        return false;
    };
    let x = llt.solve(&b);

    for (i, d) in delta.iter_mut().enumerate() {
        *d = x[(i, 0)];
    }

    delta.iter().all(|d| d.is_finite())
}
