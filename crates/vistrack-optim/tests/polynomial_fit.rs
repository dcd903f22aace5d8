//! Polynomial curve fitting with samples drawn from a known polynomial.

use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use vistrack_optim::{
    optimize, DifferenceScheme, LevenbergMarquardt, OptimizationStatus, Optimizer, OptimizerError,
};

/// Evaluate `sum_i coeffs[i] * x^i`.
fn polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn polynomial_model(xs: &[f64]) -> impl FnMut(&[f64], &mut [f64]) + '_ {
    move |coeffs: &[f64], out: &mut [f64]| {
        for (o, x) in out.iter_mut().zip(xs.iter()) {
            *o = polynomial(coeffs, *x);
        }
    }
}

fn sample(coeffs: &[f64], n: usize, sigma: f64, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();
    let xs: Vec<f64> = (0..n).map(|_| rng.random_range(-4.0..=4.0)).collect();
    let ys = xs
        .iter()
        .map(|x| {
            let y = polynomial(coeffs, *x);
            if sigma > 0.0 {
                y + noise.sample(&mut rng)
            } else {
                y
            }
        })
        .collect();
    (xs, ys)
}

#[test]
fn test_noiseless_polynomials_are_recovered() {
    let truth = [0.3, -0.2, 0.45, 0.1, -0.35];
    for degree in 0..5 {
        let coeffs = &truth[..=degree];
        let (xs, ys) = sample(coeffs, 200, 0.0, degree as u64);

        let mut params = vec![0.0; degree + 1];
        let max_iterations = 100;
        let report = optimize(&mut params, &ys, 0.1, max_iterations, &mut polynomial_model(&xs))
            .unwrap();

        assert_eq!(report.status, OptimizationStatus::Converged, "degree {degree}");
        assert!(report.iterations < max_iterations);
        for (estimated, expected) in params.iter().zip(coeffs.iter()) {
            assert_relative_eq!(*estimated, *expected, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_noisy_quartic_fit() {
    // y = x^4 - 2 x^2 + 1, coefficients stored lowest order first
    let truth = [1.0, 0.0, -2.0, 0.0, 1.0];
    let sigma = 1.0;
    let (xs, ys) = sample(&truth, 1000, sigma, 42);

    let mut params = [0.0; 5];
    let report = optimize(&mut params, &ys, 0.1, 100, &mut polynomial_model(&xs)).unwrap();

    assert!(report.iterations <= 100);
    assert_eq!(report.status, OptimizationStatus::Converged);
    assert!(report.rms() < 1.1 * sigma, "rms {}", report.rms());
    // the leading coefficient dominates on [-4, 4] and is well constrained
    assert_relative_eq!(params[4], 1.0, epsilon = 1e-2);
}

#[test]
fn test_lower_degree_model_underfits() {
    let truth = [1.0, 0.0, -2.0, 0.0, 1.0];
    let (xs, ys) = sample(&truth, 500, 0.0, 3);

    let mut quadratic = [0.0; 3];
    let low = optimize(&mut quadratic, &ys, 0.1, 100, &mut polynomial_model(&xs)).unwrap();

    let mut quartic = [0.0; 5];
    let full = optimize(&mut quartic, &ys, 0.1, 100, &mut polynomial_model(&xs)).unwrap();

    assert!(full.residual_norm < low.residual_norm);
    assert!(full.rms() < 1e-6);
}

#[test]
fn test_forward_differences_fit_linear_models() {
    let truth = [0.5, -1.0, 0.25];
    let (xs, ys) = sample(&truth, 50, 0.0, 11);

    let mut optimizer =
        Optimizer::new(LevenbergMarquardt::default().with_difference(DifferenceScheme::Forward));
    let mut params = [0.0; 3];
    let report = optimizer
        .optimize(&mut params, &ys, 0.1, 100, &mut polynomial_model(&xs))
        .unwrap();

    assert!(report.status.is_converged());
    for (estimated, expected) in params.iter().zip(truth.iter()) {
        assert_relative_eq!(*estimated, *expected, epsilon = 1e-6);
    }
}

#[test]
fn test_problem_size_boundary() {
    for p in 1..6 {
        for m in 0..8 {
            let mut params = vec![0.0; p];
            let measurements = vec![1.0; m];
            let result = optimize(&mut params, &measurements, 0.1, 5, &mut |q: &[f64], out: &mut [f64]| {
                let s: f64 = q.iter().sum();
                out.fill(s);
            });
            if m < p {
                assert!(matches!(result, Err(OptimizerError::InvalidProblemSize { .. })));
            } else {
                assert!(result.is_ok(), "p {p} m {m}");
            }
        }
    }
}

#[test]
fn test_monotonic_history_for_random_seeds() {
    let truth = [1.0, 0.0, -2.0, 0.0, 1.0];
    let (xs, ys) = sample(&truth, 300, 0.5, 5);
    let mut rng = StdRng::seed_from_u64(99);
    let mut optimizer = Optimizer::default();

    for _ in 0..10 {
        let mut params: Vec<f64> = (0..5).map(|_| rng.random_range(-10.0..10.0)).collect();
        let report = optimizer
            .optimize(&mut params, &ys, 0.1, 30, &mut polynomial_model(&xs))
            .unwrap();
        assert!(report
            .residual_history
            .windows(2)
            .all(|pair| pair[1] <= pair[0]));
        assert!(report.residual_norm <= report.initial_residual_norm);
    }
}
