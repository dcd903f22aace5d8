use serde::{Deserialize, Serialize};

use crate::model::Model;

/// Finite difference scheme used to estimate the Jacobian of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceScheme {
    /// `(f(p + h) - f(p - h)) / 2h`, two model evaluations per parameter.
    #[default]
    Central,
    /// `(f(p + h) - f(p)) / h`, one model evaluation per parameter.
    Forward,
}

/// Scratch buffers for one Jacobian estimate.
pub(crate) struct JacobianScratch<'a> {
    pub plus: &'a mut [f64],
    pub minus: &'a mut [f64],
}

/// Estimate the Jacobian of the predictions with respect to the parameters.
///
/// The result is written row-major into `jacobian` (`measurements x params`).
/// `params` is perturbed in place one entry at a time and restored bit-exactly afterwards.
/// `predictions` must hold the model evaluated at `params`.
pub(crate) fn numerical_jacobian<M: Model + ?Sized>(
    model: &mut M,
    params: &mut [f64],
    predictions: &[f64],
    step: f64,
    scheme: DifferenceScheme,
    scratch: JacobianScratch<'_>,
    jacobian: &mut [f64],
) {
    let num_params = params.len();
    let JacobianScratch { plus, minus } = scratch;

    debug_assert_eq!(jacobian.len(), predictions.len() * num_params);

    for j in 0..num_params {
        let original = params[j];

        params[j] = original + step;
        model.evaluate(params, plus);

        match scheme {
            DifferenceScheme::Central => {
                params[j] = original - step;
                model.evaluate(params, minus);
                let inv_2h = 1.0 / (2.0 * step);
                for (i, (p, m)) in plus.iter().zip(minus.iter()).enumerate() {
                    jacobian[i * num_params + j] = (p - m) * inv_2h;
                }
            }
            DifferenceScheme::Forward => {
                let inv_h = 1.0 / step;
                for (i, (p, f)) in plus.iter().zip(predictions.iter()).enumerate() {
                    jacobian[i * num_params + j] = (p - f) * inv_h;
                }
            }
        }

        params[j] = original;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quadratic(p: &[f64], out: &mut [f64]) {
        // f0 = a^2, f1 = a * b, f2 = b
        out[0] = p[0] * p[0];
        out[1] = p[0] * p[1];
        out[2] = p[1];
    }

    fn estimate(scheme: DifferenceScheme, step: f64) -> Vec<f64> {
        let mut params = vec![3.0, -2.0];
        let mut predictions = vec![0.0; 3];
        let mut model = quadratic;
        model.evaluate(&params, &mut predictions);

        let mut plus = vec![0.0; 3];
        let mut minus = vec![0.0; 3];
        let mut jacobian = vec![0.0; 6];
        numerical_jacobian(
            &mut model,
            &mut params,
            &predictions,
            step,
            scheme,
            JacobianScratch {
                plus: &mut plus,
                minus: &mut minus,
            },
            &mut jacobian,
        );
        assert_eq!(params, vec![3.0, -2.0]);
        jacobian
    }

    #[test]
    fn test_central_difference_is_exact_for_quadratics() {
        let jac = estimate(DifferenceScheme::Central, 0.5);
        let expected = [6.0, 0.0, -2.0, 3.0, 0.0, 1.0];
        for (a, b) in jac.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_forward_difference_has_first_order_bias() {
        let jac = estimate(DifferenceScheme::Forward, 0.5);
        // d(a^2)/da estimated as 2a + h
        assert_relative_eq!(jac[0], 6.5, epsilon = 1e-12);
        assert_relative_eq!(jac[3], 3.0, epsilon = 1e-12);
    }
}
