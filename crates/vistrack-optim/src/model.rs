/// A measurement model evaluated by the optimizer.
///
/// Implementations must be a pure function of `params`: evaluating the same parameters twice
/// has to produce the same predictions. Any state the model needs (sample positions, scene
/// points, camera) is captured by the implementor.
///
/// Every `FnMut(&[f64], &mut [f64])` closure is a model.
pub trait Model {
    /// Write the predicted measurements for `params` into `predictions`.
    ///
    /// `predictions` always has the length of the measurement vector.
    fn evaluate(&mut self, params: &[f64], predictions: &mut [f64]);
}

impl<F> Model for F
where
    F: FnMut(&[f64], &mut [f64]),
{
    fn evaluate(&mut self, params: &[f64], predictions: &mut [f64]) {
        self(params, predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::Model;

    struct Line {
        xs: Vec<f64>,
    }

    impl Model for Line {
        fn evaluate(&mut self, params: &[f64], predictions: &mut [f64]) {
            for (p, x) in predictions.iter_mut().zip(self.xs.iter()) {
                *p = params[0] * x + params[1];
            }
        }
    }

    #[test]
    fn test_closure_and_struct_models_agree() {
        let xs = vec![-1.0, 0.0, 2.0];
        let mut line = Line { xs: xs.clone() };
        let mut closure = |p: &[f64], out: &mut [f64]| {
            for (o, x) in out.iter_mut().zip(xs.iter()) {
                *o = p[0] * x + p[1];
            }
        };

        let mut a = [0.0; 3];
        let mut b = [0.0; 3];
        line.evaluate(&[2.0, 1.0], &mut a);
        closure.evaluate(&[2.0, 1.0], &mut b);

        assert_eq!(a, [-1.0, 1.0, 5.0]);
        assert_eq!(a, b);
    }
}
