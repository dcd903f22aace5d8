#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Vistrack Optimization
//!
//! A model-agnostic solver for problems of the form
//! `min_p || measurements - model(p) ||^2` with `len(measurements) >= len(p)`.
//!
//! The Jacobian of the model is estimated by finite differences, so any closure that maps
//! parameters to predicted measurements can be optimized.
//!
//! ## Example
//!
//! ```rust
//! use vistrack_optim::{optimize, OptimizationStatus};
//!
//! // fit y = a * x + b
//! let xs = [0.0, 1.0, 2.0, 3.0];
//! let ys = [1.0, 3.0, 5.0, 7.0];
//! let mut params = [0.0, 0.0];
//!
//! let report = optimize(&mut params, &ys, 1e-3, 50, &mut |p: &[f64], out: &mut [f64]| {
//!     for (o, x) in out.iter_mut().zip(xs.iter()) {
//!         *o = p[0] * x + p[1];
//!     }
//! })?;
//!
//! assert_eq!(report.status, OptimizationStatus::Converged);
//! assert!((params[0] - 2.0).abs() < 1e-6);
//! assert!((params[1] - 1.0).abs() < 1e-6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod jacobian;
mod levenberg_marquardt;
mod model;

pub use jacobian::DifferenceScheme;
pub use levenberg_marquardt::*;
pub use model::Model;
