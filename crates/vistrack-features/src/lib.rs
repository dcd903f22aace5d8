#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Every feature reported by the external detector is tracked through two independent state
//! machines: whether its 2D position is currently tracked, and how far its 3D scene point is
//! trusted for pose estimation.
//!
//! ```text
//!   None --propose_3d--> Initial --validate--> UseForPose
//!                           ^  \                  |
//!                           |   `---(outlier_limit bad frames)---> Outlier
//!                           `-------------propose_3d--------------'
//! ```

mod feature;
pub use feature::*;

mod store;
pub use store::*;
