#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use vistrack_lie as lie;

#[doc(inline)]
pub use vistrack_optim as optim;

#[doc(inline)]
pub use vistrack_features as features;

#[doc(inline)]
pub use vistrack_tracking as tracking;
