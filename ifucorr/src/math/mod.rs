//! Numeric helpers shared by the estimators.

pub mod bbox;
pub mod interp;
pub mod statistics;

pub use bbox::Aabb;
pub use interp::LinearInterpolant;
pub use statistics::{finite_median, median_f32_mut, sigma_clipped_median_mad};
