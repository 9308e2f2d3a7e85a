//! Geometry utilities: SE3 transforms, robust fitting, epipolar estimation.

pub mod epipolar;
pub mod ransac;
pub mod se3;

pub use ransac::{ransac, Estimator, RansacOptions, RansacResult};
pub use se3::SE3;
