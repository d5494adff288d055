//! This crate provides a node that connects to RealSense cameras and
//! publishes their color frames, depth frames, and intrinsic calibration.
//!
//! The `realsense` feature requires the RealSense SDK at build time. When
//! it is disabled, the same API is exposed but no camera will ever be
//! discovered.

#[cfg(all(unix, feature = "realsense"))]
mod implementation;

#[cfg(all(unix, feature = "realsense"))]
pub use implementation::{discover_all_cameras, RealSenseCamera};

#[cfg(not(all(unix, feature = "realsense")))]
mod stub;

#[cfg(not(all(unix, feature = "realsense")))]
pub use stub::{discover_all_cameras, RealSenseCamera};
