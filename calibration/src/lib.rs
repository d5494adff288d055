//! Camera calibration types and the pinhole camera-matrix mapping.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// The distortion model the coefficients belong to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    /// Brown-Conrady, known to ROS consumers as `plumb_bob`.
    #[default]
    PlumbBob,
}

impl DistortionModel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlumbBob => "plumb_bob",
        }
    }
}

/// Intrinsic calibration of one camera stream.
///
/// Produced once at stream start and treated as read-only for the
/// lifetime of the stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub ppx: f64,
    pub ppy: f64,
    /// Ordered distortion coefficients, passed through unchanged.
    pub distortion: Vec<f64>,
    pub model: DistortionModel,
}

impl Intrinsics {
    /// The standard pinhole camera matrix:
    ///
    /// ```text
    /// [ fx,  0, ppx ]
    /// [  0, fy, ppy ]
    /// [  0,  0,   1 ]
    /// ```
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.ppx, //
            0.0, self.fy, self.ppy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// The calibration payload published to downstream consumers once per
/// intrinsics update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub width: u32,
    pub height: u32,
    /// Row-major 3x3 camera matrix.
    pub camera_matrix: [f64; 9],
    pub distortion_coefficients: Vec<f64>,
    pub distortion_model: DistortionModel,
}

impl From<&Intrinsics> for CalibrationData {
    fn from(intrinsics: &Intrinsics) -> Self {
        Self {
            width: intrinsics.width,
            height: intrinsics.height,
            camera_matrix: [
                intrinsics.fx,
                0.0,
                intrinsics.ppx,
                0.0,
                intrinsics.fy,
                intrinsics.ppy,
                0.0,
                0.0,
                1.0,
            ],
            distortion_coefficients: intrinsics.distortion.clone(),
            distortion_model: intrinsics.model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> Intrinsics {
        Intrinsics {
            width: 640,
            height: 480,
            fx: 600.0,
            fy: 600.0,
            ppx: 320.0,
            ppy: 240.0,
            distortion: vec![0.1, -0.2, 0.0, 0.0, 0.05],
            model: DistortionModel::PlumbBob,
        }
    }

    #[test]
    fn camera_matrix_layout() {
        let k = intrinsics().camera_matrix();
        assert_eq!(
            k,
            Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn calibration_data_is_row_major() {
        let data = CalibrationData::from(&intrinsics());
        assert_eq!(
            data.camera_matrix,
            [600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn distortion_passes_through_in_order() {
        let data = CalibrationData::from(&intrinsics());
        assert_eq!(data.distortion_coefficients, vec![0.1, -0.2, 0.0, 0.0, 0.05]);
        assert_eq!(data.distortion_model.as_str(), "plumb_bob");
    }
}
