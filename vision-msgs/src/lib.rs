//! Message types shared by the camera and detector crates.

use std::{fmt::Display, sync::Arc, time::Duration};

use image::{ImageBuffer, Luma, RgbImage};

/// A depth image whose samples are distances in millimeters.
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// One frame from the color stream.
///
/// Frames are immutable once produced and shared as `Arc<ColorFrame>`.
pub struct ColorFrame {
    pub image: RgbImage,
    /// Time elapsed since the camera stream started.
    pub timestamp: Duration,
}

impl ColorFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// One frame from the depth stream, co-registered with the color stream
/// by the camera SDK.
pub struct DepthFrame {
    pub image: DepthImage,
    /// Time elapsed since the camera stream started.
    pub timestamp: Duration,
}

impl DepthFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The raw millimeter sample at the given pixel.
    ///
    /// Callers must bounds-check first.
    pub fn sample(&self, x: u32, y: u32) -> u16 {
        self.image.get_pixel(x, y)[0]
    }
}

/// A 2D bounding box produced by the detector, in pixel coordinates of
/// the color frame it was detected on.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection2D {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
    pub class_name: Arc<str>,
    /// In the range [0, 1].
    pub confidence: f32,
}

/// A [`Detection2D`] enriched with the depth read at its center pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedDetection {
    pub detection: Detection2D,
    /// Distance to the detection's center in meters. `None` when no depth
    /// frame was available or the center fell outside the depth frame.
    pub depth: Option<f32>,
}

impl Display for FusedDetection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {:.2}",
            self.detection.class_name, self.detection.confidence
        )?;
        if let Some(depth) = self.depth {
            write!(f, " | {depth:.2}m")?;
        }
        Ok(())
    }
}

/// All fused detections produced from one color frame.
///
/// An empty list is a valid result and means no objects were found.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FusedDetectionArray {
    pub detections: Vec<FusedDetection>,
    /// The timestamp of the color frame these detections came from.
    pub timestamp: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(confidence: f32) -> Detection2D {
        Detection2D {
            x1: 100.0,
            y1: 100.0,
            x2: 140.0,
            y2: 180.0,
            class_id: 0,
            class_name: "person".into(),
            confidence,
        }
    }

    #[test]
    fn label_with_depth() {
        let fused = FusedDetection {
            detection: person(0.874),
            depth: Some(2.5),
        };
        assert_eq!(fused.to_string(), "person: 0.87 | 2.50m");
    }

    #[test]
    fn label_without_depth() {
        let fused = FusedDetection {
            detection: person(0.9),
            depth: None,
        };
        assert_eq!(fused.to_string(), "person: 0.90");
    }
}
