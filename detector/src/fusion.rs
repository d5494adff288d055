//! Attaches a depth estimate to each 2D detection.

use vision_msgs::{DepthFrame, Detection2D, FusedDetection};

/// Estimates the distance to a detection by sampling the depth frame at
/// the center of its bounding box.
///
/// The depth is `None` when no depth frame is available or the rounded
/// center falls outside the frame. Samples are millimeters, converted to
/// meters; a zero sample is reported as `Some(0.0)` so downstream
/// consumers can tell "no return at this pixel" apart from "no depth
/// frame at all".
pub fn fuse(detection: Detection2D, depth: Option<&DepthFrame>) -> FusedDetection {
    let depth = depth.and_then(|frame| {
        let cx = ((detection.x1 + detection.x2) / 2.0).round() as i64;
        let cy = ((detection.y1 + detection.y2) / 2.0).round() as i64;
        if cx < 0 || cy < 0 || cx >= frame.width() as i64 || cy >= frame.height() as i64 {
            return None;
        }
        Some(frame.sample(cx as u32, cy as u32) as f32 / 1000.0)
    });
    FusedDetection { detection, depth }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use vision_msgs::DepthImage;

    fn detection(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection2D {
        Detection2D {
            x1,
            y1,
            x2,
            y2,
            class_id: 0,
            class_name: Arc::from("person"),
            confidence: 0.9,
        }
    }

    fn depth_frame(width: u32, height: u32, samples: &[(u32, u32, u16)]) -> DepthFrame {
        let mut image = DepthImage::new(width, height);
        for &(x, y, value) in samples {
            image.put_pixel(x, y, image::Luma([value]));
        }
        DepthFrame {
            image,
            timestamp: Duration::ZERO,
        }
    }

    #[test]
    fn no_depth_frame_yields_none() {
        let fused = fuse(detection(10.0, 10.0, 20.0, 20.0), None);
        assert_eq!(fused.depth, None);
    }

    #[test]
    fn center_sample_converted_to_meters() {
        // Center of (100, 100)..(140, 180) is (120, 140).
        let frame = depth_frame(640, 480, &[(120, 140, 2500)]);
        let fused = fuse(detection(100.0, 100.0, 140.0, 180.0), Some(&frame));
        assert_eq!(fused.depth, Some(2.5));
    }

    #[test]
    fn center_outside_frame_yields_none() {
        // A detection sized for 640x480 against a much smaller depth frame.
        let frame = depth_frame(64, 48, &[]);
        let fused = fuse(detection(100.0, 100.0, 140.0, 180.0), Some(&frame));
        assert_eq!(fused.depth, None);
    }

    #[test]
    fn zero_sample_passes_through() {
        let frame = depth_frame(640, 480, &[]);
        let fused = fuse(detection(10.0, 10.0, 20.0, 20.0), Some(&frame));
        assert_eq!(fused.depth, Some(0.0));
    }

    #[test]
    fn center_is_rounded_to_nearest_pixel() {
        // Center of (0, 0)..(3, 3) is (1.5, 1.5), which rounds to (2, 2).
        let frame = depth_frame(4, 4, &[(2, 2, 1000)]);
        let fused = fuse(detection(0.0, 0.0, 3.0, 3.0), Some(&frame));
        assert_eq!(fused.depth, Some(1.0));
    }

    #[test]
    fn identical_inputs_fuse_identically() {
        let frame = depth_frame(640, 480, &[(120, 140, 2500)]);
        let first = fuse(detection(100.0, 100.0, 140.0, 180.0), Some(&frame));
        let second = fuse(detection(100.0, 100.0, 140.0, 180.0), Some(&frame));
        assert_eq!(first, second);
    }

    #[test]
    fn detection_fields_are_preserved() {
        let frame = depth_frame(640, 480, &[]);
        let fused = fuse(detection(1.0, 2.0, 3.0, 4.0), Some(&frame));
        assert_eq!(fused.detection.x1, 1.0);
        assert_eq!(fused.detection.class_name.as_ref(), "person");
    }
}
