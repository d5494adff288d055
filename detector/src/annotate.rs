//! Burns detection boxes into a color image.

use image::{Rgb, RgbImage};
use vision_msgs::FusedDetection;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;

/// Returns a copy of `image` with a hollow rectangle drawn around each
/// detection. Boxes partially outside the image are clipped.
pub fn annotate(image: &RgbImage, detections: &[FusedDetection]) -> RgbImage {
    let mut canvas = image.clone();
    for fused in detections {
        let det = &fused.detection;
        draw_rectangle(&mut canvas, det.x1, det.y1, det.x2, det.y2);
    }
    canvas
}

fn draw_rectangle(canvas: &mut RgbImage, x1: f32, y1: f32, x2: f32, y2: f32) {
    let width = canvas.width() as i64;
    let height = canvas.height() as i64;
    let x1 = (x1.round() as i64).clamp(0, width - 1);
    let y1 = (y1.round() as i64).clamp(0, height - 1);
    let x2 = (x2.round() as i64).clamp(0, width - 1);
    let y2 = (y2.round() as i64).clamp(0, height - 1);
    if x2 <= x1 || y2 <= y1 {
        return;
    }

    for t in 0..BOX_THICKNESS as i64 {
        for x in x1..=x2 {
            put(canvas, x, y1 + t);
            put(canvas, x, y2 - t);
        }
        for y in y1..=y2 {
            put(canvas, x1 + t, y);
            put(canvas, x2 - t, y);
        }
    }
}

fn put(canvas: &mut RgbImage, x: i64, y: i64) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use vision_msgs::Detection2D;

    fn fused(x1: f32, y1: f32, x2: f32, y2: f32) -> FusedDetection {
        FusedDetection {
            detection: Detection2D {
                x1,
                y1,
                x2,
                y2,
                class_id: 0,
                class_name: Arc::from("person"),
                confidence: 0.9,
            },
            depth: Some(2.5),
        }
    }

    #[test]
    fn border_pixels_are_painted_and_interior_is_not() {
        let image = RgbImage::new(64, 64);
        let annotated = annotate(&image, &[fused(10.0, 10.0, 30.0, 30.0)]);
        assert_eq!(*annotated.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(20, 30), BOX_COLOR);
        // Second ring of the 2px border.
        assert_eq!(*annotated.get_pixel(11, 20), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn source_image_is_untouched() {
        let image = RgbImage::new(64, 64);
        let _ = annotate(&image, &[fused(10.0, 10.0, 30.0, 30.0)]);
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_outside_the_image_are_clipped() {
        let image = RgbImage::new(32, 32);
        let annotated = annotate(&image, &[fused(-10.0, -10.0, 100.0, 100.0)]);
        assert_eq!(*annotated.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(31, 31), BOX_COLOR);
    }

    #[test]
    fn degenerate_boxes_draw_nothing() {
        let image = RgbImage::new(32, 32);
        let annotated = annotate(&image, &[fused(5.0, 5.0, 5.0, 5.0)]);
        assert_eq!(annotated, image);
    }
}
