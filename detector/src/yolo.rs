//! YOLOv8 object detection on ONNX Runtime.
//!
//! The model is exported with a `[1, 3, S, S]` input and a
//! `[1, 4 + classes, predictions]` output. Everything around the actual
//! inference call (letterboxing, decoding, NMS) is plain code so it stays
//! testable without the `onnx` feature.

use std::sync::Arc;

use image::RgbImage;
use percept_core::anyhow;
use vision_msgs::Detection2D;

/// Runs 2D object detection on a color image.
///
/// Implementations may hold mutable inference state, so detection takes
/// `&mut self`.
pub trait ObjectDetector: Send {
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection2D>>;
}

#[derive(Clone, Debug)]
pub struct YoloConfig {
    /// Detections below this confidence are dropped before NMS.
    pub conf_threshold: f32,
    /// Boxes overlapping a kept box by more than this IoU are suppressed.
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Side length of the square model input, typically 640.
    pub input_size: u32,
    pub class_names: Vec<Arc<str>>,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
            input_size: 640,
            class_names: coco_classes(),
        }
    }
}

impl YoloConfig {
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    fn class_name(&self, class_id: usize) -> Arc<str> {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class {class_id}").into())
    }
}

/// The 80 COCO class names, in model output order.
pub fn coco_classes() -> Vec<Arc<str>> {
    [
        "person",
        "bicycle",
        "car",
        "motorcycle",
        "airplane",
        "bus",
        "train",
        "truck",
        "boat",
        "traffic light",
        "fire hydrant",
        "stop sign",
        "parking meter",
        "bench",
        "bird",
        "cat",
        "dog",
        "horse",
        "sheep",
        "cow",
        "elephant",
        "bear",
        "zebra",
        "giraffe",
        "backpack",
        "umbrella",
        "handbag",
        "tie",
        "suitcase",
        "frisbee",
        "skis",
        "snowboard",
        "sports ball",
        "kite",
        "baseball bat",
        "baseball glove",
        "skateboard",
        "surfboard",
        "tennis racket",
        "bottle",
        "wine glass",
        "cup",
        "fork",
        "knife",
        "spoon",
        "bowl",
        "banana",
        "apple",
        "sandwich",
        "orange",
        "broccoli",
        "carrot",
        "hot dog",
        "pizza",
        "donut",
        "cake",
        "chair",
        "couch",
        "potted plant",
        "bed",
        "dining table",
        "toilet",
        "tv",
        "laptop",
        "mouse",
        "remote",
        "keyboard",
        "cell phone",
        "microwave",
        "oven",
        "toaster",
        "sink",
        "refrigerator",
        "book",
        "clock",
        "vase",
        "scissors",
        "teddy bear",
        "hair drier",
        "toothbrush",
    ]
    .into_iter()
    .map(Arc::from)
    .collect()
}

/// How a source image was fit into the square model input.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
impl Letterbox {
    fn fit(img_width: u32, img_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / img_width as f32)
            .min(input_size as f32 / img_height as f32);
        let new_w = (img_width as f32 * scale) as u32;
        let new_h = (img_height as f32 * scale) as u32;
        Self {
            scale,
            pad_x: (input_size - new_w) as f32 / 2.0,
            pad_y: (input_size - new_h) as f32 / 2.0,
        }
    }

    /// Maps a center-format box from model coordinates back to source
    /// image coordinates, clamped to the image bounds.
    fn unmap(
        &self,
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
        img_width: u32,
        img_height: u32,
    ) -> (f32, f32, f32, f32) {
        let cx = (cx - self.pad_x) / self.scale;
        let cy = (cy - self.pad_y) / self.scale;
        let w = w / self.scale;
        let h = h / self.scale;
        let x1 = (cx - w / 2.0).clamp(0.0, img_width as f32);
        let y1 = (cy - h / 2.0).clamp(0.0, img_height as f32);
        let x2 = (cx + w / 2.0).clamp(0.0, img_width as f32);
        let y2 = (cy + h / 2.0).clamp(0.0, img_height as f32);
        (x1, y1, x2, y2)
    }
}

#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn iou(a: &Detection2D, b: &Detection2D) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy per-confidence NMS across all classes.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn non_maximum_suppression(
    mut detections: Vec<Detection2D>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection2D> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection2D> = Vec::new();
    for candidate in detections {
        if keep.len() >= max_detections {
            break;
        }
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(feature = "onnx")]
mod onnx {
    use ndarray::{Array, ArrayViewD, Ix4};
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::Tensor;

    use super::*;

    /// A YOLOv8 model loaded into an ONNX Runtime session.
    pub struct YoloV8 {
        session: Session,
        config: YoloConfig,
    }

    impl YoloV8 {
        pub fn new(model_path: impl AsRef<std::path::Path>, config: YoloConfig) -> anyhow::Result<Self> {
            let model_path = model_path.as_ref();
            if !model_path.exists() {
                return Err(anyhow::anyhow!(
                    "Model file not found: {}",
                    model_path.display()
                ));
            }
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path)?;
            Ok(Self { session, config })
        }

        /// Letterboxes the image into a normalized CHW tensor.
        fn preprocess(&self, image: &RgbImage, letterbox: Letterbox) -> Array<f32, Ix4> {
            let size = self.config.input_size as usize;
            let new_w = (image.width() as f32 * letterbox.scale) as u32;
            let new_h = (image.height() as f32 * letterbox.scale) as u32;
            let resized = image::imageops::resize(
                image,
                new_w.max(1),
                new_h.max(1),
                image::imageops::FilterType::Triangle,
            );

            let mut input = Array::zeros((1, 3, size, size));
            let pad_x = letterbox.pad_x as usize;
            let pad_y = letterbox.pad_y as usize;
            for (x, y, pixel) in resized.enumerate_pixels() {
                let dst_x = x as usize + pad_x;
                let dst_y = y as usize + pad_y;
                if dst_x >= size || dst_y >= size {
                    continue;
                }
                for c in 0..3 {
                    input[[0, c, dst_y, dst_x]] = pixel.0[c] as f32 / 255.0;
                }
            }
            input
        }

        /// Decodes the raw `[1, 4 + classes, predictions]` output into
        /// thresholded, NMS-filtered detections in source coordinates.
        fn decode(
            &self,
            output: ArrayViewD<f32>,
            letterbox: Letterbox,
            img_width: u32,
            img_height: u32,
        ) -> anyhow::Result<Vec<Detection2D>> {
            let shape = output.shape();
            if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
                return Err(anyhow::anyhow!("Unexpected model output shape: {shape:?}"));
            }
            let num_classes = shape[1] - 4;
            let num_preds = shape[2];

            let mut detections = Vec::new();
            for pred in 0..num_preds {
                let mut best_conf = 0.0f32;
                let mut best_class = 0usize;
                for class in 0..num_classes {
                    let conf = output[[0, 4 + class, pred]];
                    if conf > best_conf {
                        best_conf = conf;
                        best_class = class;
                    }
                }
                if best_conf < self.config.conf_threshold {
                    continue;
                }

                let (x1, y1, x2, y2) = letterbox.unmap(
                    output[[0, 0, pred]],
                    output[[0, 1, pred]],
                    output[[0, 2, pred]],
                    output[[0, 3, pred]],
                    img_width,
                    img_height,
                );
                detections.push(Detection2D {
                    x1,
                    y1,
                    x2,
                    y2,
                    class_id: best_class,
                    class_name: self.config.class_name(best_class),
                    confidence: best_conf,
                });
            }

            Ok(non_maximum_suppression(
                detections,
                self.config.iou_threshold,
                self.config.max_detections,
            ))
        }
    }

    impl ObjectDetector for YoloV8 {
        fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection2D>> {
            let letterbox = Letterbox::fit(image.width(), image.height(), self.config.input_size);
            let input = Tensor::from_array(self.preprocess(image, letterbox))?;
            // The outputs borrow the session, so copy the tensor out
            // before decoding.
            let output = {
                let outputs = self.session.run(ort::inputs![input])?;
                let view: ArrayViewD<f32> = outputs[0].try_extract_array()?;
                view.to_owned()
            };
            self.decode(output.view(), letterbox, image.width(), image.height())
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::YoloV8;

/// Stand-in for builds without ONNX Runtime. Uninhabited, so `detect`
/// is unreachable by construction.
#[cfg(not(feature = "onnx"))]
pub enum YoloV8 {}

#[cfg(not(feature = "onnx"))]
impl YoloV8 {
    pub fn new(
        _model_path: impl AsRef<std::path::Path>,
        _config: YoloConfig,
    ) -> anyhow::Result<Self> {
        Err(anyhow::anyhow!(
            "ONNX support was not compiled in. Enable the onnx feature."
        ))
    }
}

#[cfg(not(feature = "onnx"))]
impl ObjectDetector for YoloV8 {
    fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Detection2D>> {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection2D {
        Detection2D {
            x1,
            y1,
            x2,
            y2,
            class_id: 0,
            class_name: Arc::from("person"),
            confidence,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = detection(0.0, 0.0, 10.0, 10.0, 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = detection(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = detection(20.0, 20.0, 30.0, 30.0, 0.9);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_keeps_highest_confidence_of_overlapping_pair() {
        let weak = detection(0.0, 0.0, 10.0, 10.0, 0.5);
        let strong = detection(1.0, 1.0, 11.0, 11.0, 0.9);
        let kept = non_maximum_suppression(vec![weak, strong], 0.45, 100);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_disjoint_boxes() {
        let a = detection(0.0, 0.0, 10.0, 10.0, 0.5);
        let b = detection(100.0, 100.0, 110.0, 110.0, 0.9);
        let kept = non_maximum_suppression(vec![a, b], 0.45, 100);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn nms_respects_max_detections() {
        let detections = (0..10)
            .map(|i| detection(i as f32 * 50.0, 0.0, i as f32 * 50.0 + 10.0, 10.0, 0.9))
            .collect();
        let kept = non_maximum_suppression(detections, 0.45, 3);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn letterbox_centers_a_wide_image() {
        // 640x360 scaled into 640x640 leaves 140px of padding above and below.
        let letterbox = Letterbox::fit(640, 360, 640);
        assert_eq!(letterbox.scale, 1.0);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 140.0);
    }

    #[test]
    fn letterbox_unmap_inverts_padding_and_scale() {
        let letterbox = Letterbox::fit(320, 240, 640);
        // 320x240 doubles to 640x480 with 80px of vertical padding.
        assert_eq!(letterbox.scale, 2.0);
        assert_eq!(letterbox.pad_y, 80.0);
        let (x1, y1, x2, y2) = letterbox.unmap(320.0, 320.0, 100.0, 100.0, 320, 240);
        assert_eq!((x1, y1), (135.0, 95.0));
        assert_eq!((x2, y2), (185.0, 145.0));
    }

    #[test]
    fn unmapped_boxes_are_clamped_to_the_image() {
        let letterbox = Letterbox::fit(640, 640, 640);
        let (x1, y1, x2, y2) = letterbox.unmap(10.0, 10.0, 100.0, 100.0, 640, 640);
        assert_eq!((x1, y1), (0.0, 0.0));
        assert_eq!((x2, y2), (60.0, 60.0));
    }

    #[test]
    fn unknown_class_id_gets_a_placeholder_name() {
        let config = YoloConfig::default();
        assert_eq!(config.class_name(0).as_ref(), "person");
        assert_eq!(config.class_name(500).as_ref(), "class 500");
    }
}
