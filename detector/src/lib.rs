//! Object detection with depth fusion.
//!
//! [`DetectorNode`] subscribes to the color, depth, and intrinsics
//! streams of a depth camera. Each color frame is handed to an
//! [`ObjectDetector`] on a dedicated inference thread; the resulting 2D
//! detections are fused with the latest depth frame and published as a
//! [`FusedDetectionArray`]. Color frames arriving while inference is
//! busy are dropped so the node always works on fresh data.

use std::{
    future::Future,
    sync::{mpsc::sync_channel, Arc},
};

use calibration::{CalibrationData, Intrinsics};
use percept_core::{
    anyhow,
    node::AsyncNode,
    pubsub::{subs::DirectSubscription, Publisher, PublisherRef, Subscriber},
    runtime::{RuntimeContext, RuntimeContextExt},
    setup_logging, tokio,
};
use vision_msgs::{ColorFrame, DepthFrame, FusedDetection, FusedDetectionArray};

mod annotate;
mod fusion;
mod sync;
mod yolo;

pub use annotate::annotate;
pub use fusion::fuse;
pub use sync::StreamSync;
pub use yolo::{coco_classes, ObjectDetector, YoloConfig, YoloV8};

/// Runs an [`ObjectDetector`] against a camera's streams.
pub struct DetectorNode<D> {
    detector: D,
    /// When set, annotated copies of processed color frames are also
    /// published.
    pub annotate_output: bool,
    color_sub: Subscriber<Arc<ColorFrame>>,
    depth_sub: Subscriber<Arc<DepthFrame>>,
    intrinsics_sub: Subscriber<Arc<Intrinsics>>,
    detections_received: Publisher<Arc<FusedDetectionArray>>,
    annotated_received: Publisher<Arc<ColorFrame>>,
    calibration_received: Publisher<Arc<CalibrationData>>,
}

impl<D: ObjectDetector> DetectorNode<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            annotate_output: false,
            // Queue sizes of 1 keep only the newest message of each stream.
            color_sub: Subscriber::new(1),
            depth_sub: Subscriber::new(1),
            intrinsics_sub: Subscriber::new(1),
            detections_received: Default::default(),
            annotated_received: Default::default(),
            calibration_received: Default::default(),
        }
    }

    pub fn create_color_sub(&self) -> DirectSubscription<Arc<ColorFrame>> {
        self.color_sub.create_subscription()
    }

    pub fn create_depth_sub(&self) -> DirectSubscription<Arc<DepthFrame>> {
        self.depth_sub.create_subscription()
    }

    pub fn create_intrinsics_sub(&self) -> DirectSubscription<Arc<Intrinsics>> {
        self.intrinsics_sub.create_subscription()
    }

    pub fn detections_pub(&self) -> PublisherRef<Arc<FusedDetectionArray>> {
        self.detections_received.get_ref()
    }

    /// Only produces messages when `annotate_output` is set.
    pub fn annotated_pub(&self) -> PublisherRef<Arc<ColorFrame>> {
        self.annotated_received.get_ref()
    }

    /// Re-publishes the camera intrinsics as calibration data whenever
    /// they change.
    pub fn calibration_pub(&self) -> PublisherRef<Arc<CalibrationData>> {
        self.calibration_received.get_ref()
    }
}

impl<D: ObjectDetector + 'static> AsyncNode for DetectorNode<D> {
    type Result = anyhow::Result<()>;

    fn run(mut self, context: RuntimeContext) -> impl Future<Output = Self::Result> + Send + 'static {
        async move {
            let stream_sync = StreamSync::default();
            // A rendezvous channel: try_send fails while inference is
            // still chewing on the previous frame, dropping that frame.
            let (img_sender, img_receiver) = sync_channel::<Arc<ColorFrame>>(0);

            let thread_sync = stream_sync.clone();
            let thread_context =
                context.clone_new_name(format!("{}-inference", context.get_name()));
            let mut detector = self.detector;
            let mut detections_received = self.detections_received;
            let mut annotated_received = self.annotated_received;
            let annotate_output = self.annotate_output;

            context.spawn_persistent_sync(move || {
                let context = thread_context;
                setup_logging!(context);

                while let Ok(frame) = img_receiver.recv() {
                    let detections = match detector.detect(&frame.image) {
                        Ok(detections) => detections,
                        Err(e) => {
                            error!("Inference failed: {e}");
                            continue;
                        }
                    };
                    let depth = thread_sync.current_depth();
                    let fused: Vec<FusedDetection> = detections
                        .into_iter()
                        .map(|detection| fuse(detection, depth.as_deref()))
                        .collect();
                    for detection in &fused {
                        debug!("{detection}");
                    }

                    if annotate_output {
                        annotated_received.set(Arc::new(ColorFrame {
                            image: annotate(&frame.image, &fused),
                            timestamp: frame.timestamp,
                        }));
                    }
                    detections_received.set(Arc::new(FusedDetectionArray {
                        detections: fused,
                        timestamp: frame.timestamp,
                    }));
                }
            });

            let mut calibration_received = self.calibration_received;
            let exit = context.clone().wait_for_exit();
            tokio::pin!(exit);

            loop {
                tokio::select! {
                    frame = self.color_sub.recv_or_closed() => {
                        let Some(frame) = frame else {
                            // Every camera publisher is gone.
                            break;
                        };
                        while let Some(depth) = self.depth_sub.try_recv() {
                            stream_sync.update_depth(depth);
                        }
                        while let Some(intrinsics) = self.intrinsics_sub.try_recv() {
                            calibration_received.set(Arc::new(CalibrationData::from(&*intrinsics)));
                            stream_sync.update_intrinsics(intrinsics);
                        }
                        let _ = img_sender.try_send(frame);
                    }
                    _ = &mut exit => break,
                }
            }
            Ok(())
        }
    }
}
