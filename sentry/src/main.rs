//! Sentry connects a RealSense depth camera to a YOLOv8 detector and
//! reports what it sees, and how far away it is.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use depth_camera::discover_all_cameras;
use detector::{DetectorNode, YoloConfig, YoloV8};
use percept_core::{
    anyhow,
    node::{AsyncNode, SyncNode},
    pubsub::{subs::Subscription, Subscriber},
    runtime::{start_runtime, LogPath, MainRuntimeContext, RuntimeContextExt},
    setup_logging, tokio,
};
use serde::Deserialize;
use vision_msgs::FusedDetectionArray;

const CONFIG_PATH: &str = "sentry.toml";

#[derive(Default, Deserialize)]
#[serde(default)]
struct SentryConfig {
    camera: CameraConfig,
    detector: DetectorConfig,
}

#[derive(Deserialize)]
#[serde(default)]
struct CameraConfig {
    width: u32,
    height: u32,
    fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct DetectorConfig {
    model_path: PathBuf,
    conf_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
    annotate: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".into(),
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
            annotate: false,
        }
    }
}

fn load_config() -> anyhow::Result<SentryConfig> {
    match std::fs::read_to_string(CONFIG_PATH) {
        Ok(text) => Ok(toml::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SentryConfig::default()),
        Err(e) => Err(e.into()),
    }
}

fn main() -> anyhow::Result<()> {
    start_runtime(main_task, |builder| {
        builder.log_path = LogPath::Default {
            application_name: "sentry".into(),
        };
    })
    .unwrap_or(Ok(()))
}

async fn main_task(context: MainRuntimeContext) -> anyhow::Result<()> {
    setup_logging!(context);

    let config = load_config()?;

    let mut camera = discover_all_cameras()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("No RealSense camera connected"))?;
    camera.set_resolution(config.camera.width, config.camera.height);
    camera.set_fps(config.camera.fps);

    let yolo = YoloV8::new(
        &config.detector.model_path,
        YoloConfig {
            conf_threshold: config.detector.conf_threshold,
            iou_threshold: config.detector.iou_threshold,
            max_detections: config.detector.max_detections,
            ..Default::default()
        },
    )?;
    let mut detector = DetectorNode::new(yolo);
    detector.annotate_output = config.detector.annotate;

    camera
        .color_pub()
        .accept_subscription(detector.create_color_sub().set_name("detector-color"));
    camera
        .depth_pub()
        .accept_subscription(detector.create_depth_sub());
    camera
        .intrinsics_pub()
        .accept_subscription(detector.create_intrinsics_sub());

    // Empty batches are still published upstream, but there is nothing
    // to report about them.
    let mut detections_sub = Subscriber::new(8);
    detector.detections_pub().accept_subscription(
        detections_sub
            .create_subscription()
            .filter_map(|batch: Arc<FusedDetectionArray>| {
                (!batch.detections.is_empty()).then_some(batch)
            }),
    );
    let mut calibration_sub = Subscriber::new(1);
    detector
        .calibration_pub()
        .accept_subscription(calibration_sub.create_subscription());
    let mut annotated_sub = Subscriber::new(1);
    if config.detector.annotate {
        detector
            .annotated_pub()
            .accept_subscription(annotated_sub.create_subscription());
    }

    camera.spawn(context.make_context("camera"));
    detector.spawn(context.make_context("detector"));

    let calibration_path = context.get_log_path().join("camera_info.toml");
    let frame_path = context.get_log_path().join("annotated.png");
    let mut last_frame_save = None::<Instant>;

    loop {
        tokio::select! {
            batch = detections_sub.recv_or_closed() => {
                let Some(batch) = batch else {
                    // The detector is gone, so there is nothing left to do.
                    break;
                };
                for detection in &batch.detections {
                    info!("{detection}");
                }
            }
            calibration = calibration_sub.recv() => {
                match toml::to_string(&*calibration) {
                    Ok(text) => {
                        if let Err(e) = std::fs::write(&calibration_path, text) {
                            error!("Failed to write camera calibration: {e}");
                        } else {
                            info!("Camera calibration written to {}", calibration_path.display());
                        }
                    }
                    Err(e) => error!("Failed to serialize camera calibration: {e}"),
                }
            }
            frame = annotated_sub.recv() => {
                // At most one snapshot per second.
                if last_frame_save.map_or(true, |at| at.elapsed() >= Duration::from_secs(1)) {
                    if let Err(e) = frame.image.save(&frame_path) {
                        error!("Failed to save annotated frame: {e}");
                    } else {
                        last_frame_save = Some(Instant::now());
                    }
                }
            }
        }
    }
    Ok(())
}
