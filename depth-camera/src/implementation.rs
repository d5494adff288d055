use std::{
    collections::HashSet,
    ops::Deref,
    path::Path,
    sync::{Arc, Mutex},
    time::Instant,
};

use calibration::{DistortionModel, Intrinsics};
use image::{ImageBuffer, Luma, Rgb};
use percept_core::{
    anyhow,
    logging::rate::RateLogger,
    node::SyncNode,
    pubsub::{Publisher, PublisherRef},
    runtime::{RuntimeContext, RuntimeContextExt},
    setup_logging,
};
use realsense_rust::{
    config::Config,
    context::Context,
    device::Device,
    frame::{ColorFrame as RsColorFrame, DepthFrame as RsDepthFrame, PixelKind},
    kind::{Rs2CameraInfo, Rs2Format, Rs2StreamKind},
    pipeline::InactivePipeline,
};
use vision_msgs::{ColorFrame, DepthFrame};

/// A connection to a RealSense camera.
///
/// Both streams are requested at the same resolution so that depth
/// samples land on the color frame's pixel grid.
pub struct RealSenseCamera {
    device: Device,
    context: Arc<Mutex<Context>>,
    color_received: Publisher<Arc<ColorFrame>>,
    depth_received: Publisher<Arc<DepthFrame>>,
    intrinsics_received: Publisher<Arc<Intrinsics>>,
    width: u32,
    height: u32,
    fps: u32,
}

impl RealSenseCamera {
    /// Attempts to connect to the camera at the given `dev` path.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut context = Context::new()?;
        let device = context.add_device(path)?;
        Ok(Self::from_device(device, Arc::new(Mutex::new(context))))
    }

    fn from_device(device: Device, context: Arc<Mutex<Context>>) -> Self {
        Self {
            device,
            context,
            color_received: Default::default(),
            depth_received: Default::default(),
            intrinsics_received: Default::default(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }

    /// Requests the given resolution for both streams.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
    }

    pub fn color_pub(&self) -> PublisherRef<Arc<ColorFrame>> {
        self.color_received.get_ref()
    }

    pub fn depth_pub(&self) -> PublisherRef<Arc<DepthFrame>> {
        self.depth_received.get_ref()
    }

    /// Intrinsics are published exactly once, right after the stream starts.
    pub fn intrinsics_pub(&self) -> PublisherRef<Arc<Intrinsics>> {
        self.intrinsics_received.get_ref()
    }
}

impl SyncNode for RealSenseCamera {
    type Result = anyhow::Result<()>;

    fn run(mut self, context: RuntimeContext) -> Self::Result {
        setup_logging!(context);
        let pipeline = InactivePipeline::try_from(self.context.lock().unwrap().deref())?;
        let mut config = Config::new();

        let usb_cstr = self
            .device
            .info(Rs2CameraInfo::UsbTypeDescriptor)
            .ok_or_else(|| anyhow::anyhow!("Failed to query USB type"))?;
        let usb_val: f32 = usb_cstr.to_str()?.parse()?;
        if usb_val < 3.0 {
            warn!("This RealSense camera is not attached to a USB 3.0 port");
        }
        let serial = self
            .device
            .info(Rs2CameraInfo::SerialNumber)
            .ok_or_else(|| anyhow::anyhow!("Failed to query serial number"))?;
        config
            .enable_device_from_serial(serial)?
            .disable_all_streams()?
            .enable_stream(
                Rs2StreamKind::Depth,
                None,
                self.width as usize,
                self.height as usize,
                Rs2Format::Z16,
                self.fps as usize,
            )?
            .enable_stream(
                Rs2StreamKind::Color,
                None,
                self.width as usize,
                self.height as usize,
                Rs2Format::Rgb8,
                self.fps as usize,
            )?;

        // Change pipeline's type from InactivePipeline -> ActivePipeline
        let mut pipeline = pipeline.start(Some(config))?;

        let color_stream = pipeline
            .profile()
            .streams()
            .iter()
            .find(|stream| stream.kind() == Rs2StreamKind::Color)
            .ok_or_else(|| anyhow::anyhow!("Color stream missing from pipeline profile"))?;
        let intrinsics = color_stream.intrinsics()?;
        self.intrinsics_received.set(Arc::new(Intrinsics {
            width: intrinsics.width() as u32,
            height: intrinsics.height() as u32,
            fx: intrinsics.fx() as f64,
            fy: intrinsics.fy() as f64,
            ppx: intrinsics.ppx() as f64,
            ppy: intrinsics.ppy() as f64,
            distortion: intrinsics.coeffs().iter().map(|&c| c as f64).collect(),
            model: DistortionModel::PlumbBob,
        }));

        let start = Instant::now();
        let mut rate = RateLogger::new("camera-fps");

        loop {
            let frames = match pipeline.wait(None) {
                Ok(frames) => frames,
                Err(e) => {
                    error!("Failed to wait for frames: {e}");
                    continue;
                }
            };
            if context.is_runtime_exiting() {
                break Ok(());
            }
            let timestamp = start.elapsed();

            for frame in frames.frames_of_type::<RsColorFrame>() {
                let Some(image) = ImageBuffer::<Rgb<u8>, _>::from_raw(
                    frame.width() as u32,
                    frame.height() as u32,
                    frame
                        .iter()
                        .flat_map(|px| {
                            let PixelKind::Rgb8 { r, g, b } = px else {
                                unreachable!()
                            };
                            [*r, *g, *b]
                        })
                        .collect(),
                ) else {
                    error!("Failed to copy RealSense color image");
                    continue;
                };
                rate.increment();
                self.color_received
                    .set(Arc::new(ColorFrame { image, timestamp }));
            }

            for frame in frames.frames_of_type::<RsDepthFrame>() {
                let Some(image) = ImageBuffer::<Luma<u16>, Vec<_>>::from_raw(
                    frame.width() as u32,
                    frame.height() as u32,
                    frame
                        .iter()
                        .map(|px| {
                            let PixelKind::Z16 { depth } = px else {
                                unreachable!()
                            };
                            *depth
                        })
                        .collect(),
                ) else {
                    error!("Failed to copy RealSense depth image");
                    continue;
                };
                self.depth_received
                    .set(Arc::new(DepthFrame { image, timestamp }));
            }
        }
    }
}

/// Returns an iterator over all the RealSense cameras identified on this
/// computer.
pub fn discover_all_cameras() -> anyhow::Result<impl Iterator<Item = RealSenseCamera>> {
    let context = Context::new()?;
    let devices = context.query_devices(HashSet::new());
    let context = Arc::new(Mutex::new(context));

    Ok(devices
        .into_iter()
        .map(move |device| RealSenseCamera::from_device(device, context.clone())))
}
