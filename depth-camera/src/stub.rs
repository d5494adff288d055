//! Stand-in for builds without the RealSense SDK.

use std::sync::Arc;

use calibration::Intrinsics;
use percept_core::{
    anyhow,
    node::SyncNode,
    pubsub::PublisherRef,
    runtime::RuntimeContext,
};
use vision_msgs::{ColorFrame, DepthFrame};

/// Uninhabited: without the `realsense` feature no camera can ever be
/// constructed, so the node methods are unreachable by construction.
pub enum RealSenseCamera {}

impl RealSenseCamera {
    pub fn set_resolution(&mut self, _width: u32, _height: u32) {
        match *self {}
    }

    pub fn set_fps(&mut self, _fps: u32) {
        match *self {}
    }

    pub fn color_pub(&self) -> PublisherRef<Arc<ColorFrame>> {
        match *self {}
    }

    pub fn depth_pub(&self) -> PublisherRef<Arc<DepthFrame>> {
        match *self {}
    }

    pub fn intrinsics_pub(&self) -> PublisherRef<Arc<Intrinsics>> {
        match *self {}
    }
}

impl SyncNode for RealSenseCamera {
    type Result = anyhow::Result<()>;

    fn run(self, _context: RuntimeContext) -> Self::Result {
        match self {}
    }
}

/// Always succeeds with an empty iterator.
pub fn discover_all_cameras() -> anyhow::Result<impl Iterator<Item = RealSenseCamera>> {
    Ok(std::iter::empty())
}
