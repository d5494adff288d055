//! Latest-wins synchronization of the camera's secondary streams.
//!
//! Color frames drive the detection loop, so they are never stored here;
//! depth frames and intrinsics arrive on their own cadence and are held
//! until a newer message replaces them.

use std::sync::{Arc, Mutex};

use calibration::Intrinsics;
use vision_msgs::DepthFrame;

#[derive(Default)]
struct State {
    depth: Option<Arc<DepthFrame>>,
    intrinsics: Option<Arc<Intrinsics>>,
}

/// Shared snapshot of the most recent depth frame and intrinsics.
///
/// Clones share the same state, so one handle can live on the receiving
/// task while another is read from the inference thread.
#[derive(Clone, Default)]
pub struct StreamSync {
    state: Arc<Mutex<State>>,
}

impl StreamSync {
    /// Replaces the stored depth frame. Older frames are discarded.
    pub fn update_depth(&self, frame: Arc<DepthFrame>) {
        self.state.lock().unwrap().depth = Some(frame);
    }

    /// Replaces the stored intrinsics. Older intrinsics are discarded.
    pub fn update_intrinsics(&self, intrinsics: Arc<Intrinsics>) {
        self.state.lock().unwrap().intrinsics = Some(intrinsics);
    }

    /// The most recent depth frame, or `None` if none has arrived yet.
    pub fn current_depth(&self) -> Option<Arc<DepthFrame>> {
        self.state.lock().unwrap().depth.clone()
    }

    /// The most recent intrinsics, or `None` if none has arrived yet.
    pub fn current_intrinsics(&self) -> Option<Arc<Intrinsics>> {
        self.state.lock().unwrap().intrinsics.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use vision_msgs::DepthImage;

    fn depth_frame(timestamp_ms: u64) -> Arc<DepthFrame> {
        Arc::new(DepthFrame {
            image: DepthImage::new(4, 4),
            timestamp: Duration::from_millis(timestamp_ms),
        })
    }

    #[test]
    fn empty_until_first_update() {
        let sync = StreamSync::default();
        assert!(sync.current_depth().is_none());
        assert!(sync.current_intrinsics().is_none());
    }

    #[test]
    fn newer_depth_replaces_older() {
        let sync = StreamSync::default();
        sync.update_depth(depth_frame(10));
        sync.update_depth(depth_frame(20));
        let current = sync.current_depth().unwrap();
        assert_eq!(current.timestamp, Duration::from_millis(20));
    }

    #[test]
    fn clones_share_state() {
        let sync = StreamSync::default();
        let reader = sync.clone();
        sync.update_depth(depth_frame(5));
        assert!(reader.current_depth().is_some());
    }
}
