// keypoint.rs -- A tracked image location with a validity flag.

use crate::linalg::Vec2;

/// A 2D feature position plus a `stale` flag.
///
/// `stale == true` means the track is lost: the tracker copies the point
/// through unchanged and never refines it again. The slot stays in the
/// buffer so the detector can re-seed it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    pub stale: bool,
}

impl KeyPoint {
    /// A fresh, non-stale keypoint.
    pub const fn new(x: f32, y: f32) -> Self {
        KeyPoint { x, y, stale: false }
    }

    /// A keypoint already marked as lost.
    pub const fn stale(x: f32, y: f32) -> Self {
        KeyPoint { x, y, stale: true }
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Number of keypoints in `keypoints` that are still being tracked.
pub fn count_live(keypoints: &[KeyPoint]) -> usize {
    keypoints.iter().filter(|kp| !kp.stale).count()
}
