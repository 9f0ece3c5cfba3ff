// pyrlk: Pyramidal Lucas-Kanade feature tracking for an embedded VIO frontend
//
// Fixed-budget CPU implementation: five pyramid levels, 7x7 patches and at
// most 74 tracked features. The core modules (linalg, image, pyramid, patch,
// gradient, klt) never allocate; every buffer is caller-owned or a
// fixed-size array. `frontend` and `evaluation` are the sequence harness on
// top and may allocate.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod frontend;
pub mod gradient;
pub mod image;
pub mod keypoint;
pub mod klt;
pub mod linalg;
pub mod patch;
pub mod pyramid;

/// Levels in every image pyramid and patch pyramid.
pub const PYRAMID_LEVELS: usize = 5;
/// Side of the tracked patch, without border.
pub const PATCH_SIZE: usize = 7;
/// Side of the stored patch: one extra pixel on each side for gradients.
pub const PATCH_SIZE_WITH_BORDER: usize = PATCH_SIZE + 2;
/// Pixels in the unbordered patch.
pub const PATCH_AREA: usize = PATCH_SIZE * PATCH_SIZE;
/// Feature capacity of a patch pyramid.
pub const MAX_PATCHES: usize = 74;

pub use config::{FrontendConfig, TrackerConfig};
pub use error::TrackingError;
pub use frontend::{Detector, FrameStats, Frontend};
pub use image::{ImageView, ImageViewMut};
pub use keypoint::KeyPoint;
pub use klt::{KltTracker, TrackReport, TrackStatus};
pub use patch::{Patch, PatchPyramid};
pub use pyramid::ImagePyramid;
