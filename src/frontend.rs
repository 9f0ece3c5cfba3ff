// frontend.rs -- Frame-by-frame tracking driver.
//
// Ties the pieces into the loop a VIO backend calls once per camera frame:
//
//   1. Copy the frame into the owned frame buffer
//   2. Build the image pyramid (blurs the copy in place)
//   3. If features exist, track them with last frame's patch pyramid
//   4. Tracked positions become the source keypoints for the next frame
//   5. Too few live tracks left: re-detect on the blurred level 0
//   6. Rebuild the patch pyramid from this frame for the next call
//
// All storage is allocated once in `Frontend::new`. `process` itself does
// not allocate.

use log::{debug, warn};

use crate::config::FrontendConfig;
use crate::error::TrackingError;
use crate::image::{ImageView, ImageViewMut};
use crate::keypoint::{count_live, KeyPoint};
use crate::klt::KltTracker;
use crate::patch::PatchPyramid;
use crate::pyramid::{required_buffer_len, ImagePyramid, MIN_IMAGE_SIDE};
use crate::MAX_PATCHES;

/// Source of fresh keypoints. Corner detection itself lives outside this
/// crate; anything that can fill a keypoint slice plugs in here.
pub trait Detector {
    /// Detect keypoints in `image`, writing at most `keypoints.len()` of
    /// them. Returns how many were found, which may exceed the slice length
    /// when the detector had more to offer.
    fn detect(&mut self, image: ImageView<'_>, keypoints: &mut [KeyPoint]) -> usize;
}

/// Statistics returned after processing each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Zero-based index of the processed frame.
    pub frame_index: u64,
    /// Features successfully tracked from the previous frame.
    pub tracked: usize,
    /// Features that went stale during tracking this frame.
    pub lost: usize,
    /// Keypoints taken from the detector (0 if no re-detection ran).
    pub detected: usize,
    /// Live keypoints after this frame.
    pub live: usize,
    /// Solver evaluations spent this frame.
    pub iterations: usize,
}

/// The tracking frontend: manages the track / re-detect loop.
pub struct Frontend<D: Detector> {
    config: FrontendConfig,
    tracker: KltTracker,
    detector: D,
    width: usize,
    height: usize,
    frame: Vec<u8>,
    pyramid_buffer: Vec<u8>,
    patches: Box<PatchPyramid>,
    /// Source keypoints for the next `track` call.
    keypoints: [KeyPoint; MAX_PATCHES],
    /// Tracker output, copied back into `keypoints` after every frame.
    tracked: [KeyPoint; MAX_PATCHES],
    len: usize,
    frame_index: u64,
}

impl<D: Detector> Frontend<D> {
    /// Create a frontend for `width x height` frames.
    pub fn new(
        config: FrontendConfig,
        detector: D,
        width: usize,
        height: usize,
    ) -> Result<Self, TrackingError> {
        config.validate()?;
        if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
            return Err(TrackingError::ImageTooSmall {
                width,
                height,
                min_side: MIN_IMAGE_SIDE,
            });
        }

        Ok(Frontend {
            tracker: KltTracker::new(config.tracker)?,
            config,
            detector,
            width,
            height,
            frame: vec![0; width * height],
            pyramid_buffer: vec![0; required_buffer_len(width, height)],
            patches: Box::new(PatchPyramid::new()),
            keypoints: [KeyPoint::default(); MAX_PATCHES],
            tracked: [KeyPoint::default(); MAX_PATCHES],
            len: 0,
            frame_index: 0,
        })
    }

    /// Process one frame of `width * height` bytes.
    pub fn process(&mut self, frame: &[u8]) -> Result<FrameStats, TrackingError> {
        let expected = self.width * self.height;
        if frame.len() != expected {
            return Err(TrackingError::FrameSizeMismatch {
                expected,
                actual: frame.len(),
            });
        }

        self.frame.copy_from_slice(frame);
        let source = ImageViewMut::new(&mut self.frame, self.width, self.height)?;
        let pyramid = ImagePyramid::new(source, &mut self.pyramid_buffer)?;

        let mut stats = FrameStats {
            frame_index: self.frame_index,
            ..FrameStats::default()
        };

        let n = self.len;
        if n > 0 {
            let report =
                self.tracker
                    .track(&self.patches, &pyramid, &self.keypoints[..n], &mut self.tracked[..n])?;
            self.keypoints[..n].copy_from_slice(&self.tracked[..n]);
            stats.tracked = report.tracked;
            stats.lost = report.singular + report.out_of_bounds;
            stats.iterations = report.iterations;
        }

        let live = count_live(&self.keypoints[..self.len]);
        if self.len == 0 || live < self.config.min_live_features {
            let found = self.detector.detect(pyramid.level(0), &mut self.keypoints);
            let mut count = found.min(MAX_PATCHES);
            if count > self.config.max_features {
                warn!(
                    "frame {}: detector returned {found} keypoints, keeping the first {}",
                    self.frame_index, self.config.max_features
                );
                count = self.config.max_features;
            }
            debug!(
                "frame {}: {live} live tracks, re-detected {count} keypoints",
                self.frame_index
            );
            self.len = count;
            stats.detected = count;
        }

        self.patches.construct(&pyramid, &self.keypoints[..self.len]);

        stats.live = count_live(&self.keypoints[..self.len]);
        debug!(
            "frame {}: tracked {}, lost {}, detected {}, live {}",
            stats.frame_index, stats.tracked, stats.lost, stats.detected, stats.live
        );

        self.frame_index += 1;
        Ok(stats)
    }

    /// Current keypoints, stale ones included.
    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints[..self.len]
    }

    /// Number of frames processed so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Forget all keypoints; the next frame re-detects.
    pub fn reset(&mut self) {
        self.len = 0;
    }
}
