// patch.rs -- Sub-pixel patches and the per-feature patch pyramid.
//
// A patch is the 7x7 window the tracker compares between frames, stored
// with a 1-pixel border so the Sobel gradients can be taken over the whole
// 7x7 interior without shrinking it:
//
//   bordered grid, 9x9          interior, 7x7
//   +---------------------+
//   | b b b b b b b b b   |     rows/cols 1..=7
//   | b . . . . . . . b   |
//   | b . . . . . . . b   |     `row(i)` returns interior row i
//   |   ...               |
//   | b b b b b b b b b   |
//   +---------------------+
//
// Sampling reads the image at a real-valued origin. Bordered cell (i, j) is
// the bilinear blend of the four pixels at
// (floor(x) - 1 + i, floor(y) - 1 + j) and their right/down neighbours.
// Reads past the image edge are clamped to the nearest edge pixel.

use log::error;

use crate::error::TrackingError;
use crate::image::ImageView;
use crate::keypoint::KeyPoint;
use crate::linalg::Vec2;
use crate::pyramid::ImagePyramid;
use crate::{MAX_PATCHES, PATCH_SIZE, PATCH_SIZE_WITH_BORDER, PYRAMID_LEVELS};

type Grid = [[f32; PATCH_SIZE_WITH_BORDER]; PATCH_SIZE_WITH_BORDER];

/// A bordered 9x9 grid of interpolated intensities (or derivatives of them).
#[derive(Clone, Copy, PartialEq)]
pub struct Patch {
    data: Grid,
    origin: Vec2,
}

impl Patch {
    /// All-zero patch at `origin`.
    pub const fn zeros(origin: Vec2) -> Self {
        Patch {
            data: [[0.0; PATCH_SIZE_WITH_BORDER]; PATCH_SIZE_WITH_BORDER],
            origin,
        }
    }

    /// Wrap a ready grid, indexed `[row][column]`.
    pub const fn from_grid(origin: Vec2, data: Grid) -> Self {
        Patch { data, origin }
    }

    /// Sample `image` with the patch's top-left interior pixel at (x, y).
    ///
    /// # Panics
    /// Panics if `image` is empty.
    pub fn sample(x: f32, y: f32, image: &ImageView<'_>) -> Self {
        assert!(!image.is_empty(), "cannot sample a patch from an empty image");

        let fx = x.floor();
        let fy = y.floor();
        let ax = (x - fx).abs();
        let ay = (y - fy).abs();
        // Far-off origins clamp to the edge anyway; bound them so the
        // integer offsets below cannot overflow.
        let (x0, y0) = (fx.clamp(-1e9, 1e9) as i64, fy.clamp(-1e9, 1e9) as i64);
        let max_x = image.width() as i64 - 1;
        let max_y = image.height() as i64 - 1;

        let mut data = [[0.0f32; PATCH_SIZE_WITH_BORDER]; PATCH_SIZE_WITH_BORDER];
        for (j, out) in data.iter_mut().enumerate() {
            let top = image.row((y0 - 1 + j as i64).clamp(0, max_y) as usize);
            let bottom = image.row((y0 + j as i64).clamp(0, max_y) as usize);

            for (i, cell) in out.iter_mut().enumerate() {
                let xa = (x0 - 1 + i as i64).clamp(0, max_x) as usize;
                let xb = (x0 + i as i64).clamp(0, max_x) as usize;

                *cell = (1.0 - ax) * (1.0 - ay) * top[xa] as f32
                    + ax * (1.0 - ay) * top[xb] as f32
                    + (1.0 - ax) * ay * bottom[xa] as f32
                    + ax * ay * bottom[xb] as f32;
            }
        }

        Patch {
            data,
            origin: Vec2::new(x, y),
        }
    }

    /// Position of the top-left interior pixel in level coordinates.
    #[inline]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Bordered cell at column `x`, row `y` (both in `0..9`).
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y][x]
    }

    /// Interior row `i` (in `0..7`), `PATCH_SIZE` values long.
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i + 1][1..=PATCH_SIZE]
    }

    /// The full bordered grid, `[row][column]`.
    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.data
    }

    /// Interior values in row-major order.
    pub fn interior(&self) -> impl Iterator<Item = f32> + '_ {
        (0..PATCH_SIZE).flat_map(move |i| self.row(i).iter().copied())
    }
}

impl Default for Patch {
    fn default() -> Self {
        Patch::zeros(Vec2::ZERO)
    }
}

impl std::fmt::Debug for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Patch @ ({:.2}, {:.2})", self.origin.x, self.origin.y)?;
        for row in &self.data {
            for v in row {
                write!(f, "{v:6.1} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PatchPyramid
// ---------------------------------------------------------------------------

/// Patches of up to `MAX_PATCHES` features at every pyramid level.
///
/// Built from the previous frame and read by the tracker when the next one
/// arrives. Around 120 KiB, so long-lived owners should box it.
pub struct PatchPyramid {
    patches: [[Patch; PYRAMID_LEVELS]; MAX_PATCHES],
}

impl PatchPyramid {
    pub fn new() -> Self {
        PatchPyramid {
            patches: [[Patch::zeros(Vec2::ZERO); PYRAMID_LEVELS]; MAX_PATCHES],
        }
    }

    /// Maximum number of features.
    pub const fn capacity(&self) -> usize {
        MAX_PATCHES
    }

    /// Sample patches around every non-stale keypoint at every level.
    ///
    /// The patch origin at level L is `(kp - PATCH_SIZE/2) / 2^L`, so the
    /// keypoint sits on the centre pixel. Slots of stale keypoints keep
    /// whatever they held before.
    ///
    /// # Panics
    /// More than `MAX_PATCHES` keypoints is a fatal configuration error:
    /// it is logged and then panics, before any slot is written. Use
    /// [`try_construct`](Self::try_construct) to get an error instead.
    pub fn construct(&mut self, pyramid: &ImagePyramid<'_>, keypoints: &[KeyPoint]) {
        if let Err(err) = self.try_construct(pyramid, keypoints) {
            error!("{err}");
            panic!("{err}");
        }
    }

    /// Like [`construct`](Self::construct), but reports capacity overflow as
    /// `TrackingError::CapacityExceeded` and leaves every slot untouched.
    pub fn try_construct(
        &mut self,
        pyramid: &ImagePyramid<'_>,
        keypoints: &[KeyPoint],
    ) -> Result<(), TrackingError> {
        if keypoints.len() > MAX_PATCHES {
            return Err(TrackingError::CapacityExceeded {
                count: keypoints.len(),
                capacity: MAX_PATCHES,
            });
        }

        let half = (PATCH_SIZE / 2) as f32;
        for (slot, kp) in self.patches.iter_mut().zip(keypoints) {
            if kp.stale {
                continue;
            }
            for (level, patch) in slot.iter_mut().enumerate() {
                let scale = 1.0 / (1u32 << level) as f32;
                *patch = Patch::sample(
                    (kp.x - half) * scale,
                    (kp.y - half) * scale,
                    &pyramid.level(level),
                );
            }
        }
        Ok(())
    }

    /// Patch of feature `feature` at pyramid level `level`.
    #[inline]
    pub fn patch(&self, feature: usize, level: usize) -> &Patch {
        &self.patches[feature][level]
    }

    /// All levels of feature `feature`, finest first.
    #[inline]
    pub fn feature(&self, feature: usize) -> &[Patch; PYRAMID_LEVELS] {
        &self.patches[feature]
    }
}

impl Default for PatchPyramid {
    fn default() -> Self {
        Self::new()
    }
}
