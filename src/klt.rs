// klt.rs -- Pyramidal Lucas-Kanade tracker over fixed-size patches.
//
// Per feature, coarse to fine:
//
//   for level in (0..pyramid_levels).rev():
//     A  = [dx dy] of the previous patch, 49x2     (once per level)
//     S  = AᵀA                                     (structure tensor)
//     repeat:
//       sample next patch at prev.origin + flow + inherited
//       it    = next - prev                        (temporal derivative)
//       error = sum |it| over the interior
//       step  = S⁻¹ Aᵀ (-it)
//       accept step only if error dropped, else stop
//     until |step| <= threshold or max_iterations evaluations
//     inherited = 2 * (flow + inherited)
//
// The Sobel gradients are unnormalized (8x the slope), so `step` is about an
// eighth of a full Gauss-Newton step. Convergence is therefore gradual and
// the acceptance test keeps every level from overshooting.
//
// Lost features are not errors. A singular structure tensor or a final
// position outside the frame marks the output keypoint stale and keeps the
// input position.

use log::{debug, trace};

use crate::config::TrackerConfig;
use crate::error::TrackingError;
use crate::gradient;
use crate::image::ImageView;
use crate::keypoint::KeyPoint;
use crate::linalg::{multiply, Mat2, Matrix, Vec2};
use crate::patch::{Patch, PatchPyramid};
use crate::pyramid::ImagePyramid;
use crate::{MAX_PATCHES, PATCH_AREA, PATCH_SIZE, PYRAMID_LEVELS};

/// Outcome of tracking one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Refined down to level 0 and landed inside the frame.
    Tracked,
    /// The structure tensor at `level` could not be inverted.
    Singular { level: usize },
    /// Level 0 result fell outside the frame.
    OutOfBounds,
    /// The input keypoint was already stale and was passed through.
    AlreadyStale,
}

/// A feature after one tracking pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedFeature {
    /// Output keypoint. Stale unless `status == Tracked`.
    pub keypoint: KeyPoint,
    pub status: TrackStatus,
    /// Solver evaluations spent on this feature over all levels.
    pub iterations: usize,
}

/// Per-call summary of `KltTracker::track`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackReport {
    pub tracked: usize,
    pub singular: usize,
    pub out_of_bounds: usize,
    pub already_stale: usize,
    /// Total solver evaluations.
    pub iterations: usize,
}

impl TrackReport {
    /// Features that left the call stale, for whatever reason.
    pub fn lost(&self) -> usize {
        self.singular + self.out_of_bounds + self.already_stale
    }

    fn record(&mut self, feature: &TrackedFeature) {
        match feature.status {
            TrackStatus::Tracked => self.tracked += 1,
            TrackStatus::Singular { .. } => self.singular += 1,
            TrackStatus::OutOfBounds => self.out_of_bounds += 1,
            TrackStatus::AlreadyStale => self.already_stale += 1,
        }
        self.iterations += feature.iterations;
    }
}

/// Internal result of the iterative solve at one pyramid level.
enum LkResult {
    Converged { flow: Vec2, evaluations: usize },
    Stalled { flow: Vec2, evaluations: usize },
    MaxIter { flow: Vec2, evaluations: usize },
    Singular,
}

/// Pyramidal Lucas-Kanade tracker.
#[derive(Debug, Clone, Default)]
pub struct KltTracker {
    config: TrackerConfig,
}

impl KltTracker {
    /// Create a tracker, rejecting an invalid configuration.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackingError> {
        config.validate()?;
        Ok(KltTracker { config })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Track `previous` keypoints into the frame behind `next`.
    ///
    /// `patches` must have been built by `PatchPyramid::construct` from the
    /// previous frame and the same `previous` keypoints. Result `i` is
    /// written to `tracked[i]`; entries past `previous.len()` are untouched.
    ///
    /// Fails without writing anything if there are more than `MAX_PATCHES`
    /// keypoints or `tracked` is shorter than `previous`.
    pub fn track(
        &self,
        patches: &PatchPyramid,
        next: &ImagePyramid<'_>,
        previous: &[KeyPoint],
        tracked: &mut [KeyPoint],
    ) -> Result<TrackReport, TrackingError> {
        if previous.len() > MAX_PATCHES {
            return Err(TrackingError::TooManyFeatures {
                count: previous.len(),
                capacity: MAX_PATCHES,
            });
        }
        if tracked.len() < previous.len() {
            return Err(TrackingError::OutputBufferTooSmall {
                required: previous.len(),
                provided: tracked.len(),
            });
        }

        let mut report = TrackReport::default();
        for (index, (keypoint, out)) in previous.iter().zip(tracked.iter_mut()).enumerate() {
            let result = self.track_feature(patches.feature(index), next, keypoint);
            match result.status {
                TrackStatus::Singular { level } => debug!(
                    "feature {index} at ({:.1}, {:.1}): singular at level {level}",
                    keypoint.x,
                    keypoint.y
                ),
                TrackStatus::OutOfBounds => debug!(
                    "feature {index} at ({:.1}, {:.1}): tracked out of frame",
                    keypoint.x,
                    keypoint.y
                ),
                _ => {}
            }
            report.record(&result);
            *out = result.keypoint;
        }

        debug!(
            "tracked {}/{} features ({} singular, {} out of bounds, {} already stale), {} evaluations",
            report.tracked,
            previous.len(),
            report.singular,
            report.out_of_bounds,
            report.already_stale,
            report.iterations
        );
        Ok(report)
    }

    /// Track a single feature given its patches at every level.
    pub fn track_feature(
        &self,
        patches: &[Patch; PYRAMID_LEVELS],
        next: &ImagePyramid<'_>,
        keypoint: &KeyPoint,
    ) -> TrackedFeature {
        if keypoint.stale {
            return TrackedFeature {
                keypoint: *keypoint,
                status: TrackStatus::AlreadyStale,
                iterations: 0,
            };
        }

        let levels = self.config.pyramid_levels.clamp(1, PYRAMID_LEVELS);
        let mut inherited = Vec2::ZERO;
        let mut displacement = Vec2::ZERO;
        let mut iterations = 0;

        for level in (0..levels).rev() {
            let flow = match self.solve_level(&patches[level], &next.level(level), inherited) {
                LkResult::Converged { flow, evaluations } => {
                    trace!("level {level}: converged after {evaluations} evaluations");
                    iterations += evaluations;
                    flow
                }
                LkResult::Stalled { flow, evaluations } => {
                    trace!("level {level}: no improvement after {evaluations} evaluations");
                    iterations += evaluations;
                    flow
                }
                LkResult::MaxIter { flow, evaluations } => {
                    trace!("level {level}: hit the {evaluations}-evaluation cap");
                    iterations += evaluations;
                    flow
                }
                LkResult::Singular => {
                    return TrackedFeature {
                        keypoint: KeyPoint::stale(keypoint.x, keypoint.y),
                        status: TrackStatus::Singular { level },
                        iterations,
                    };
                }
            };

            displacement = flow + inherited;
            inherited = 2.0 * displacement;
        }

        let level0 = next.level(0);
        match final_position(patches[0].origin(), displacement, level0.width(), level0.height()) {
            Some(p) => TrackedFeature {
                keypoint: KeyPoint::new(p.x, p.y),
                status: TrackStatus::Tracked,
                iterations,
            },
            None => TrackedFeature {
                keypoint: KeyPoint::stale(keypoint.x, keypoint.y),
                status: TrackStatus::OutOfBounds,
                iterations,
            },
        }
    }

    /// Iterative Lucas-Kanade at a single pyramid level.
    ///
    /// `inherited` is the displacement handed down from the coarser level,
    /// already scaled to this level. Returns the additional flow found here.
    fn solve_level(&self, previous: &Patch, image: &ImageView<'_>, inherited: Vec2) -> LkResult {
        let gx = gradient::dx(previous);
        let gy = gradient::dy(previous);

        let mut a = Matrix::<PATCH_AREA, 2>::zeros();
        for (k, (ix, iy)) in gx.interior().zip(gy.interior()).enumerate() {
            a[(k, 0)] = ix;
            a[(k, 1)] = iy;
        }
        let at = a.transpose();
        let s: Mat2 = at * a;

        let det = s.determinant();
        if !det.is_finite() || det.abs() <= self.config.min_determinant {
            return LkResult::Singular;
        }
        let Some(s_inv) = s.try_inverse() else {
            return LkResult::Singular;
        };

        let origin = previous.origin();
        let mut best = f32::MAX;
        let mut flow = Vec2::ZERO;
        let mut b = Matrix::<PATCH_AREA, 1>::zeros();
        let mut atb = Matrix::<2, 1>::zeros();
        let mut evaluations = 0;

        loop {
            let total = flow + inherited;
            let next = Patch::sample(origin.x + total.x, origin.y + total.y, image);
            let it = gradient::dt(previous, &next);

            let mut error = 0.0f32;
            for (k, v) in it.interior().enumerate() {
                error += v.abs();
                b[(k, 0)] = -v;
            }
            evaluations += 1;

            multiply(&at, &b, &mut atb);
            let step = Vec2::from(s_inv * atb);

            if error < best {
                best = error;
                flow += step;
            } else {
                return LkResult::Stalled { flow, evaluations };
            }

            if step.norm() <= self.config.convergence_threshold {
                return LkResult::Converged { flow, evaluations };
            }
            if evaluations >= self.config.max_iterations {
                return LkResult::MaxIter { flow, evaluations };
            }
        }
    }
}

/// Level-0 keypoint for a patch at `origin` moved by `displacement`.
///
/// The keypoint is the patch centre rounded to whole pixels. `None` when it
/// lands outside `[0, width-1] x [0, height-1]` or is not finite.
fn final_position(origin: Vec2, displacement: Vec2, width: usize, height: usize) -> Option<Vec2> {
    let half = (PATCH_SIZE / 2) as f32;
    let x = (origin.x + half + displacement.x).round();
    let y = (origin.y + half + displacement.y).round();

    let inside = x >= 0.0 && y >= 0.0 && x <= (width - 1) as f32 && y <= (height - 1) as f32;
    inside.then_some(Vec2::new(x, y))
}
