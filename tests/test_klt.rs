// tests/test_klt.rs -- Integration tests for the pyramidal LK tracker.
//
// Frames are rendered from a sum of plane waves: two long ones that keep
// the coarse pyramid levels textured, two short ones that give every 7x7
// window gradients in more than one direction. Shifting the render by
// whole pixels yields exact translations, so tracked features must land
// exactly on the shifted position.

use std::f32::consts::PI;

use pyrlk::image::ImageView;
use pyrlk::klt::{KltTracker, TrackReport, TrackStatus};
use pyrlk::pyramid::{required_buffer_len, ImagePyramid};
use pyrlk::{KeyPoint, PatchPyramid, TrackerConfig, TrackingError, MAX_PATCHES};

const W: usize = 320;
const H: usize = 240;

/// (amplitude, period along x, period along y); y waves run against x.
const WAVES: [(f32, f32, f32); 4] = [
    (40.0, 130.0, 410.0),
    (40.0, -370.0, 110.0),
    (30.0, 29.0, 71.0),
    (30.0, -67.0, 31.0),
];

fn intensity(x: f32, y: f32) -> f32 {
    WAVES
        .iter()
        .fold(128.0, |v, &(amp, px, py)| v + amp * (2.0 * PI * (x / px + y / py)).sin())
}

/// Render the scene with its content moved by (dx, dy).
fn render(dx: i32, dy: i32) -> Vec<u8> {
    let mut data = vec![0u8; W * H];
    for y in 0..H {
        for x in 0..W {
            let v = intensity((x as i32 - dx) as f32, (y as i32 - dy) as f32);
            data[y * W + x] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    data
}

/// Keypoints on a 16-pixel grid, `margin` pixels away from every edge.
fn grid_points(margin: usize, limit: usize) -> Vec<KeyPoint> {
    let mut points = Vec::new();
    for y in (margin..H - margin).step_by(16) {
        for x in (margin..W - margin).step_by(16) {
            points.push(KeyPoint::new(x as f32, y as f32));
        }
    }
    points.truncate(limit);
    points
}

fn track_pair(
    tracker: &KltTracker,
    first: &[u8],
    second: &[u8],
    keypoints: &[KeyPoint],
) -> (Vec<KeyPoint>, TrackReport) {
    let mut copy0 = vec![0u8; W * H];
    let mut buf0 = vec![0u8; required_buffer_len(W, H)];
    let pyr0 =
        ImagePyramid::from_copy(ImageView::new(first, W, H).unwrap(), &mut copy0, &mut buf0)
            .unwrap();

    let mut patches = Box::new(PatchPyramid::new());
    patches.construct(&pyr0, keypoints);

    let mut copy1 = vec![0u8; W * H];
    let mut buf1 = vec![0u8; required_buffer_len(W, H)];
    let pyr1 =
        ImagePyramid::from_copy(ImageView::new(second, W, H).unwrap(), &mut copy1, &mut buf1)
            .unwrap();

    let mut out = vec![KeyPoint::default(); keypoints.len()];
    let report = tracker.track(&patches, &pyr1, keypoints, &mut out).unwrap();
    (out, report)
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ===== Motion recovery =====

#[test]
fn zero_motion_returns_rounded_input() {
    init_logger();
    let frame = render(0, 0);
    let keypoints: Vec<KeyPoint> = grid_points(48, 12)
        .into_iter()
        .map(|kp| KeyPoint::new(kp.x + 0.3, kp.y - 0.4))
        .collect();

    let (out, report) = track_pair(&KltTracker::default(), &frame, &frame, &keypoints);

    assert_eq!(report.tracked, keypoints.len());
    for (kp, tracked) in keypoints.iter().zip(&out) {
        assert!(!tracked.stale, "zero motion lost {kp:?}");
        assert_eq!((tracked.x, tracked.y), (kp.x.round(), kp.y.round()));
    }
}

#[test]
fn integer_translation_is_recovered_exactly() {
    init_logger();
    let (sx, sy) = (3, -2);
    let first = render(0, 0);
    let second = render(sx, sy);
    let keypoints = grid_points(48, 24);

    let (out, report) = track_pair(&KltTracker::default(), &first, &second, &keypoints);

    assert_eq!(report.tracked, keypoints.len(), "{report:?}");
    assert!(report.iterations > 0);
    for (kp, tracked) in keypoints.iter().zip(&out) {
        assert!(!tracked.stale, "{kp:?} went stale");
        assert_eq!(
            (tracked.x, tracked.y),
            (kp.x + sx as f32, kp.y + sy as f32),
            "feature starting at {kp:?}"
        );
    }
}

#[test]
fn single_level_tracks_small_motion() {
    // Without the coarse levels a 1-pixel shift is still inside the basin.
    let config = TrackerConfig {
        pyramid_levels: 1,
        ..TrackerConfig::default()
    };
    let tracker = KltTracker::new(config).unwrap();
    let keypoints = grid_points(48, 8);
    let (out, _) = track_pair(&tracker, &render(0, 0), &render(1, 0), &keypoints);

    for (kp, tracked) in keypoints.iter().zip(&out) {
        assert!(!tracked.stale);
        assert_eq!((tracked.x, tracked.y), (kp.x + 1.0, kp.y));
    }
}

// ===== Lost features =====

#[test]
fn stale_inputs_are_copied_through() {
    let frame = render(0, 0);
    let mut keypoints = grid_points(48, 6);
    keypoints[1] = KeyPoint::stale(17.5, 99.25);
    keypoints[4] = KeyPoint::stale(-3.0, 500.0);

    let (out, report) = track_pair(&KltTracker::default(), &frame, &frame, &keypoints);

    assert_eq!(out[1], keypoints[1]);
    assert_eq!(out[4], keypoints[4]);
    assert_eq!(report.already_stale, 2);
    assert_eq!(report.tracked, keypoints.len() - 2);
}

#[test]
fn reported_positions_never_leave_the_frame() {
    // Features hugging the right and bottom edges, content moving outward.
    let first = render(0, 0);
    let second = render(6, 5);
    let mut keypoints = Vec::new();
    for i in 0..10 {
        keypoints.push(KeyPoint::new((W - 1 - i) as f32, 40.0 + 16.0 * i as f32));
        keypoints.push(KeyPoint::new(30.0 + 25.0 * i as f32, (H - 1 - i) as f32));
    }

    let (out, report) = track_pair(&KltTracker::default(), &first, &second, &keypoints);

    for (kp, tracked) in keypoints.iter().zip(&out) {
        if tracked.stale {
            assert_eq!((tracked.x, tracked.y), (kp.x, kp.y), "stale keeps input position");
        } else {
            assert!(tracked.x >= 0.0 && tracked.x <= (W - 1) as f32, "{tracked:?}");
            assert!(tracked.y >= 0.0 && tracked.y <= (H - 1) as f32, "{tracked:?}");
        }
    }
    assert_eq!(
        report.tracked + report.out_of_bounds + report.singular,
        keypoints.len()
    );
}

#[test]
fn flat_frame_marks_features_singular() {
    let flat = vec![120u8; W * H];
    let keypoints = [KeyPoint::new(100.0, 100.0), KeyPoint::new(200.5, 50.5)];
    let tracker = KltTracker::default();

    let mut copy = vec![0u8; W * H];
    let mut buf = vec![0u8; required_buffer_len(W, H)];
    let pyr = ImagePyramid::from_copy(ImageView::new(&flat, W, H).unwrap(), &mut copy, &mut buf)
        .unwrap();
    let mut patches = Box::new(PatchPyramid::new());
    patches.construct(&pyr, &keypoints);

    let result = tracker.track_feature(patches.feature(1), &pyr, &keypoints[1]);
    assert!(matches!(result.status, TrackStatus::Singular { .. }));
    assert!(result.keypoint.stale);
    assert_eq!((result.keypoint.x, result.keypoint.y), (200.5, 50.5));
}

// ===== Contract errors =====

#[test]
fn too_many_features_is_an_error() {
    let frame = render(0, 0);
    let mut copy = vec![0u8; W * H];
    let mut buf = vec![0u8; required_buffer_len(W, H)];
    let pyr = ImagePyramid::from_copy(ImageView::new(&frame, W, H).unwrap(), &mut copy, &mut buf)
        .unwrap();
    let patches = Box::new(PatchPyramid::new());

    let previous = vec![KeyPoint::new(50.0, 50.0); MAX_PATCHES + 3];
    let mut out = vec![KeyPoint::default(); MAX_PATCHES + 3];
    let err = KltTracker::default()
        .track(&patches, &pyr, &previous, &mut out)
        .unwrap_err();
    assert!(matches!(err, TrackingError::TooManyFeatures { .. }), "{err}");
}
