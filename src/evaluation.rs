// evaluation.rs -- Scoring tracked keypoints against reference tracks.
//
// Reference data is plain text, two lines per frame pair:
//
//   x0,y0,x1,y1,...      start points in the first frame
//   x0,y0,x1,y1,...      where a reference tracker put them in the second
//
// A tracked keypoint matches when its rounded position equals the reference
// end point exactly. Mismatches contribute their squared pixel distance to
// the running RMSE figures.

use std::fs;
use std::path::Path;

use log::info;

use crate::error::TrackingError;
use crate::keypoint::KeyPoint;

/// Parse one comma-separated line of integer coordinates into (x, y) pairs.
///
/// Whitespace around tokens and empty tokens are ignored.
pub fn parse_points(line: &str) -> Result<Vec<[i32; 2]>, TrackingError> {
    let mut values = Vec::new();
    for token in line.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let value = token.parse::<i32>().map_err(|e| TrackingError::ReferenceParse {
            token: token.to_string(),
            reason: e.to_string(),
        })?;
        values.push(value);
    }

    if values.len() % 2 != 0 {
        return Err(TrackingError::ReferenceParse {
            token: line.trim().to_string(),
            reason: format!("odd number of coordinates ({})", values.len()),
        });
    }

    Ok(values.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
}

/// Start and end points of one reference frame pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePair {
    pub start: Vec<[i32; 2]>,
    pub end: Vec<[i32; 2]>,
}

impl ReferencePair {
    /// Start points as fresh keypoints, ready for `PatchPyramid::construct`.
    pub fn start_keypoints(&self) -> Vec<KeyPoint> {
        self.start
            .iter()
            .map(|&[x, y]| KeyPoint::new(x as f32, y as f32))
            .collect()
    }
}

/// Parse a whole reference file: blank lines are skipped and the remaining
/// lines are consumed two at a time.
pub fn parse_reference(text: &str) -> Result<Vec<ReferencePair>, TrackingError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let mut pairs = Vec::new();

    while let Some(start_line) = lines.next() {
        let Some(end_line) = lines.next() else {
            return Err(TrackingError::ReferenceParse {
                token: start_line.trim().to_string(),
                reason: "start line without matching end line".into(),
            });
        };

        let start = parse_points(start_line)?;
        let end = parse_points(end_line)?;
        if start.len() != end.len() {
            return Err(TrackingError::ReferenceParse {
                token: end_line.trim().to_string(),
                reason: format!("{} end points for {} start points", end.len(), start.len()),
            });
        }
        pairs.push(ReferencePair { start, end });
    }

    Ok(pairs)
}

/// Read and parse a reference file.
pub fn load_reference(path: &Path) -> Result<Vec<ReferencePair>, TrackingError> {
    let text = fs::read_to_string(path)?;
    parse_reference(&text)
}

/// Running match rate and RMSE over a sequence of frame pairs.
#[derive(Debug, Clone, Default)]
pub struct TrackEvaluator {
    frames: usize,
    matched: usize,
    tracked: usize,
    reference: usize,
    squared_error: f64,
}

impl TrackEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `tracked[i]` against `reference_end[i]` and fold the result
    /// into the totals. Returns how many matched in this frame.
    ///
    /// Only the first `min(tracked.len(), reference_end.len())` entries are
    /// compared, but every reference point counts toward the track rate.
    pub fn record(&mut self, tracked: &[KeyPoint], reference_end: &[[i32; 2]]) -> usize {
        let mut matched = 0;
        for (kp, &[rx, ry]) in tracked.iter().zip(reference_end) {
            let x = kp.x.round() as i32;
            let y = kp.y.round() as i32;
            if x == rx && y == ry {
                matched += 1;
            } else {
                let dx = f64::from(x) - f64::from(rx);
                let dy = f64::from(y) - f64::from(ry);
                self.squared_error += dx * dx + dy * dy;
            }
        }

        self.matched += matched;
        self.tracked += tracked.len().min(reference_end.len());
        self.reference += reference_end.len();

        info!(
            "{}: features matching {matched}/{}",
            self.frames,
            reference_end.len()
        );
        info!(
            "{}: total track rate {:.4}, RMSE over mismatched {:.4}, total RMSE {:.4}",
            self.frames,
            self.track_rate(),
            self.rmse_mismatched(),
            self.rmse_total()
        );

        self.frames += 1;
        matched
    }

    /// Matched features over reference features, all frames so far.
    pub fn track_rate(&self) -> f64 {
        if self.reference == 0 {
            return 0.0;
        }
        self.matched as f64 / self.reference as f64
    }

    /// RMSE in pixels over the features that did not match.
    pub fn rmse_mismatched(&self) -> f64 {
        let mismatched = self.tracked - self.matched;
        if mismatched == 0 {
            return 0.0;
        }
        (self.squared_error / mismatched as f64).sqrt()
    }

    /// RMSE in pixels over every compared feature.
    pub fn rmse_total(&self) -> f64 {
        if self.tracked == 0 {
            return 0.0;
        }
        (self.squared_error / self.tracked as f64).sqrt()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn matched(&self) -> usize {
        self.matched
    }
}
