// pyramid.rs -- Five-level image pyramid over caller-owned storage.
//
// Construction, for levels 1..PYRAMID_LEVELS:
//   1. Downsample 2x from the level directly above (2x2 floor average)
//   2. Once every level exists, blur each one in place, level 0 included
//
// Level 0 *is* the caller's frame: no copy is made and the blur writes into
// it. Callers must treat the source buffer as consumed by `ImagePyramid::new`,
// or use `ImagePyramid::from_copy` when the original frame has to survive.
//
// Memory: levels 1.. are consecutive slices of one caller buffer of
// `required_buffer_len(w, h)` bytes. Nothing is allocated here, and the blur
// runs with a handful of scalars instead of row buffers.

use log::trace;

use crate::error::TrackingError;
use crate::image::{ImageView, ImageViewMut};
use crate::PYRAMID_LEVELS;

/// Smallest side length that still leaves every level at least 1 pixel wide.
pub const MIN_IMAGE_SIDE: usize = 1 << (PYRAMID_LEVELS - 1);

/// An image pyramid whose levels borrow the source frame and a level buffer.
///
/// `level(0)` is full resolution; `level(n)` is `(w >> n) x (h >> n)`.
/// Read-only once built.
pub struct ImagePyramid<'a> {
    levels: [ImageView<'a>; PYRAMID_LEVELS],
}

impl<'a> ImagePyramid<'a> {
    /// Build the pyramid. Downsamples into `buffer`, then blurs all levels.
    ///
    /// The source frame is blurred in place as level 0.
    pub fn new(source: ImageViewMut<'a>, buffer: &'a mut [u8]) -> Result<Self, TrackingError> {
        let (width, height) = (source.width(), source.height());
        if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
            return Err(TrackingError::ImageTooSmall {
                width,
                height,
                min_side: MIN_IMAGE_SIDE,
            });
        }
        let required = required_buffer_len(width, height);
        if buffer.len() < required {
            return Err(TrackingError::PyramidBufferTooSmall {
                required,
                provided: buffer.len(),
            });
        }

        let mut levels: [ImageViewMut<'a>; PYRAMID_LEVELS] =
            std::array::from_fn(|_| ImageViewMut::empty());
        levels[0] = source;

        let mut rest = buffer;
        for i in 1..PYRAMID_LEVELS {
            let w = levels[i - 1].width() / 2;
            let h = levels[i - 1].height() / 2;
            let (slot, tail) = std::mem::take(&mut rest).split_at_mut(w * h);
            rest = tail;

            let mut level = ImageViewMut::new(slot, w, h)?;
            downsample(&levels[i - 1].as_view(), &mut level);
            levels[i] = level;
        }

        for level in levels.iter_mut() {
            blur_in_place(level);
        }

        trace!(
            "built {PYRAMID_LEVELS}-level pyramid for {width}x{height}, coarsest {}x{}",
            levels[PYRAMID_LEVELS - 1].width(),
            levels[PYRAMID_LEVELS - 1].height()
        );

        Ok(ImagePyramid {
            levels: levels.map(ImageViewMut::into_view),
        })
    }

    /// Build the pyramid from a copy of `source`, leaving it untouched.
    ///
    /// `copy` receives the frame and becomes level 0; it must hold exactly
    /// `width * height` bytes.
    pub fn from_copy(
        source: ImageView<'_>,
        copy: &'a mut [u8],
        buffer: &'a mut [u8],
    ) -> Result<Self, TrackingError> {
        let mut level0 = ImageViewMut::new(copy, source.width(), source.height())?;
        level0.as_mut_slice().copy_from_slice(source.as_slice());
        Self::new(level0, buffer)
    }

    /// Number of pyramid levels (always `PYRAMID_LEVELS`).
    pub fn num_levels(&self) -> usize {
        PYRAMID_LEVELS
    }

    /// Level `level`, 0 being full resolution.
    ///
    /// # Panics
    /// Panics if `level >= PYRAMID_LEVELS`.
    #[inline]
    pub fn level(&self, level: usize) -> ImageView<'a> {
        self.levels[level]
    }

    pub fn levels(&self) -> &[ImageView<'a>; PYRAMID_LEVELS] {
        &self.levels
    }
}

/// Bytes needed to hold levels `1..PYRAMID_LEVELS` of a `width x height` frame.
pub const fn required_buffer_len(width: usize, height: usize) -> usize {
    let mut total = 0;
    let mut level = 1;
    while level < PYRAMID_LEVELS {
        total += (width >> level) * (height >> level);
        level += 1;
    }
    total
}

#[inline(always)]
fn smooth3(a: u8, b: u8, c: u8) -> u8 {
    // 1/4, 1/2, 1/4 as right shifts; at most 63 + 127 + 63, no overflow.
    (a >> 2) + (b >> 1) + (c >> 2)
}

/// Blur a frame in place with the separable kernel
///
/// ```text
/// [1/4]                     [1/16 1/8 1/16]
/// [1/2] * [1/4 1/2 1/4]  =  [ 1/8 1/4  1/8]
/// [1/4]                     [1/16 1/8 1/16]
/// ```
///
/// Each weight is a right shift applied to the term before summing, so the
/// result truncates exactly like the fixed-point firmware. Only interior
/// pixels change; the 1-pixel border is left as is.
pub fn blur_in_place(image: &mut ImageViewMut<'_>) {
    let (w, h) = (image.width(), image.height());
    if w < 3 || h < 3 {
        return;
    }
    let data = image.as_mut_slice();

    // Horizontal pass over interior rows. `left` carries the unmodified
    // value of the previous column.
    for y in 1..h - 1 {
        let row = &mut data[y * w..(y + 1) * w];
        let mut left = row[0];
        for x in 1..w - 1 {
            let centre = row[x];
            row[x] = smooth3(left, centre, row[x + 1]);
            left = centre;
        }
    }

    // Vertical pass. Border rows were not written above, so their
    // horizontal response is recomputed on the fly.
    let last = (h - 1) * w;
    for x in 1..w - 1 {
        let mut above = smooth3(data[x - 1], data[x], data[x + 1]);
        for y in 1..h - 1 {
            let i = y * w + x;
            let centre = data[i];
            let below = if y == h - 2 {
                smooth3(data[last + x - 1], data[last + x], data[last + x + 1])
            } else {
                data[i + w]
            };
            data[i] = smooth3(above, centre, below);
            above = centre;
        }
    }
}

/// Downsample 2x: each output pixel is the floor average of a 2x2 block.
///
/// An odd last row or column of `source` is dropped.
///
/// # Panics
/// Panics if `destination` is not `(w / 2) x (h / 2)`.
pub fn downsample(source: &ImageView<'_>, destination: &mut ImageViewMut<'_>) {
    let (sw, sh) = (source.width(), source.height());
    assert!(
        destination.width() == sw / 2 && destination.height() == sh / 2,
        "downsample destination is {}x{}, expected {}x{}",
        destination.width(),
        destination.height(),
        sw / 2,
        sh / 2,
    );

    let src = source.as_slice();
    let dw = destination.width();
    for y in 0..destination.height() {
        let top = &src[2 * y * sw..2 * y * sw + sw];
        let bottom = &src[(2 * y + 1) * sw..(2 * y + 1) * sw + sw];
        let out = destination.row_mut(y);
        for x in 0..dw {
            let sum = top[2 * x] as u32
                + top[2 * x + 1] as u32
                + bottom[2 * x] as u32
                + bottom[2 * x + 1] as u32;
            out[x] = (sum / 4) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downsampled(src: &[u8], w: usize, h: usize) -> Vec<u8> {
        let view = ImageView::new(src, w, h).unwrap();
        let mut out = vec![0u8; (w / 2) * (h / 2)];
        let mut dst = ImageViewMut::new(&mut out, w / 2, h / 2).unwrap();
        downsample(&view, &mut dst);
        out
    }

    #[test]
    fn test_required_buffer_len() {
        // 64x32 -> 32x16 + 16x8 + 8x4 + 4x2
        assert_eq!(required_buffer_len(64, 32), 512 + 128 + 32 + 8);
        // Odd sizes truncate at each level.
        assert_eq!(required_buffer_len(33, 17), 16 * 8 + 8 * 4 + 4 * 2 + 2 * 1);
    }

    #[test]
    fn test_downsample_block_constant_exact() {
        // 4x4 made of four constant 2x2 blocks.
        #[rustfmt::skip]
        let src = [
            10, 10, 200, 200,
            10, 10, 200, 200,
            77, 77,  3,   3,
            77, 77,  3,   3,
        ];
        assert_eq!(downsampled(&src, 4, 4), vec![10, 200, 77, 3]);
    }

    #[test]
    fn test_downsample_floors_average() {
        // (1 + 2 + 2 + 2) / 4 = 1.75 -> 1
        let src = [1, 2, 2, 2];
        assert_eq!(downsampled(&src, 2, 2), vec![1]);
    }

    #[test]
    fn test_downsample_odd_dimensions_drop_last() {
        // 5x3 -> 2x1; column 4 and row 2 are ignored.
        #[rustfmt::skip]
        let src = [
            4, 4, 8, 8, 255,
            4, 4, 8, 8, 255,
            255, 255, 255, 255, 255,
        ];
        assert_eq!(downsampled(&src, 5, 3), vec![4, 8]);
    }

    #[test]
    #[should_panic(expected = "downsample destination")]
    fn test_downsample_wrong_destination_panics() {
        let src = [0u8; 16];
        let view = ImageView::new(&src, 4, 4).unwrap();
        let mut out = [0u8; 9];
        let mut dst = ImageViewMut::new(&mut out, 3, 3).unwrap();
        downsample(&view, &mut dst);
    }

    #[test]
    fn test_blur_constant_multiple_of_four_is_fixed_point() {
        // 200 >> 2 = 50, 200 >> 1 = 100: sums back to exactly 200.
        let mut data = vec![200u8; 6 * 5];
        let mut img = ImageViewMut::new(&mut data, 6, 5).unwrap();
        blur_in_place(&mut img);
        assert!(data.iter().all(|&v| v == 200));
    }

    #[test]
    fn test_blur_truncates_per_term() {
        // 255: (63 + 127 + 63) = 253 horizontally, then (63 + 126 + 63) = 252.
        let mut data = vec![255u8; 3 * 3];
        let mut img = ImageViewMut::new(&mut data, 3, 3).unwrap();
        blur_in_place(&mut img);
        assert_eq!(data[4], 252);
        assert_eq!(data[0], 255);
    }

    #[test]
    fn test_blur_impulse_response() {
        // 128 at the centre of a 5x5 frame.
        let mut data = vec![0u8; 25];
        data[2 * 5 + 2] = 128;
        let mut img = ImageViewMut::new(&mut data, 5, 5).unwrap();
        blur_in_place(&mut img);

        #[rustfmt::skip]
        let expected = [
            0, 0,  0,  0, 0,
            0, 8, 16,  8, 0,
            0, 16, 32, 16, 0,
            0, 8, 16,  8, 0,
            0, 0,  0,  0, 0,
        ];
        assert_eq!(data, expected);
    }

    #[test]
    fn test_blur_leaves_border_untouched() {
        let w = 8;
        let h = 6;
        let mut data: Vec<u8> = (0..w * h).map(|i| ((i * 37) % 251) as u8).collect();
        let original = data.clone();
        let mut img = ImageViewMut::new(&mut data, w, h).unwrap();
        blur_in_place(&mut img);

        for x in 0..w {
            assert_eq!(data[x], original[x], "top border changed at x={x}");
            assert_eq!(data[(h - 1) * w + x], original[(h - 1) * w + x]);
        }
        for y in 0..h {
            assert_eq!(data[y * w], original[y * w], "left border changed at y={y}");
            assert_eq!(data[y * w + w - 1], original[y * w + w - 1]);
        }
    }

    #[test]
    fn test_blur_too_small_is_noop() {
        let mut data = vec![9u8, 200, 3, 77];
        let mut img = ImageViewMut::new(&mut data, 2, 2).unwrap();
        blur_in_place(&mut img);
        assert_eq!(data, vec![9, 200, 3, 77]);
    }

    #[test]
    fn test_pyramid_level_dimensions() {
        let (w, h) = (752, 480);
        let mut frame = vec![0u8; w * h];
        let mut buffer = vec![0u8; required_buffer_len(w, h)];
        let pyr = ImagePyramid::new(ImageViewMut::new(&mut frame, w, h).unwrap(), &mut buffer)
            .unwrap();

        assert_eq!(pyr.num_levels(), 5);
        let dims: Vec<_> = pyr.levels().iter().map(|l| (l.width(), l.height())).collect();
        assert_eq!(dims, vec![(752, 480), (376, 240), (188, 120), (94, 60), (47, 30)]);
    }

    #[test]
    fn test_pyramid_constant_frame_stays_constant() {
        let (w, h) = (64, 48);
        let mut frame = vec![120u8; w * h];
        let mut buffer = vec![0u8; required_buffer_len(w, h)];
        let pyr = ImagePyramid::new(ImageViewMut::new(&mut frame, w, h).unwrap(), &mut buffer)
            .unwrap();
        for (lvl, level) in pyr.levels().iter().enumerate() {
            for (x, y, v) in level.pixels() {
                assert_eq!(v, 120, "level {lvl} pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn test_pyramid_buffer_too_small() {
        let (w, h) = (32, 32);
        let mut frame = vec![0u8; w * h];
        let mut buffer = vec![0u8; required_buffer_len(w, h) - 1];
        let err = ImagePyramid::new(ImageViewMut::new(&mut frame, w, h).unwrap(), &mut buffer)
            .err()
            .unwrap();
        assert!(matches!(err, TrackingError::PyramidBufferTooSmall { .. }), "{err}");
    }

    #[test]
    fn test_pyramid_image_too_small() {
        let mut frame = vec![0u8; 15 * 40];
        let mut buffer = vec![0u8; 1024];
        let err = ImagePyramid::new(ImageViewMut::new(&mut frame, 15, 40).unwrap(), &mut buffer)
            .err()
            .unwrap();
        assert!(matches!(err, TrackingError::ImageTooSmall { min_side: 16, .. }), "{err}");
    }
}
