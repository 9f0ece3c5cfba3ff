// image.rs -- Non-owning views over 8-bit grayscale frames.
//
// The tracker never owns pixel storage. Frames arrive in caller buffers
// (DMA targets, statically placed arrays) and every structure built on top
// of them borrows:
//
//   ImageView<'a>      &'a [u8] + width + height, read-only, Copy
//   ImageViewMut<'a>   &'a mut [u8] + width + height, for in-place blur
//                      and for writing downsampled pyramid levels
//
// Layout is row-major with no stride padding: pixel (x, y) lives at
// `y * width + x`. The lifetime `'a` ties every pyramid level and patch
// source to the buffer it reads, so a frame cannot be reused for the next
// capture while a pyramid still points into it.

use std::fmt;

use crate::error::TrackingError;

fn check_len(len: usize, width: usize, height: usize) -> Result<(), TrackingError> {
    let expected = width * height;
    if len != expected {
        return Err(TrackingError::ImageBufferMismatch {
            width,
            height,
            expected,
            actual: len,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ImageView<'a>
// ---------------------------------------------------------------------------

/// A borrowed, read-only 8-bit grayscale image.
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> ImageView<'a> {
    /// Wrap `data` as a `width x height` image.
    ///
    /// Fails if `data.len() != width * height`.
    pub fn new(data: &'a [u8], width: usize, height: usize) -> Result<Self, TrackingError> {
        check_len(data.len(), width, height)?;
        Ok(ImageView { data, width, height })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at column `x`, row `y`.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    /// Borrow row `y`.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// The whole pixel buffer.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// True when either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Iterate over all pixels as `(x, y, value)`.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, u8)> + 'a {
        let (data, width) = (self.data, self.width);
        (0..self.height).flat_map(move |y| (0..width).map(move |x| (x, y, data[y * width + x])))
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}x{}",
            self.width,
            self.height,
        );
    }
}

impl<'a> std::ops::Index<(usize, usize)> for ImageView<'a> {
    type Output = u8;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &u8 {
        self.bounds_check(x, y);
        &self.data[y * self.width + x]
    }
}

impl<'a> fmt::Debug for ImageView<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ImageView {{ {}x{} }}", self.width, self.height)?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: {:?}", &self.row(y)[..self.width.min(16)])?;
            if self.width > 16 {
                write!(f, " ...")?;
            }
            writeln!(f)?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ImageViewMut<'a>
// ---------------------------------------------------------------------------

/// A borrowed, writable 8-bit grayscale image.
pub struct ImageViewMut<'a> {
    data: &'a mut [u8],
    width: usize,
    height: usize,
}

impl<'a> ImageViewMut<'a> {
    /// Wrap `data` as a writable `width x height` image.
    ///
    /// Fails if `data.len() != width * height`.
    pub fn new(data: &'a mut [u8], width: usize, height: usize) -> Result<Self, TrackingError> {
        check_len(data.len(), width, height)?;
        Ok(ImageViewMut { data, width, height })
    }

    /// A 0x0 image over an empty slice. Placeholder for not-yet-built levels.
    pub fn empty() -> Self {
        ImageViewMut {
            data: Default::default(),
            width: 0,
            height: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.bounds_check(x, y);
        self.data[y * self.width + x] = value;
    }

    /// Mutable borrow of row `y`.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &mut self.data[start..start + self.width]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    /// Reborrow as a read-only view for the duration of `&self`.
    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            data: &*self.data,
            width: self.width,
            height: self.height,
        }
    }

    /// Give up write access for the full lifetime `'a`.
    pub fn into_view(self) -> ImageView<'a> {
        ImageView {
            data: self.data,
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}x{}",
            self.width,
            self.height,
        );
    }
}

impl<'a> std::ops::Index<(usize, usize)> for ImageViewMut<'a> {
    type Output = u8;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &u8 {
        self.bounds_check(x, y);
        &self.data[y * self.width + x]
    }
}

impl<'a> std::ops::IndexMut<(usize, usize)> for ImageViewMut<'a> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut u8 {
        self.bounds_check(x, y);
        &mut self.data[y * self.width + x]
    }
}

impl<'a> fmt::Debug for ImageViewMut<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.as_view(), f)
    }
}
