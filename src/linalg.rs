// linalg.rs -- Fixed-size linear algebra for the Lucas-Kanade solver.
//
// Only the handful of operations the tracker needs. Every matrix carries its
// shape as a pair of const generics, so multiplying a 2x49 by a 49x1 is
// checked by the compiler and a shape mismatch never reaches runtime:
//
//   Matrix<R, C>   row-major [[f32; C]; R], lives on the stack
//   Mat2           structure tensor and its inverse
//   Vec2           flow vectors and sub-pixel positions
//
// The 2x2 inverse is the closed-form adjugate over the determinant, no
// pivoting. A singular 2x2 therefore produces Inf/NaN entries and callers
// must test `determinant()` (or `is_finite()`) themselves. Larger square
// matrices go through nalgebra's dense inverse.

use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut, Mul, Sub};

use nalgebra::SMatrix;

// ---------------------------------------------------------------------------
// Matrix<R, C>
// ---------------------------------------------------------------------------

/// A dense `R x C` matrix of `f32`, stored row-major on the stack.
#[derive(Clone, Copy, PartialEq)]
pub struct Matrix<const R: usize, const C: usize> {
    data: [[f32; C]; R],
}

/// 2x2 matrix (structure tensor, its inverse).
pub type Mat2 = Matrix<2, 2>;

impl<const R: usize, const C: usize> Matrix<R, C> {
    /// All-zero matrix.
    pub const fn zeros() -> Self {
        Matrix { data: [[0.0; C]; R] }
    }

    /// Build from row arrays.
    pub const fn from_rows(data: [[f32; C]; R]) -> Self {
        Matrix { data }
    }

    /// Matrix filled with a single value.
    pub const fn splat(value: f32) -> Self {
        Matrix { data: [[value; C]; R] }
    }

    #[inline]
    pub const fn rows(&self) -> usize {
        R
    }

    #[inline]
    pub const fn cols(&self) -> usize {
        C
    }

    /// Borrow row `r`.
    #[inline]
    pub fn row(&self, r: usize) -> &[f32; C] {
        &self.data[r]
    }

    /// Borrow the row arrays.
    pub fn as_rows(&self) -> &[[f32; C]; R] {
        &self.data
    }

    /// Transposed copy. The result type swaps the row and column counts.
    pub fn transpose(&self) -> Matrix<C, R> {
        let mut out = Matrix::<C, R>::zeros();
        for r in 0..R {
            for c in 0..C {
                out.data[c][r] = self.data[r][c];
            }
        }
        out
    }

    /// Frobenius norm: `sqrt(sum |a_ij|^2)`.
    pub fn norm(&self) -> f32 {
        let mut sum = 0.0f32;
        for row in &self.data {
            for &v in row {
                let a = v.abs();
                sum += a * a;
            }
        }
        sum.sqrt()
    }

    /// True when no entry is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|row| row.iter().all(|v| v.is_finite()))
    }
}

impl<const N: usize> Matrix<N, N> {
    /// Identity matrix.
    pub fn identity() -> Self {
        let mut out = Self::zeros();
        for i in 0..N {
            out.data[i][i] = 1.0;
        }
        out
    }

    /// Transpose a square matrix by swapping storage in place.
    pub fn transpose_in_place(&mut self) {
        for r in 0..N {
            for c in (r + 1)..N {
                let tmp = self.data[r][c];
                self.data[r][c] = self.data[c][r];
                self.data[c][r] = tmp;
            }
        }
    }

    /// Inverse without any singularity check.
    ///
    /// For 2x2 this is the adjugate divided by the determinant, so a
    /// singular input gives Inf/NaN entries. For other sizes a singular
    /// input gives an all-NaN matrix. Callers that need to know should use
    /// [`try_inverse`](Self::try_inverse) or check `is_finite()`.
    pub fn inverse(&self) -> Self {
        if N == 2 {
            let a = self.data[0][0];
            let b = self.data[0][1];
            let c = self.data[1][0];
            let d = self.data[1][1];
            let det = a * d - b * c;

            let mut out = Self::zeros();
            out.data[0][0] = d / det;
            out.data[0][1] = -b / det;
            out.data[1][0] = -c / det;
            out.data[1][1] = a / det;
            return out;
        }

        self.dense_inverse().unwrap_or(Self::splat(f32::NAN))
    }

    /// Checked inverse. `None` when the matrix is singular or the result
    /// is not finite.
    pub fn try_inverse(&self) -> Option<Self> {
        if N == 2 {
            let inv = self.inverse();
            let det = self.data[0][0] * self.data[1][1] - self.data[0][1] * self.data[1][0];
            return (det != 0.0 && inv.is_finite()).then_some(inv);
        }
        self.dense_inverse().filter(|inv| inv.is_finite())
    }

    fn dense_inverse(&self) -> Option<Self> {
        let m = SMatrix::<f32, N, N>::from_fn(|r, c| self.data[r][c]);
        m.try_inverse().map(|inv| Matrix {
            data: std::array::from_fn(|r| std::array::from_fn(|c| inv[(r, c)])),
        })
    }
}

impl Mat2 {
    /// Determinant `a*d - b*c`.
    #[inline]
    pub fn determinant(&self) -> f32 {
        self.data[0][0] * self.data[1][1] - self.data[0][1] * self.data[1][0]
    }
}

impl<const R: usize, const C: usize> Default for Matrix<R, C> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<const R: usize, const C: usize> Index<(usize, usize)> for Matrix<R, C> {
    type Output = f32;

    #[inline]
    fn index(&self, (r, c): (usize, usize)) -> &f32 {
        &self.data[r][c]
    }
}

impl<const R: usize, const C: usize> IndexMut<(usize, usize)> for Matrix<R, C> {
    #[inline]
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f32 {
        &mut self.data[r][c]
    }
}

impl<const R: usize, const C: usize> Add for Matrix<R, C> {
    type Output = Matrix<R, C>;

    fn add(self, rhs: Self) -> Self {
        let mut out = Self::zeros();
        add(&self, &rhs, &mut out);
        out
    }
}

impl<const R: usize, const K: usize, const C: usize> Mul<Matrix<K, C>> for Matrix<R, K> {
    type Output = Matrix<R, C>;

    fn mul(self, rhs: Matrix<K, C>) -> Matrix<R, C> {
        let mut out = Matrix::zeros();
        multiply(&self, &rhs, &mut out);
        out
    }
}

impl<const R: usize, const C: usize> fmt::Debug for Matrix<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matrix<{R}, {C}> [")?;
        for row in &self.data {
            write!(f, "  ")?;
            for v in row {
                write!(f, "{v:10.4} ")?;
            }
            writeln!(f)?;
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------
// Free-function kernel
// ---------------------------------------------------------------------------
// Output-argument forms, so hot loops can reuse a destination on the stack.

/// `out = a + b`.
pub fn add<const R: usize, const C: usize>(
    a: &Matrix<R, C>,
    b: &Matrix<R, C>,
    out: &mut Matrix<R, C>,
) {
    for r in 0..R {
        for c in 0..C {
            out.data[r][c] = a.data[r][c] + b.data[r][c];
        }
    }
}

/// `out = a * b` for `a: R x K`, `b: K x C`.
pub fn multiply<const R: usize, const K: usize, const C: usize>(
    a: &Matrix<R, K>,
    b: &Matrix<K, C>,
    out: &mut Matrix<R, C>,
) {
    for r in 0..R {
        for c in 0..C {
            let mut acc = 0.0f32;
            for k in 0..K {
                acc += a.data[r][k] * b.data[k][c];
            }
            out.data[r][c] = acc;
        }
    }
}

/// In-place transpose of a square matrix.
pub fn transpose<const N: usize>(source: &mut Matrix<N, N>) {
    source.transpose_in_place();
}

/// `out = source^-1`, unchecked (see [`Matrix::inverse`]).
pub fn inverse<const N: usize>(source: &Matrix<N, N>, out: &mut Matrix<N, N>) {
    *out = source.inverse();
}

/// Frobenius norm.
pub fn norm<const R: usize, const C: usize>(source: &Matrix<R, C>) -> f32 {
    source.norm()
}

/// Determinant of a 2x2 matrix.
pub fn determinant(source: &Mat2) -> f32 {
    source.determinant()
}

// ---------------------------------------------------------------------------
// Vec2
// ---------------------------------------------------------------------------

/// 2D vector used for positions and flow.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    /// Euclidean length.
    #[inline]
    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    #[inline]
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    #[inline]
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    #[inline]
    fn mul(self, s: f32) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }
}

impl Mul<Vec2> for f32 {
    type Output = Vec2;

    #[inline]
    fn mul(self, v: Vec2) -> Vec2 {
        Vec2::new(self * v.x, self * v.y)
    }
}

impl From<Matrix<2, 1>> for Vec2 {
    fn from(m: Matrix<2, 1>) -> Vec2 {
        Vec2::new(m.data[0][0], m.data[1][0])
    }
}
