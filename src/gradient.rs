// gradient.rs -- Sobel and temporal derivatives of patches.
//
// The spatial kernels are the unnormalized 3x3 Sobel pair:
//
//   dx: [-1 0 1]      dy: [-1 -2 -1]
//       [-2 0 2]          [ 0  0  0]
//       [-1 0 1]          [ 1  2  1]
//
// They run over the 7x7 interior only, reading into the 1-pixel border, and
// leave the output border at zero. Unnormalized means each gradient is 8x
// the true intensity slope; the tracker relies on that scale as is.

use crate::patch::Patch;
use crate::{PATCH_SIZE, PATCH_SIZE_WITH_BORDER};

const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

fn correlate3(source: &Patch, kernel: &[[f32; 3]; 3]) -> Patch {
    let src = source.grid();
    let mut out = [[0.0f32; PATCH_SIZE_WITH_BORDER]; PATCH_SIZE_WITH_BORDER];

    for j in 1..=PATCH_SIZE {
        for i in 1..=PATCH_SIZE {
            let mut acc = 0.0;
            for (kj, krow) in kernel.iter().enumerate() {
                for (ki, &k) in krow.iter().enumerate() {
                    acc += k * src[j + kj - 1][i + ki - 1];
                }
            }
            out[j][i] = acc;
        }
    }

    Patch::from_grid(source.origin(), out)
}

/// Horizontal Sobel derivative. Positive where intensity grows to the right.
pub fn dx(source: &Patch) -> Patch {
    correlate3(source, &SOBEL_X)
}

/// Vertical Sobel derivative. Positive where intensity grows downward.
pub fn dy(source: &Patch) -> Patch {
    correlate3(source, &SOBEL_Y)
}

/// Temporal derivative `second - first` over the full bordered grid.
///
/// The result carries the origin of `first`.
pub fn dt(first: &Patch, second: &Patch) -> Patch {
    let a = first.grid();
    let b = second.grid();
    let out = std::array::from_fn(|j| std::array::from_fn(|i| b[j][i] - a[j][i]));
    Patch::from_grid(first.origin(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Vec2;

    fn linear_patch(gx: f32, gy: f32) -> Patch {
        let grid = std::array::from_fn(|j| std::array::from_fn(|i| gx * i as f32 + gy * j as f32));
        Patch::from_grid(Vec2::new(3.0, 4.0), grid)
    }

    #[test]
    fn test_dx_of_horizontal_ramp() {
        // Slope 2 per pixel: Sobel gives (1 + 2 + 1) * 2 * 2 = 16.
        let g = dx(&linear_patch(2.0, 0.0));
        for i in 0..PATCH_SIZE {
            assert!(g.row(i).iter().all(|&v| v == 16.0), "row {i}: {:?}", g.row(i));
        }
        assert_eq!(g.origin(), Vec2::new(3.0, 4.0));
    }

    #[test]
    fn test_dy_of_horizontal_ramp_is_zero() {
        let g = dy(&linear_patch(2.0, 0.0));
        assert!(g.interior().all(|v| v == 0.0));
    }

    #[test]
    fn test_dy_of_vertical_ramp() {
        let g = dy(&linear_patch(0.0, 1.0));
        assert!(g.interior().all(|v| v == 8.0));
    }

    #[test]
    fn test_gradient_border_is_zero() {
        let g = dx(&linear_patch(5.0, 3.0));
        for k in 0..PATCH_SIZE_WITH_BORDER {
            assert_eq!(g.get(k, 0), 0.0);
            assert_eq!(g.get(k, PATCH_SIZE_WITH_BORDER - 1), 0.0);
            assert_eq!(g.get(0, k), 0.0);
            assert_eq!(g.get(PATCH_SIZE_WITH_BORDER - 1, k), 0.0);
        }
    }

    #[test]
    fn test_dt_covers_border() {
        let a = linear_patch(1.0, 0.0);
        let b = linear_patch(1.0, 1.0);
        let t = dt(&a, &b);
        assert_eq!(t.get(0, 0), 0.0);
        assert_eq!(t.get(0, 8), 8.0);
        assert_eq!(t.get(8, 3), 3.0);
        assert_eq!(t.origin(), a.origin());
    }
}
