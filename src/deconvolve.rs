//! Kernel deconvolution and the shuffle between the fine grid's FFT layout
//! and the user's mode array.
//!
//! Mode `k` (with `−m/2 ≤ k ≤ (m−1)/2`) sits at grid index `k` for `k ≥ 0`
//! and `nf + k` otherwise. In the mode array it sits at `k + m/2` (centred)
//! or `k`/`m + k` (FFT-native).

use crate::kernel::SpreadDirection;
use crate::num::{Complex, Float};
use crate::options::ModeOrder;

#[inline]
fn mode_range(ms: usize) -> (i64, i64) {
    (-((ms / 2) as i64), (ms as i64 - 1) / 2)
}

#[inline]
fn mode_index(k: i64, ms: usize, order: ModeOrder) -> usize {
    match order {
        ModeOrder::Centered => (k + (ms / 2) as i64) as usize,
        ModeOrder::FftNative => {
            if k >= 0 {
                k as usize
            } else {
                (ms as i64 + k) as usize
            }
        }
    }
}

#[inline]
fn grid_index(k: i64, nf: usize) -> usize {
    if k >= 0 {
        k as usize
    } else {
        (nf as i64 + k) as usize
    }
}

/// Per-axis geometry for one transform.
#[derive(Debug, Clone, Copy)]
pub struct ShuffleShape<'k, T: Float> {
    pub rank: usize,
    /// Mode counts, `ms[0]` fastest.
    pub modes: [usize; 3],
    /// Fine-grid lengths, `nf[0]` fastest.
    pub grid: [usize; 3],
    /// Kernel Fourier coefficients per axis, `nf[d]/2 + 1` each.
    pub kernel: [&'k [T]; 3],
    pub order: ModeOrder,
}

/// Move one transform between the fine grid `fw` and the mode array `fk`.
///
/// `Spread`: `fk[k] = prefac · fw[k] / Π φ̂_d(k_d)`. `Interp`: `fw` is zeroed
/// and `fw[k] = prefac · fk[k] / Π φ̂_d(k_d)`.
pub fn deconvolve_shuffle<T: Float>(
    direction: SpreadDirection,
    prefac: T,
    shape: &ShuffleShape<'_, T>,
    fk: &mut [Complex<T>],
    fw: &mut [Complex<T>],
) {
    if direction == SpreadDirection::Interp {
        let len: usize = shape.grid[..shape.rank].iter().product();
        fw[..len].fill(Complex::zero());
    }
    shuffle_axis(direction, prefac, shape, shape.rank - 1, fk, fw);
}

fn shuffle_axis<T: Float>(
    direction: SpreadDirection,
    prefac: T,
    shape: &ShuffleShape<'_, T>,
    axis: usize,
    fk: &mut [Complex<T>],
    fw: &mut [Complex<T>],
) {
    let ms = shape.modes[axis];
    let nf = shape.grid[axis];
    let ker = shape.kernel[axis];
    let (kmin, kmax) = mode_range(ms);
    // elements per slice below this axis
    let fk_stride: usize = shape.modes[..axis].iter().product();
    let fw_stride: usize = shape.grid[..axis].iter().product();
    for k in kmin..=kmax {
        let fi = mode_index(k, ms, shape.order);
        let gi = grid_index(k, nf);
        let p = prefac / ker[k.unsigned_abs() as usize];
        if axis == 0 {
            match direction {
                SpreadDirection::Spread => fk[fi] = fw[gi].scale(p),
                SpreadDirection::Interp => fw[gi] = fk[fi].scale(p),
            }
        } else {
            let fk_slice = &mut fk[fi * fk_stride..(fi + 1) * fk_stride];
            let fw_slice = &mut fw[gi * fw_stride..(gi + 1) * fw_stride];
            shuffle_axis(direction, p, shape, axis - 1, fk_slice, fw_slice);
        }
    }
}
