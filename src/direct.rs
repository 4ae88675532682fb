//! Direct O(N·M) evaluation of type-1 and type-2 sums.
//!
//! Slow but exact up to rounding; used to check plans. Sums are accumulated
//! in `f64` whatever the input precision.

use alloc::vec::Vec;

use crate::fft::FftDirection;
use crate::num::{Complex, Float};
use crate::options::ModeOrder;

/// Frequency stored at position `i` of an axis with `ms` modes.
pub fn mode_frequency(i: usize, ms: usize, order: ModeOrder) -> i64 {
    match order {
        ModeOrder::Centered => i as i64 - (ms / 2) as i64,
        ModeOrder::FftNative => {
            if i <= (ms - 1) / 2 {
                i as i64
            } else {
                i as i64 - ms as i64
            }
        }
    }
}

fn frequencies(modes: &[usize], order: ModeOrder) -> Vec<[i64; 3]> {
    let mut ms = [1usize; 3];
    ms[..modes.len()].copy_from_slice(modes);
    let mut out = Vec::with_capacity(ms.iter().product());
    for i3 in 0..ms[2] {
        for i2 in 0..ms[1] {
            for i1 in 0..ms[0] {
                out.push([
                    mode_frequency(i1, ms[0], order),
                    if modes.len() > 1 { mode_frequency(i2, ms[1], order) } else { 0 },
                    if modes.len() > 2 { mode_frequency(i3, ms[2], order) } else { 0 },
                ]);
            }
        }
    }
    out
}

fn coord<T: Float>(axis: Option<&[T]>, j: usize) -> f64 {
    axis.map_or(0.0, |a| a[j].to_f64())
}

/// `f[k] = Σ_j c[j] · exp(±i k·x_j)` for every mode `k`.
///
/// `modes` holds one count per dimension, x first; the result is laid out
/// with x fastest.
pub fn type1_direct<T: Float>(
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
    weights: &[Complex<T>],
    modes: &[usize],
    direction: FftDirection,
    order: ModeOrder,
) -> Vec<Complex<T>> {
    let sign = direction.sign() as f64;
    frequencies(modes, order)
        .into_iter()
        .map(|k| {
            let (mut re, mut im) = (0.0f64, 0.0f64);
            for (j, c) in weights.iter().enumerate().take(x.len()) {
                let phase = sign
                    * (k[0] as f64 * x[j].to_f64()
                        + k[1] as f64 * coord(y, j)
                        + k[2] as f64 * coord(z, j));
                let (s, co) = phase.sin_cos();
                let (cr, ci) = (c.re.to_f64(), c.im.to_f64());
                re += cr * co - ci * s;
                im += cr * s + ci * co;
            }
            Complex::new(T::from_f64(re), T::from_f64(im))
        })
        .collect()
}

/// `c[j] = Σ_k f[k] · exp(±i k·x_j)` at every point.
pub fn type2_direct<T: Float>(
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
    coeffs: &[Complex<T>],
    modes: &[usize],
    direction: FftDirection,
    order: ModeOrder,
) -> Vec<Complex<T>> {
    let sign = direction.sign() as f64;
    let freqs = frequencies(modes, order);
    (0..x.len())
        .map(|j| {
            let p = [x[j].to_f64(), coord(y, j), coord(z, j)];
            let (mut re, mut im) = (0.0f64, 0.0f64);
            for (k, f) in freqs.iter().zip(coeffs.iter()) {
                let phase =
                    sign * (k[0] as f64 * p[0] + k[1] as f64 * p[1] + k[2] as f64 * p[2]);
                let (s, co) = phase.sin_cos();
                let (fr, fi) = (f.re.to_f64(), f.im.to_f64());
                re += fr * co - fi * s;
                im += fr * s + fi * co;
            }
            Complex::new(T::from_f64(re), T::from_f64(im))
        })
        .collect()
}

/// `‖a − b‖₂ / ‖b‖₂`, or the absolute error when `b` is zero.
pub fn relative_l2_error<T: Float>(a: &[Complex<T>], b: &[Complex<T>]) -> f64 {
    let mut num = 0.0f64;
    let mut den = 0.0f64;
    for (u, v) in a.iter().zip(b.iter()) {
        let dr = u.re.to_f64() - v.re.to_f64();
        let di = u.im.to_f64() - v.im.to_f64();
        num += dr * dr + di * di;
        den += v.re.to_f64().powi(2) + v.im.to_f64().powi(2);
    }
    if den == 0.0 {
        num.sqrt()
    } else {
        (num / den).sqrt()
    }
}
