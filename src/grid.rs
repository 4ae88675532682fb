//! Fine-grid sizing, coordinate folding and bounds checks.

use alloc::format;

use crate::error::NufftError;
use crate::num::Float;
use crate::options::PointDomain;

/// Largest fine grid (in elements) a plan will allocate.
pub const MAX_ARRAY_SIZE: u64 = 100_000_000_000;

/// Element count of an array with axis lengths `dims`.
///
/// Fails with `Internal` when the product overflows or exceeds
/// [`MAX_ARRAY_SIZE`].
pub fn checked_array_size(dims: &[usize], what: &str) -> Result<usize, NufftError> {
    dims.iter()
        .try_fold(1u64, |acc, &n| acc.checked_mul(n as u64))
        .filter(|&total| total <= MAX_ARRAY_SIZE)
        .and_then(|total| usize::try_from(total).ok())
        .ok_or_else(|| {
            NufftError::internal(format!(
                "{} of shape {:?} exceeds the maximum of {} elements",
                what, dims, MAX_ARRAY_SIZE
            ))
        })
}

/// Smallest even integer `>= n` with no prime factor above 5.
pub fn next_smooth_int(n: usize) -> usize {
    if n <= 2 {
        return 2;
    }
    let mut candidate = n + n % 2;
    loop {
        let mut rem = candidate;
        for p in [2, 3, 5] {
            while rem % p == 0 {
                rem /= p;
            }
        }
        if rem == 1 {
            return candidate;
        }
        candidate += 2;
    }
}

/// Upsampling factor chosen when the caller passes `0.0`.
pub fn auto_upsampling_factor(rank: usize, tol: f64, mode_count: usize) -> f64 {
    if tol >= 1e-9 {
        let large = match rank {
            1 => mode_count > 10_000_000,
            2 => mode_count > 300_000,
            _ => mode_count > 3_000_000,
        };
        if large {
            return 1.25;
        }
    }
    2.0
}

/// Fine-grid length for `modes` uniform modes along one axis.
///
/// In spread/interp-only mode the grid is the mode array itself, so it must
/// already be even, 5-smooth and at least twice the kernel width.
pub fn fine_grid_size(
    modes: usize,
    upsampling_factor: f64,
    width: usize,
    spread_only: bool,
) -> Result<usize, NufftError> {
    let raw = if spread_only {
        modes as u64
    } else {
        (upsampling_factor * modes as f64) as u64
    };
    let raw = raw.max(2 * width as u64);
    if raw > MAX_ARRAY_SIZE {
        return Err(NufftError::internal(format!(
            "fine grid length {} exceeds the maximum {}",
            raw, MAX_ARRAY_SIZE
        )));
    }
    let size = next_smooth_int(raw as usize);
    if spread_only && size != modes {
        return Err(NufftError::internal(format!(
            "invalid grid size {}: must be even, at least {} and have no prime factor above 5",
            modes,
            2 * width
        )));
    }
    Ok(size)
}

/// Map a coordinate onto `[0, n)` of the fine grid.
///
/// `Pi`: `[−3π, −π)`, `[−π, π)` and `[π, 3π)` all land on `[0, n)` after
/// scaling by `n / 2π`. `Grid`: `[−n, 0)` and `[n, 2n)` are shifted by one
/// period. Inputs further out are not brought back.
#[inline(always)]
pub fn fold_rescale<T: Float>(x: T, n: T, domain: PointDomain) -> T {
    match domain {
        PointDomain::Pi => {
            let pi = T::pi();
            let shift = if x >= -pi {
                if x < pi {
                    pi
                } else {
                    -pi
                }
            } else {
                T::from_f64(3.0) * pi
            };
            (x + shift) * n / (T::from_f64(2.0) * pi)
        }
        PointDomain::Grid => {
            if x >= T::zero() {
                if x < n {
                    x
                } else {
                    x - n
                }
            } else {
                x + n
            }
        }
    }
}

/// Reject coordinates outside the one-period margin of the accepted range.
pub fn check_bounds<T: Float>(
    points: &[T],
    n: usize,
    domain: PointDomain,
    axis: char,
) -> Result<(), NufftError> {
    let (lo, hi) = match domain {
        PointDomain::Pi => (-3.0 * T::pi().to_f64(), 3.0 * T::pi().to_f64()),
        PointDomain::Grid => (-(n as f64), 2.0 * n as f64),
    };
    let (lo_t, hi_t) = (T::from_f64(lo), T::from_f64(hi));
    for (i, &x) in points.iter().enumerate() {
        if !x.is_finite() || x < lo_t || x > hi_t {
            return Err(NufftError::invalid(format!(
                "point {}[{}] = {} is outside [{}, {}]",
                axis, i, x, lo, hi
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_size_rejects_overflow_and_oversize() {
        assert_eq!(checked_array_size(&[4, 6, 1], "grid").unwrap(), 24);
        let wrapped = checked_array_size(&[1 << 31, 1 << 31, 1 << 31], "modes").unwrap_err();
        assert!(matches!(wrapped, NufftError::Internal(_)));
        let big = checked_array_size(&[400_000, 400_000], "grid").unwrap_err();
        assert!(matches!(big, NufftError::Internal(_)));
    }

    #[test]
    fn smooth_int_examples() {
        assert_eq!(next_smooth_int(0), 2);
        assert_eq!(next_smooth_int(3), 4);
        assert_eq!(next_smooth_int(7), 8);
        assert_eq!(next_smooth_int(11), 12);
        assert_eq!(next_smooth_int(13), 16);
        assert_eq!(next_smooth_int(31), 32);
        assert_eq!(next_smooth_int(33), 36);
        assert_eq!(next_smooth_int(98), 100);
        assert_eq!(next_smooth_int(242), 250);
    }

    #[test]
    fn grid_size_respects_width_and_sigma() {
        assert_eq!(fine_grid_size(16, 2.0, 7, false).unwrap(), 32);
        assert_eq!(fine_grid_size(3, 2.0, 7, false).unwrap(), 16);
        assert_eq!(fine_grid_size(100, 1.25, 6, false).unwrap(), 128);
        assert_eq!(fine_grid_size(16, 2.0, 7, true).unwrap(), 16);
        assert!(matches!(fine_grid_size(14, 2.0, 7, true), Err(NufftError::Internal(_))));
        assert!(matches!(fine_grid_size(22, 2.0, 2, true), Err(NufftError::Internal(_))));
        assert!(matches!(
            fine_grid_size(100_000_000_000, 2.0, 7, false),
            Err(NufftError::Internal(_))
        ));
    }

    #[test]
    fn auto_sigma_switches_for_large_low_accuracy_problems() {
        assert_eq!(auto_upsampling_factor(1, 1e-6, 1000), 2.0);
        assert_eq!(auto_upsampling_factor(1, 1e-6, 20_000_000), 1.25);
        assert_eq!(auto_upsampling_factor(1, 1e-12, 20_000_000), 2.0);
        assert_eq!(auto_upsampling_factor(2, 1e-6, 300_001), 1.25);
        assert_eq!(auto_upsampling_factor(3, 1e-6, 3_000_000), 2.0);
    }

    #[test]
    fn folding_covers_three_periods() {
        let n = 64.0f64;
        let pi = core::f64::consts::PI;
        for &x in &[-3.0 * pi, -2.0, -pi, 0.0, 1.5, pi, 2.5 * pi] {
            let f = fold_rescale(x, n, PointDomain::Pi);
            assert!((0.0..n).contains(&f), "{} -> {}", x, f);
        }
        assert!((fold_rescale(0.0, n, PointDomain::Pi) - 32.0).abs() < 1e-12);
        assert_eq!(fold_rescale(-10.0, n, PointDomain::Grid), 54.0);
        assert_eq!(fold_rescale(70.0, n, PointDomain::Grid), 6.0);
        assert_eq!(fold_rescale(5.0, n, PointDomain::Grid), 5.0);
    }

    #[test]
    fn bounds_check_names_first_offender() {
        let pts = [0.0f64, 1.0, 10.0, f64::NAN];
        let err = check_bounds(&pts, 32, PointDomain::Pi, 'x').unwrap_err();
        match err {
            NufftError::InvalidArgument(msg) => assert!(msg.contains("x[2]"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
        assert!(check_bounds(&[f64::INFINITY], 32, PointDomain::Grid, 'y').is_err());
        assert!(check_bounds(&[-32.0f64, 63.9], 32, PointDomain::Grid, 'z').is_ok());
    }
}
