//! Exponential-of-semicircle spreading kernel.
//!
//! `φ(z) = exp(β·sqrt(1 − c·z²))` for `|z| < w/2`, zero outside, with
//! `c = 4/w²`. The kernel is evaluated either directly or through piecewise
//! polynomials (one per unit segment of the support) in Horner form.
//!
//! Polynomial tables are built once per `(width, σ)` by Chebyshev
//! interpolation of the direct formula and shared process-wide.

use alloc::format;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use std::sync::{Mutex, OnceLock};

use hashbrown::HashMap;
use log::warn;

use crate::error::{try_with_capacity, NufftError};
use crate::num::Float;
use crate::options::{KernelEvaluationMethod, PointDomain, SortPoints};

/// Largest kernel width, in fine-grid points.
pub const MAX_KERNEL_WIDTH: usize = 16;

/// Highest polynomial degree in a Horner table.
const MAX_HORNER_DEGREE: usize = 19;

/// Upsampling factors with polynomial tables.
const HORNER_FACTORS: [f64; 2] = [2.0, 1.25];

/// Whether grid values are produced from points or sampled at them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadDirection {
    /// Non-uniform points onto the fine grid (type 1).
    Spread,
    /// Fine grid onto non-uniform points (type 2).
    Interp,
}

/// Kernel shape plus the spreading knobs that travel with it.
#[derive(Debug, Clone)]
pub struct KernelParams<T: Float> {
    pub width: usize,
    pub half_width: T,
    pub c: T,
    pub beta: T,
    pub upsampling_factor: f64,
    /// Resolved to `Direct` or `Horner`.
    pub evaluation_method: KernelEvaluationMethod,
    pub spread_direction: SpreadDirection,
    pub sort_points: SortPoints,
    pub sort_threads: usize,
    pub num_threads: usize,
    pub max_subproblem_size: usize,
    pub atomic_threshold: usize,
    pub check_bounds: bool,
    pub point_domain: PointDomain,
    pub spread_only: bool,
    /// Output multiplier in spread/interp-only mode, `1` otherwise.
    pub kernel_scale: T,
    pub verbosity: u8,
}

impl<T: Float> KernelParams<T> {
    /// Select the kernel for tolerance `tol` and factor `upsampling_factor`.
    ///
    /// Everything that does not depend on the tolerance gets a neutral
    /// default and is filled in by the plan.
    pub fn setup(
        rank: usize,
        tol: f64,
        upsampling_factor: f64,
        method: KernelEvaluationMethod,
        spread_only: bool,
        show_warnings: bool,
    ) -> Result<Self, NufftError> {
        let standard = HORNER_FACTORS.contains(&upsampling_factor);
        if !standard {
            if method == KernelEvaluationMethod::Horner {
                return Err(NufftError::internal(format!(
                    "Horner kernel evaluation only supports upsampling factors of 2.0 or 1.25, got {}",
                    upsampling_factor
                )));
            }
            if !(upsampling_factor > 1.0) {
                return Err(NufftError::internal(format!(
                    "upsampling factor must be > 1.0, got {}",
                    upsampling_factor
                )));
            }
        }
        let evaluation_method = match method {
            KernelEvaluationMethod::Auto if standard => KernelEvaluationMethod::Horner,
            KernelEvaluationMethod::Auto => KernelEvaluationMethod::Direct,
            m => m,
        };

        let floor = T::EPSILON_FLOOR.to_f64();
        let eps = if tol < floor {
            if show_warnings {
                warn!("tolerance {:e} below precision floor, using {:e}", tol, floor);
            }
            floor
        } else {
            tol
        };

        let requested = if upsampling_factor == 2.0 {
            (-(eps / 10.0).log10()).ceil()
        } else {
            (-eps.ln() / (core::f64::consts::PI * (1.0 - 1.0 / upsampling_factor).sqrt())).ceil()
        };
        let mut width = (requested.max(2.0)) as usize;
        if width > MAX_KERNEL_WIDTH {
            if show_warnings {
                warn!(
                    "kernel width {} clipped to {}; accuracy will be worse than requested",
                    width, MAX_KERNEL_WIDTH
                );
            }
            width = MAX_KERNEL_WIDTH;
        }

        let mut beta_over_w = match width {
            2 => 2.20,
            3 => 2.26,
            4 => 2.38,
            _ => 2.30,
        };
        if upsampling_factor != 2.0 {
            beta_over_w = 0.97 * core::f64::consts::PI * (1.0 - 1.0 / (2.0 * upsampling_factor));
        }
        let beta = beta_over_w * width as f64;
        let c = 4.0 / (width * width) as f64;

        let kernel_scale = if spread_only {
            spread_only_scale(rank, beta, c)
        } else {
            1.0
        };

        Ok(Self {
            width,
            half_width: T::from_f64(width as f64 / 2.0),
            c: T::from_f64(c),
            beta: T::from_f64(beta),
            upsampling_factor,
            evaluation_method,
            spread_direction: SpreadDirection::Spread,
            sort_points: SortPoints::Auto,
            sort_threads: 0,
            num_threads: 1,
            max_subproblem_size: if rank == 1 { 10_000 } else { 100_000 },
            atomic_threshold: 10,
            check_bounds: false,
            point_domain: PointDomain::Pi,
            spread_only,
            kernel_scale: T::from_f64(kernel_scale),
            verbosity: 0,
        })
    }

    /// Build the evaluator matching `evaluation_method`.
    pub fn evaluator(&self) -> Result<Box<dyn KernelEvaluator<T>>, NufftError> {
        match self.evaluation_method {
            KernelEvaluationMethod::Horner => Ok(Box::new(HornerKernel::new(
                self.width,
                self.upsampling_factor,
                self.beta.to_f64(),
            )?)),
            _ => Ok(Box::new(DirectKernel::from_params(self))),
        }
    }
}

/// Evaluate the kernel at a single offset with the direct formula.
pub fn evaluate_kernel<T: Float>(x: T, params: &KernelParams<T>) -> T {
    direct_value(x, params.half_width, params.c, params.beta)
}

#[inline(always)]
fn direct_value<T: Float>(z: T, half_width: T, c: T, beta: T) -> T {
    if z.abs() >= half_width {
        return T::zero();
    }
    let r = T::one() - c * z * z;
    let r = if r > T::zero() { r } else { T::zero() };
    (beta * r.sqrt()).exp()
}

fn direct_value_f64(z: f64, width: usize, beta: f64) -> f64 {
    let half = width as f64 / 2.0;
    if z.abs() >= half {
        return 0.0;
    }
    let c = 4.0 / (width * width) as f64;
    (beta * (1.0 - c * z * z).max(0.0).sqrt()).exp()
}

/// Kernel values along one axis for a point.
pub trait KernelEvaluator<T: Float>: Send + Sync {
    fn width(&self) -> usize;

    /// Write `φ(x1), φ(x1 + 1), …, φ(x1 + w − 1)` into `out[..w]`.
    ///
    /// `x1` must lie in `[−w/2, −w/2 + 1]`.
    fn evaluate(&self, x1: T, out: &mut [T]);
}

#[derive(Debug, Clone)]
pub struct DirectKernel<T: Float> {
    width: usize,
    half_width: T,
    c: T,
    beta: T,
}

impl<T: Float> DirectKernel<T> {
    pub fn from_params(params: &KernelParams<T>) -> Self {
        Self {
            width: params.width,
            half_width: params.half_width,
            c: params.c,
            beta: params.beta,
        }
    }
}

impl<T: Float> KernelEvaluator<T> for DirectKernel<T> {
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn evaluate(&self, x1: T, out: &mut [T]) {
        let mut z = x1;
        for o in out[..self.width].iter_mut() {
            *o = direct_value(z, self.half_width, self.c, self.beta);
            z += T::one();
        }
    }
}

/// Piecewise-polynomial kernel, one polynomial per unit segment, in the
/// local variable `z' = 2·x1 + w − 1 ∈ [−1, 1]`.
#[derive(Debug, Clone)]
pub struct HornerKernel<T: Float> {
    width: usize,
    /// Coefficients per segment, lowest order first, `degree + 1` each.
    coeffs: Vec<T>,
    degree: usize,
}

impl<T: Float> HornerKernel<T> {
    pub fn new(width: usize, upsampling_factor: f64, beta: f64) -> Result<Self, NufftError> {
        if !HORNER_FACTORS.contains(&upsampling_factor) {
            return Err(NufftError::internal(format!(
                "no polynomial kernel table for upsampling factor {}",
                upsampling_factor
            )));
        }
        let table = horner_table(width, upsampling_factor, beta)?;
        Ok(Self {
            width,
            degree: table.degree,
            coeffs: table.coeffs.iter().map(|&a| T::from_f64(a)).collect(),
        })
    }
}

impl<T: Float> KernelEvaluator<T> for HornerKernel<T> {
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn evaluate(&self, x1: T, out: &mut [T]) {
        let two = T::from_f64(2.0);
        let zp = two * x1 + T::from_f64((self.width - 1) as f64);
        let stride = self.degree + 1;
        for (seg, o) in out[..self.width].iter_mut().enumerate() {
            let a = &self.coeffs[seg * stride..(seg + 1) * stride];
            let mut acc = a[self.degree];
            for &ak in a[..self.degree].iter().rev() {
                acc = acc.mul_add(zp, ak);
            }
            *o = acc;
        }
    }
}

struct HornerTable {
    degree: usize,
    coeffs: Vec<f64>,
}

type HornerCache = Mutex<HashMap<(usize, u64), Arc<HornerTable>>>;

static HORNER_CACHE: OnceLock<HornerCache> = OnceLock::new();

fn horner_table(
    width: usize,
    upsampling_factor: f64,
    beta: f64,
) -> Result<Arc<HornerTable>, NufftError> {
    let cache = HORNER_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let key = (width, upsampling_factor.to_bits());
    let mut cache = cache
        .lock()
        .map_err(|_| NufftError::internal("kernel table cache poisoned"))?;
    if let Some(t) = cache.get(&key) {
        return Ok(Arc::clone(t));
    }
    let table = Arc::new(build_horner_table(width, beta));
    cache.insert(key, Arc::clone(&table));
    Ok(table)
}

fn build_horner_table(width: usize, beta: f64) -> HornerTable {
    let degree = (width + 3).min(MAX_HORNER_DEGREE);
    let n = degree + 1;
    let mut coeffs = Vec::with_capacity(width * n);
    let mut values = vec![0.0; n];
    let mut cheb = vec![0.0; n];
    for seg in 0..width {
        let offset = seg as f64 - (width as f64 - 1.0) / 2.0;
        for (j, v) in values.iter_mut().enumerate() {
            let t = (core::f64::consts::PI * (j as f64 + 0.5) / n as f64).cos();
            *v = direct_value_f64(t / 2.0 + offset, width, beta);
        }
        for (k, ck) in cheb.iter_mut().enumerate() {
            let sum: f64 = values
                .iter()
                .enumerate()
                .map(|(j, &v)| {
                    v * (core::f64::consts::PI * k as f64 * (j as f64 + 0.5) / n as f64).cos()
                })
                .sum();
            *ck = 2.0 * sum / n as f64;
        }
        cheb[0] /= 2.0;
        coeffs.extend(chebyshev_to_monomial(&cheb));
    }
    HornerTable { degree, coeffs }
}

/// Convert `Σ c_k T_k(x)` to monomial coefficients, lowest order first.
fn chebyshev_to_monomial(cheb: &[f64]) -> Vec<f64> {
    let n = cheb.len();
    let mut out = vec![0.0; n];
    let mut prev = vec![0.0; n];
    let mut cur = vec![0.0; n];
    prev[0] = 1.0;
    out[0] += cheb[0];
    if n == 1 {
        return out;
    }
    cur[1] = 1.0;
    out[1] += cheb[1];
    for &ck in &cheb[2..] {
        let mut next = vec![0.0; n];
        for i in 0..n - 1 {
            next[i + 1] += 2.0 * cur[i];
        }
        for i in 0..n {
            next[i] -= prev[i];
        }
        for (o, &t) in out.iter_mut().zip(next.iter()) {
            *o += ck * t;
        }
        prev = core::mem::replace(&mut cur, next);
    }
    out
}

/// `1 / (∫φ)^rank`, with the integral by the trapezoid rule on 100 intervals.
fn spread_only_scale(rank: usize, beta: f64, c: f64) -> f64 {
    let n = 100;
    let h = 2.0 / n as f64;
    let mut x = -1.0;
    let mut sum = 0.0;
    for _ in 1..n {
        x += h;
        sum += (beta * (1.0 - x * x).sqrt()).exp();
    }
    sum += 1.0;
    sum *= h;
    sum *= (1.0 / c).sqrt();
    1.0 / sum.powi(rank as i32)
}

/// Nodes and weights of the `n`-point Gauss–Legendre rule on `[-1, 1]`.
fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for i in 0..(n + 1) / 2 {
        let mut x = (core::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..100 {
            let mut p0 = 1.0;
            let mut p1 = x;
            for k in 2..=n {
                let p2 = ((2 * k - 1) as f64 * x * p1 - (k - 1) as f64 * p0) / k as f64;
                p0 = p1;
                p1 = p2;
            }
            dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
            let dx = p1 / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        nodes[i] = x;
        weights[i] = w;
        nodes[n - 1 - i] = -x;
        weights[n - 1 - i] = w;
    }
    (nodes, weights)
}

/// Fourier coefficients `φ̂(k)`, `k = 0 ..= nf/2`, of the kernel on a grid of
/// length `nf`.
///
/// In the `Pi` domain each coefficient carries the `(−1)^k` phase of the
/// half-grid shift applied by folding.
pub fn kernel_fourier_series<T: Float>(
    nf: usize,
    params: &KernelParams<T>,
) -> Result<Vec<T>, NufftError> {
    let width = params.width;
    let beta = params.beta.to_f64();
    let half = width as f64 / 2.0;
    let q = (2.0 + 3.0 * half) as usize;
    let (nodes, weights) = gauss_legendre(2 * q);
    let (z, f): (Vec<f64>, Vec<f64>) = nodes
        .iter()
        .zip(weights.iter())
        .filter(|(x, _)| **x > 0.0)
        .map(|(&x, &w)| {
            let z = x * half;
            (z, half * w * direct_value_f64(z, width, beta))
        })
        .unzip();
    let alternate = params.point_domain == PointDomain::Pi;
    let mut series = try_with_capacity(nf / 2 + 1, "kernel Fourier series")?;
    series.extend((0..=nf / 2).map(|k| {
        let mut acc = 0.0;
        for (&zn, &fn_) in z.iter().zip(f.iter()) {
            acc += 2.0 * fn_ * (2.0 * core::f64::consts::PI * k as f64 * zn / nf as f64).cos();
        }
        if alternate && k % 2 == 1 {
            acc = -acc;
        }
        T::from_f64(acc)
    }));
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(tol: f64, sigma: f64, method: KernelEvaluationMethod) -> KernelParams<f64> {
        KernelParams::setup(1, tol, sigma, method, false, false).unwrap()
    }

    #[test]
    fn width_and_beta_follow_tolerance() {
        let p = params(1e-6, 2.0, KernelEvaluationMethod::Auto);
        assert_eq!(p.width, 7);
        assert!((p.beta - 2.30 * 7.0).abs() < 1e-12);
        assert!((p.c - 4.0 / 49.0).abs() < 1e-15);
        assert_eq!(p.evaluation_method, KernelEvaluationMethod::Horner);

        let p = params(1e-1, 2.0, KernelEvaluationMethod::Direct);
        assert_eq!(p.width, 2);
        assert!((p.beta - 4.40).abs() < 1e-12);

        let p = params(1e-30, 2.0, KernelEvaluationMethod::Auto);
        assert_eq!(p.width, MAX_KERNEL_WIDTH);
    }

    #[test]
    fn custom_sigma_uses_formula_and_direct_evaluation() {
        let p = params(1e-6, 1.5, KernelEvaluationMethod::Auto);
        let expected = (-(1e-6f64).ln() / (core::f64::consts::PI * (1.0 - 1.0 / 1.5f64).sqrt())).ceil();
        assert_eq!(p.width, expected as usize);
        assert_eq!(p.evaluation_method, KernelEvaluationMethod::Direct);
        let r = 0.97 * core::f64::consts::PI * (1.0 - 1.0 / 3.0);
        assert!((p.beta - r * p.width as f64).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_sigma() {
        let e = KernelParams::<f64>::setup(1, 1e-6, 1.5, KernelEvaluationMethod::Horner, false, false)
            .unwrap_err();
        assert!(matches!(e, NufftError::Internal(_)));
        let e = KernelParams::<f64>::setup(1, 1e-6, 0.9, KernelEvaluationMethod::Direct, false, false)
            .unwrap_err();
        assert!(matches!(e, NufftError::Internal(_)));
    }

    #[test]
    fn f32_tolerance_is_floored() {
        let p = KernelParams::<f32>::setup(1, 1e-12, 2.0, KernelEvaluationMethod::Auto, false, false)
            .unwrap();
        assert_eq!(p.width, 9);
    }

    #[test]
    fn kernel_is_symmetric_and_compact() {
        for &sigma in &HORNER_FACTORS {
            for method in [KernelEvaluationMethod::Direct, KernelEvaluationMethod::Horner] {
                let p = params(1e-9, sigma, method);
                let ev = p.evaluator().unwrap();
                let w = p.width;
                let hw = w as f64 / 2.0;
                let peak = p.beta.exp();
                // mirrored polynomial segments agree to rounding in the monomial basis
                let tol = match method {
                    KernelEvaluationMethod::Direct => 1e-12,
                    _ => 1e-10,
                } * peak;
                let mut a = vec![0.0; w];
                let mut b = vec![0.0; w];
                for step in 0..=10 {
                    let x1 = -hw + step as f64 / 10.0;
                    ev.evaluate(x1, &mut a);
                    // mirror: offsets -(x1 + w - 1) .. -x1
                    ev.evaluate(-(x1 + (w - 1) as f64), &mut b);
                    for i in 0..w {
                        assert!(
                            (a[i] - b[w - 1 - i]).abs() < tol,
                            "sigma={} {:?} {} {}",
                            sigma,
                            method,
                            a[i],
                            b[w - 1 - i]
                        );
                    }
                }
            }
        }
        let p = params(1e-6, 2.0, KernelEvaluationMethod::Direct);
        assert_eq!(evaluate_kernel(3.5, &p), 0.0);
        assert_eq!(evaluate_kernel(-4.0, &p), 0.0);
        assert!((evaluate_kernel(0.0, &p) - p.beta.exp()).abs() < 1e-6 * p.beta.exp());
    }

    #[test]
    fn horner_tracks_direct_kernel() {
        for &sigma in &HORNER_FACTORS {
            for &tol in &[1e-3, 1e-6, 1e-9, 1e-12] {
                let p = params(tol, sigma, KernelEvaluationMethod::Horner);
                let horner = p.evaluator().unwrap();
                let direct = DirectKernel::from_params(&p);
                let w = p.width;
                let peak = p.beta.exp();
                let mut a = vec![0.0; w];
                let mut b = vec![0.0; w];
                for step in 0..50 {
                    let x1 = -(w as f64) / 2.0 + step as f64 / 49.0;
                    horner.evaluate(x1, &mut a);
                    direct.evaluate(x1, &mut b);
                    for i in 0..w {
                        assert!((a[i] - b[i]).abs() <= 10.0 * tol * peak, "w={} sigma={}", w, sigma);
                    }
                }
            }
        }
    }

    #[test]
    fn gauss_legendre_integrates_polynomials() {
        let (x, w) = gauss_legendre(8);
        let s: f64 = w.iter().sum();
        assert!((s - 2.0).abs() < 1e-13);
        let x4: f64 = x.iter().zip(w.iter()).map(|(x, w)| w * x.powi(4)).sum();
        assert!((x4 - 0.4).abs() < 1e-13);
    }

    #[test]
    fn fourier_series_zero_matches_integral() {
        let mut p = params(1e-6, 2.0, KernelEvaluationMethod::Direct);
        p.point_domain = PointDomain::Grid;
        let series = kernel_fourier_series(64, &p).unwrap();
        assert_eq!(series.len(), 33);
        // fine trapezoid integral of the kernel
        let n = 20000;
        let hw = p.width as f64 / 2.0;
        let h = 2.0 * hw / n as f64;
        let integral: f64 = (1..n).map(|i| evaluate_kernel(-hw + i as f64 * h, &p)).sum::<f64>() * h;
        assert!((series[0] - integral).abs() < 1e-6 * integral);

        p.point_domain = PointDomain::Pi;
        let alt = kernel_fourier_series(64, &p).unwrap();
        assert_eq!(alt[0], series[0]);
        assert_eq!(alt[1], -series[1]);
        assert_eq!(alt[2], series[2]);
    }

    #[test]
    fn spread_only_scale_inverts_kernel_mass() {
        let p = KernelParams::<f64>::setup(2, 1e-6, 2.0, KernelEvaluationMethod::Auto, true, false)
            .unwrap();
        let one_d = spread_only_scale(1, p.beta, p.c);
        assert!((p.kernel_scale - one_d * one_d).abs() < 1e-12 * one_d * one_d);
        assert!(p.kernel_scale > 0.0);
    }
}
