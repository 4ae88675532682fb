//! Complex FFT engine used by the NUFFT plans.
//!
//! This module implements a recursive mixed-radix
//! [Cooley–Tukey](https://en.wikipedia.org/wiki/Cooley%E2%80%93Tukey_FFT_algorithm)
//! transform with specialised radix-2 and radix-4 butterflies and a generic
//! butterfly for every other factor. Fine-grid lengths produced by the planner
//! only contain the factors 2, 3 and 5, which is the fast path; any other
//! length still works through the generic butterfly.
//!
//! An [`FftPlanner`] caches immutable [`MixedRadixFft`] plans so the same length
//! is never factorised or twiddled twice. Plans are `Send + Sync` and can be
//! shared by rayon workers.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;

pub use crate::num::{Complex, Complex32, Complex64, Float};

/// Largest factor handled with a stack scratch array in the generic butterfly.
const STACK_RADIX: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftError {
    EmptyInput,
    MismatchedLengths,
    InvalidStride,
    InvalidValue,
    /// Twiddle or scratch storage could not be allocated.
    AllocationFailed,
}

impl fmt::Display for FftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FftError::EmptyInput => write!(f, "input slice is empty"),
            FftError::MismatchedLengths => write!(f, "buffer length does not match the plan"),
            FftError::InvalidStride => write!(f, "stride or distance is inconsistent with the buffer"),
            FftError::InvalidValue => write!(f, "invalid transform parameter"),
            FftError::AllocationFailed => write!(f, "cannot allocate transform storage"),
        }
    }
}

impl std::error::Error for FftError {}

/// Sign of the exponent in `exp(±2πi jk/n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FftDirection {
    /// Negative exponent.
    #[default]
    Forward,
    /// Positive exponent. Unnormalised.
    Backward,
}

impl FftDirection {
    /// The exponent sign as an integer, `-1` or `+1`.
    pub fn sign(self) -> i32 {
        match self {
            FftDirection::Forward => -1,
            FftDirection::Backward => 1,
        }
    }
}

/// In-place 1D transform of a fixed length.
pub trait FftImpl<T: Float>: Send + Sync {
    /// Transform length.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of scratch elements [`process_with_scratch`](Self::process_with_scratch) needs.
    fn scratch_len(&self) -> usize {
        self.len()
    }

    /// Unnormalised in-place transform using caller-provided scratch.
    fn process_with_scratch(
        &self,
        buffer: &mut [Complex<T>],
        scratch: &mut [Complex<T>],
        direction: FftDirection,
    ) -> Result<(), FftError>;

    /// Forward transform; allocates its own scratch.
    fn fft(&self, buffer: &mut [Complex<T>]) -> Result<(), FftError> {
        let mut scratch = vec![Complex::zero(); self.scratch_len()];
        self.process_with_scratch(buffer, &mut scratch, FftDirection::Forward)
    }

    /// Backward transform scaled by `1/n`, so that `ifft(fft(x)) == x`.
    fn ifft(&self, buffer: &mut [Complex<T>]) -> Result<(), FftError> {
        let mut scratch = vec![Complex::zero(); self.scratch_len()];
        self.process_with_scratch(buffer, &mut scratch, FftDirection::Backward)?;
        let scale = T::one() / T::from_f64(self.len() as f64);
        for c in buffer.iter_mut() {
            *c = c.scale(scale);
        }
        Ok(())
    }
}

/// Precomputed factorisation and twiddles for one transform length.
#[derive(Debug)]
pub struct MixedRadixFft<T: Float> {
    n: usize,
    /// `(radix, remaining length)` pairs, outermost first.
    factors: Vec<(usize, usize)>,
    /// `exp(-2πi k / n)` for `k = 0..n`.
    twiddles: Vec<Complex<T>>,
}

impl<T: Float> MixedRadixFft<T> {
    pub fn new(n: usize) -> Result<Self, FftError> {
        if n == 0 {
            return Err(FftError::EmptyInput);
        }
        let mut factors = Vec::new();
        let mut remaining = n;
        for p in factorize(n) {
            remaining /= p;
            factors.push((p, remaining));
        }
        let step = -2.0 * core::f64::consts::PI / n as f64;
        let mut twiddles = Vec::new();
        twiddles
            .try_reserve_exact(n)
            .map_err(|_| FftError::AllocationFailed)?;
        twiddles.extend((0..n).map(|k| {
            let (s, c) = (step * k as f64).sin_cos();
            Complex::new(T::from_f64(c), T::from_f64(s))
        }));
        Ok(Self {
            n,
            factors,
            twiddles,
        })
    }

    #[inline(always)]
    fn twiddle(&self, idx: usize, inverse: bool) -> Complex<T> {
        let w = self.twiddles[idx];
        if inverse {
            w.conj()
        } else {
            w
        }
    }

    fn work(
        &self,
        out: &mut [Complex<T>],
        input: &[Complex<T>],
        in_start: usize,
        fstride: usize,
        level: usize,
        inverse: bool,
    ) {
        let (p, m) = self.factors[level];
        if m == 1 {
            for (q, o) in out.iter_mut().take(p).enumerate() {
                *o = input[in_start + q * fstride];
            }
        } else {
            for q in 0..p {
                self.work(
                    &mut out[q * m..(q + 1) * m],
                    input,
                    in_start + q * fstride,
                    fstride * p,
                    level + 1,
                    inverse,
                );
            }
        }
        match p {
            2 => self.butterfly2(out, fstride, m, inverse),
            4 => self.butterfly4(out, fstride, m, inverse),
            _ => self.butterfly_generic(out, fstride, p, m, inverse),
        }
    }

    fn butterfly2(&self, out: &mut [Complex<T>], fstride: usize, m: usize, inverse: bool) {
        let (lo, hi) = out.split_at_mut(m);
        for k in 0..m {
            let t = hi[k].mul(self.twiddle(k * fstride, inverse));
            hi[k] = lo[k] - t;
            lo[k] += t;
        }
    }

    fn butterfly4(&self, out: &mut [Complex<T>], fstride: usize, m: usize, inverse: bool) {
        for k in 0..m {
            let s0 = out[k + m].mul(self.twiddle(k * fstride, inverse));
            let s1 = out[k + 2 * m].mul(self.twiddle(2 * k * fstride, inverse));
            let s2 = out[k + 3 * m].mul(self.twiddle(3 * k * fstride, inverse));
            let s5 = out[k] - s1;
            let a = out[k] + s1;
            let s3 = s0 + s2;
            let s4 = s0 - s2;
            out[k + 2 * m] = a - s3;
            out[k] = a + s3;
            if inverse {
                out[k + m] = Complex::new(s5.re - s4.im, s5.im + s4.re);
                out[k + 3 * m] = Complex::new(s5.re + s4.im, s5.im - s4.re);
            } else {
                out[k + m] = Complex::new(s5.re + s4.im, s5.im - s4.re);
                out[k + 3 * m] = Complex::new(s5.re - s4.im, s5.im + s4.re);
            }
        }
    }

    fn butterfly_generic(
        &self,
        out: &mut [Complex<T>],
        fstride: usize,
        p: usize,
        m: usize,
        inverse: bool,
    ) {
        let mut stack = [Complex::<T>::zero(); STACK_RADIX];
        let mut heap = Vec::new();
        let scratch: &mut [Complex<T>] = if p <= STACK_RADIX {
            &mut stack[..p]
        } else {
            heap.resize(p, Complex::zero());
            &mut heap
        };
        for u in 0..m {
            for (q1, s) in scratch.iter_mut().enumerate() {
                *s = out[u + q1 * m];
            }
            for q1 in 0..p {
                let k = u + q1 * m;
                let mut twidx = 0;
                let mut acc = scratch[0];
                for &s in scratch.iter().skip(1) {
                    twidx += fstride * k;
                    if twidx >= self.n {
                        twidx -= self.n;
                    }
                    acc += s.mul(self.twiddle(twidx, inverse));
                }
                out[k] = acc;
            }
        }
    }
}

impl<T: Float> FftImpl<T> for MixedRadixFft<T> {
    fn len(&self) -> usize {
        self.n
    }

    fn process_with_scratch(
        &self,
        buffer: &mut [Complex<T>],
        scratch: &mut [Complex<T>],
        direction: FftDirection,
    ) -> Result<(), FftError> {
        if buffer.len() != self.n || scratch.len() < self.n {
            return Err(FftError::MismatchedLengths);
        }
        if self.n == 1 {
            return Ok(());
        }
        let scratch = &mut scratch[..self.n];
        scratch.copy_from_slice(buffer);
        self.work(
            buffer,
            scratch,
            0,
            1,
            0,
            direction == FftDirection::Backward,
        );
        Ok(())
    }
}

/// Cache of [`MixedRadixFft`] plans keyed by length.
pub struct FftPlanner<T: Float> {
    cache: HashMap<usize, Arc<MixedRadixFft<T>>>,
}

impl<T: Float> Default for FftPlanner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> FftPlanner<T> {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Retrieve (building on first use) the plan for length `n`.
    pub fn plan(&mut self, n: usize) -> Result<Arc<MixedRadixFft<T>>, FftError> {
        if let Some(plan) = self.cache.get(&n) {
            return Ok(Arc::clone(plan));
        }
        let plan = Arc::new(MixedRadixFft::new(n)?);
        self.cache.insert(n, Arc::clone(&plan));
        Ok(plan)
    }

    /// Number of distinct lengths planned so far.
    pub fn cached_lengths(&self) -> usize {
        self.cache.len()
    }
}

/// Split `n` into radices, preferring 4, then 2, 3, 5 and remaining odd primes.
fn factorize(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    while n % 4 == 0 && n > 4 {
        factors.push(4);
        n /= 4;
    }
    for &p in &[4, 2, 3, 5] {
        while n % p == 0 && n > 1 {
            factors.push(p);
            n /= p;
        }
    }
    let mut f = 7;
    while f * f <= n {
        while n % f == 0 {
            factors.push(f);
            n /= f;
        }
        f += 2;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}
