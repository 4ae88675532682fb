use core::f32::consts::PI as PI32;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

// Minimal float trait shared by the FFT engine and the spreader
pub trait Float:
    Copy
    + Clone
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + core::fmt::Debug
    + core::fmt::Display
    + core::ops::Add<Output = Self>
    + core::ops::Sub<Output = Self>
    + core::ops::Mul<Output = Self>
    + core::ops::Div<Output = Self>
    + core::ops::Neg<Output = Self>
    + core::ops::AddAssign
    + core::ops::MulAssign
    + 'static
{
    /// Lock-free accumulation cell with the same size and alignment as `Self`.
    type Atomic: Send + Sync;

    /// Smallest tolerance a plan in this precision will try to honour.
    const EPSILON_FLOOR: Self;

    fn zero() -> Self;
    fn one() -> Self;
    fn from_f64(x: f64) -> Self;
    fn to_f64(self) -> f64;
    fn cos(self) -> Self;
    fn sin(self) -> Self;
    fn sin_cos(self) -> (Self, Self);
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ceil(self) -> Self;
    fn abs(self) -> Self;
    fn is_finite(self) -> bool;
    fn pi() -> Self;
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    /// Truncating conversion used for grid indices. Values are always small
    /// enough to fit once coordinates have been folded.
    fn to_i64(self) -> i64;
    fn from_i64(x: i64) -> Self;

    /// Atomically add `v` to the value stored in `cell`.
    fn atomic_add(cell: &Self::Atomic, v: Self);
}

/// Method calls below resolve to the inherent `f32` methods, not back into
/// the trait.
#[allow(unconditional_recursion)]
impl Float for f32 {
    type Atomic = AtomicU32;

    const EPSILON_FLOOR: Self = 6e-8;

    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn from_f64(x: f64) -> Self {
        x as f32
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn cos(self) -> Self {
        f32::cos(self)
    }
    fn sin(self) -> Self {
        f32::sin(self)
    }
    fn sin_cos(self) -> (Self, Self) {
        f32::sin_cos(self)
    }
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
    fn exp(self) -> Self {
        f32::exp(self)
    }
    fn ceil(self) -> Self {
        f32::ceil(self)
    }
    fn abs(self) -> Self {
        f32::abs(self)
    }
    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }
    fn pi() -> Self {
        PI32
    }
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        f32::mul_add(self, a, b)
    }
    #[inline(always)]
    fn to_i64(self) -> i64 {
        self as i64
    }
    #[inline(always)]
    fn from_i64(x: i64) -> Self {
        x as f32
    }
    #[inline]
    fn atomic_add(cell: &AtomicU32, v: Self) {
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + v).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

#[allow(unconditional_recursion)]
impl Float for f64 {
    type Atomic = AtomicU64;

    const EPSILON_FLOOR: Self = 1.1e-16;

    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn from_f64(x: f64) -> Self {
        x
    }
    fn to_f64(self) -> f64 {
        self
    }
    fn cos(self) -> Self {
        f64::cos(self)
    }
    fn sin(self) -> Self {
        f64::sin(self)
    }
    fn sin_cos(self) -> (Self, Self) {
        f64::sin_cos(self)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ceil(self) -> Self {
        f64::ceil(self)
    }
    fn abs(self) -> Self {
        f64::abs(self)
    }
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
    fn pi() -> Self {
        core::f64::consts::PI
    }
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        f64::mul_add(self, a, b)
    }
    #[inline(always)]
    fn to_i64(self) -> i64 {
        self as i64
    }
    #[inline(always)]
    fn from_i64(x: i64) -> Self {
        x as f64
    }
    #[inline]
    fn atomic_add(cell: &AtomicU64, v: Self) {
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + v).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Complex<T: Float> {
    pub re: T,
    pub im: T,
}

impl<T: Float> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
    pub fn zero() -> Self {
        Self {
            re: T::zero(),
            im: T::zero(),
        }
    }
    #[inline(always)]
    pub fn expi(theta: T) -> Self {
        let (sin, cos) = theta.sin_cos();
        Self { re: cos, im: sin }
    }
    /// Multiply both parts by a real factor.
    #[inline(always)]
    pub fn scale(self, k: T) -> Self {
        Self {
            re: self.re * k,
            im: self.im * k,
        }
    }
    #[inline(always)]
    pub fn conj(self) -> Self {
        Self {
            re: self.re,
            im: -self.im,
        }
    }
    #[inline(always)]
    pub fn norm_sqr(self) -> T {
        self.re * self.re + self.im * self.im
    }
    #[allow(clippy::should_implement_trait)]
    #[inline(always)]
    pub fn mul(self, other: Self) -> Self {
        Self {
            re: self.re * other.re - self.im * other.im,
            im: self.re * other.im + self.im * other.re,
        }
    }
}

impl<T: Float> core::ops::Neg for Complex<T> {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self {
            re: -self.re,
            im: -self.im,
        }
    }
}

impl<T: Float> core::ops::Add for Complex<T> {
    type Output = Self;
    #[inline(always)]
    fn add(self, other: Self) -> Self {
        Self {
            re: self.re + other.re,
            im: self.im + other.im,
        }
    }
}

impl<T: Float> core::ops::AddAssign for Complex<T> {
    #[inline(always)]
    fn add_assign(&mut self, other: Self) {
        self.re += other.re;
        self.im += other.im;
    }
}

impl<T: Float> core::ops::Sub for Complex<T> {
    type Output = Self;
    #[inline(always)]
    fn sub(self, other: Self) -> Self {
        Self {
            re: self.re - other.re,
            im: self.im - other.im,
        }
    }
}

impl<T: Float> core::ops::Mul for Complex<T> {
    type Output = Self;
    #[inline(always)]
    fn mul(self, other: Self) -> Self {
        Complex::<T>::mul(self, other)
    }
}

pub type Complex32 = Complex<f32>;
pub type Complex64 = Complex<f64>;

/// View an exclusively borrowed complex buffer as interleaved atomic cells
/// (`re`, `im`, `re`, `im`, ...).
///
/// Hands the buffer back unchanged when the platform aligns `T::Atomic` more
/// strictly than `T` and the buffer does not happen to satisfy it; callers
/// fall back to a locked merge in that case.
pub fn as_atomic_cells<T: Float>(data: &mut [Complex<T>]) -> Result<&[T::Atomic], &mut [Complex<T>]> {
    if core::mem::size_of::<T::Atomic>() != core::mem::size_of::<T>() {
        return Err(data);
    }
    let ptr = data.as_mut_ptr() as *const T::Atomic;
    if (ptr as usize) % core::mem::align_of::<T::Atomic>() != 0 {
        return Err(data);
    }
    // SAFETY: `Complex<T>` is `repr(C)` with two `T` fields, so the buffer is
    // `2 * len` contiguous `T` values. The atomic has the same size and the
    // alignment was checked above. The exclusive borrow guarantees no other
    // non-atomic access exists for the returned lifetime.
    Ok(unsafe { core::slice::from_raw_parts(ptr, data.len() * 2) })
}
