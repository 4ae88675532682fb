//! # nufft - batched non-uniform FFT for Rust
//!
//! Type-1 (non-uniform points → uniform modes) and type-2 (modes → points)
//! transforms in one, two and three dimensions, in `f32` or `f64`.
//!
//! ```text
//! type 1:  f[k] = Σ_j c[j] · exp(±i k·x_j)     k in the mode box
//! type 2:  c[j] = Σ_k f[k] · exp(±i k·x_j)     j = 0..M
//! ```
//!
//! Points are spread onto an upsampled grid with an
//! exponential-of-semicircle kernel, the grid is FFT'd, and the kernel's
//! Fourier transform is divided out (type 2 runs the same steps backwards).
//!
//! ## Features
//!
//! - **Batched**: many transforms sharing one point set run through one plan
//! - **Multithreaded**: bin-sorted points, parallel spreading with locked or
//!   atomic subgrid merges, parallel multi-dimensional FFTs (Rayon)
//! - **Kernel evaluation**: direct formula or piecewise Horner polynomials
//! - **Spread/interp only**: bypass the FFT to use the spreader on its own
//!
//! ## Example
//!
//! ```
//! use nufft::{Complex64, FftDirection, Options, Plan, TransformType};
//!
//! let x = vec![-1.0f64, 0.0, 0.5, 2.0];
//! let mut c = vec![Complex64::new(1.0, 0.0); 4];
//! let mut f = vec![Complex64::zero(); 8];
//!
//! let mut plan = Plan::new(
//!     TransformType::Type1,
//!     &[8],
//!     FftDirection::Backward,
//!     1,
//!     1e-9,
//!     Options::default(),
//! )?;
//! plan.set_points(&x, None, None)?;
//! plan.execute(&mut c, &mut f)?;
//! // the k = 0 mode is the sum of the strengths
//! assert!((f[4].re - 4.0).abs() < 1e-7);
//! # Ok::<(), nufft::NufftError>(())
//! ```
//!
//! ## Tuning
//!
//! `NUFFT_NUM_THREADS`, `NUFFT_MAX_SUBPROBLEM_SIZE` and
//! `NUFFT_ATOMIC_THRESHOLD` set process-wide defaults; see [`options`].
//! Logging goes through the [`log`] facade: plans log their configuration at
//! `Options::verbosity >= 1` and per-stage detail at `>= 2`.
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or https://www.apache.org/licenses/LICENSE-2.0)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or https://opensource.org/licenses/MIT)
//!
//! at your option.

extern crate alloc;

/// Float and complex scalar types.
pub mod num;

/// Mixed-radix complex FFT and its planner.
pub mod fft;

/// Batched, strided multi-dimensional FFTs.
pub mod ndfft;

pub mod error;
pub mod options;
pub mod runtime;

/// Spreading kernel selection and evaluation.
pub mod kernel;
pub mod grid;
pub mod sort;
pub mod spread;
pub mod deconvolve;
pub mod plan;

/// Reference sums for checking transforms.
pub mod direct;

pub use error::NufftError;
pub use fft::{FftDirection, FftError, FftImpl, FftPlanner, MixedRadixFft};
pub use ndfft::FftPlanMany;
pub use num::{Complex, Complex32, Complex64, Float};
pub use options::{
    set_default_atomic_threshold, set_default_max_subproblem_size, set_default_threads,
    KernelEvaluationMethod, ModeOrder, Options, PointDomain, SortPoints, SpreadThreading,
};
pub use plan::{Plan, TransformType};
pub use runtime::Registry;
