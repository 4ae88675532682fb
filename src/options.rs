//! User-facing plan options and process-wide tuning overrides.
//!
//! [`Options`] carries per-plan choices. A few tuning knobs can also be set
//! process-wide through environment variables, read once on first use:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `NUFFT_NUM_THREADS` | default thread count when `Options::num_threads == 0` |
//! | `NUFFT_MAX_SUBPROBLEM_SIZE` | default points per spreading subproblem |
//! | `NUFFT_ATOMIC_THRESHOLD` | thread count above which grid merges use atomics |
//!
//! The `set_default_*` functions override the environment at runtime; passing
//! `0` restores it.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// How kernel values are computed during spreading and interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelEvaluationMethod {
    /// Horner when a polynomial table exists for the upsampling factor,
    /// direct otherwise.
    #[default]
    Auto,
    Direct,
    Horner,
}

/// How a batch of transforms is spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpreadThreading {
    /// Resolves to [`SpreadThreading::ParallelSingleThreaded`].
    #[default]
    Auto,
    /// One transform at a time, each spread with all threads.
    SequentialMultiThreaded,
    /// All transforms of a batch at once, each spread by a single thread.
    ParallelSingleThreaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortPoints {
    #[default]
    Auto,
    Always,
    Never,
}

/// Ordering of the uniform mode array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeOrder {
    /// `-m/2 .. (m-1)/2`.
    #[default]
    Centered,
    /// `0 .. (m-1)/2` followed by `-m/2 .. -1`.
    FftNative,
}

/// Coordinate convention of the non-uniform points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointDomain {
    /// Periodic coordinates in `[-π, π)`, accepted on `[-3π, 3π]`.
    #[default]
    Pi,
    /// Fine-grid coordinates in `[0, N)`, accepted on `[-N, 2N]`.
    Grid,
}

/// Options for [`Plan::new`](crate::plan::Plan::new).
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub kernel_evaluation_method: KernelEvaluationMethod,
    /// Grid oversampling factor σ. `0.0` picks one from the tolerance and size.
    pub upsampling_factor: f64,
    pub spread_threading: SpreadThreading,
    pub sort_points: SortPoints,
    /// Transforms executed together. `0` picks one from the thread count.
    pub max_batch_size: usize,
    /// Worker threads. `0` uses the process default.
    pub num_threads: usize,
    /// Threads used by the point sort. `0` picks one from the problem size.
    pub sort_threads: usize,
    /// Reject points outside the accepted coordinate range.
    pub check_bounds: bool,
    /// Skip the FFT and deconvolution; `execute` becomes a bare spread or
    /// interpolation onto a grid the size of the modes.
    pub spread_interp_only: bool,
    pub mode_order: ModeOrder,
    pub point_domain: PointDomain,
    /// Points per spreading subproblem. `0` uses the default for the rank.
    pub max_spread_subproblem_size: usize,
    /// Merge subgrids atomically above this many threads. `None` uses the
    /// process default (10).
    pub spread_nthr_atomic: Option<usize>,
    /// `0` silent, `1` plan summary, `2` per-stage detail.
    pub verbosity: u8,
    pub show_warnings: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            kernel_evaluation_method: KernelEvaluationMethod::Auto,
            upsampling_factor: 0.0,
            spread_threading: SpreadThreading::Auto,
            sort_points: SortPoints::Auto,
            max_batch_size: 0,
            num_threads: 0,
            sort_threads: 0,
            check_bounds: true,
            spread_interp_only: false,
            mode_order: ModeOrder::Centered,
            point_domain: PointDomain::Pi,
            max_spread_subproblem_size: 0,
            spread_nthr_atomic: None,
            verbosity: 0,
            show_warnings: false,
        }
    }
}

const DEFAULT_ATOMIC_THRESHOLD: usize = 10;

struct TuningEnv {
    threads: usize,
    max_subproblem_size: usize,
    atomic_threshold: usize,
}

static TUNING_ENV: OnceLock<TuningEnv> = OnceLock::new();
static THREADS_OVERRIDE: AtomicUsize = AtomicUsize::new(0);
static MAX_SUBPROBLEM_OVERRIDE: AtomicUsize = AtomicUsize::new(0);
static ATOMIC_THRESHOLD_OVERRIDE: AtomicUsize = AtomicUsize::new(0);

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse::<usize>().ok())
}

fn tuning_env() -> &'static TuningEnv {
    TUNING_ENV.get_or_init(|| TuningEnv {
        threads: env_usize("NUFFT_NUM_THREADS")
            .filter(|&t| t > 0)
            .unwrap_or_else(|| num_cpus::get().max(1)),
        max_subproblem_size: env_usize("NUFFT_MAX_SUBPROBLEM_SIZE").unwrap_or(0),
        atomic_threshold: env_usize("NUFFT_ATOMIC_THRESHOLD").unwrap_or(DEFAULT_ATOMIC_THRESHOLD),
    })
}

/// Override the process default thread count. `0` reverts to
/// `NUFFT_NUM_THREADS` or the number of logical CPUs.
pub fn set_default_threads(threads: usize) {
    THREADS_OVERRIDE.store(threads, Ordering::Relaxed);
}

/// Override the default spreading subproblem size for every rank. `0`
/// reverts to `NUFFT_MAX_SUBPROBLEM_SIZE` or the per-rank default.
pub fn set_default_max_subproblem_size(points: usize) {
    MAX_SUBPROBLEM_OVERRIDE.store(points, Ordering::Relaxed);
}

/// Override the default atomic-merge thread threshold. `0` reverts to
/// `NUFFT_ATOMIC_THRESHOLD` or 10.
pub fn set_default_atomic_threshold(threads: usize) {
    ATOMIC_THRESHOLD_OVERRIDE.store(threads, Ordering::Relaxed);
}

pub fn default_threads() -> usize {
    let t = THREADS_OVERRIDE.load(Ordering::Relaxed);
    if t != 0 {
        t
    } else {
        tuning_env().threads
    }
}

/// Default points per subproblem: 10 000 in 1D, 100 000 in 2D and 3D.
pub fn default_max_subproblem_size(rank: usize) -> usize {
    let o = MAX_SUBPROBLEM_OVERRIDE.load(Ordering::Relaxed);
    if o != 0 {
        return o;
    }
    let env = tuning_env().max_subproblem_size;
    if env != 0 {
        return env;
    }
    if rank == 1 {
        10_000
    } else {
        100_000
    }
}

pub fn default_atomic_threshold() -> usize {
    let o = ATOMIC_THRESHOLD_OVERRIDE.load(Ordering::Relaxed);
    if o != 0 {
        o
    } else {
        tuning_env().atomic_threshold
    }
}
