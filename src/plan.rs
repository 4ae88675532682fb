//! Plan creation and execution.
//!
//! A [`Plan`] fixes the transform type, mode counts, batch and tolerance.
//! [`Plan::set_points`] binds (and bin-sorts) the non-uniform points, after
//! which [`Plan::execute`] can run any number of times:
//!
//! * type 1: spread → FFT → deconvolve
//! * type 2: deconvolve → FFT → interpolate
//!
//! Transforms are processed `batch_size` at a time through one fine grid.

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::debug;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::deconvolve::{deconvolve_shuffle, ShuffleShape};
use crate::error::{try_zeroed, NufftError};
use crate::fft::{FftDirection, FftPlanner};
use crate::grid::{auto_upsampling_factor, check_bounds, checked_array_size, fine_grid_size};
use crate::kernel::{kernel_fourier_series, KernelEvaluator, KernelParams, SpreadDirection};
use crate::ndfft::FftPlanMany;
use crate::num::{Complex, Float};
use crate::options::{
    default_atomic_threshold, default_max_subproblem_size, default_threads, Options,
    SpreadThreading,
};
use crate::runtime::Registry;
use crate::sort::{bin_sort_points, PointSet};
use crate::spread::Spreader;

/// Direction of a non-uniform transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformType {
    /// Non-uniform points to uniform modes.
    Type1,
    /// Uniform modes to non-uniform points.
    Type2,
    /// Non-uniform to non-uniform. Not supported.
    Type3,
}

/// A configured NUFFT of rank 1, 2 or 3.
pub struct Plan<'a, T: Float> {
    transform_type: TransformType,
    rank: usize,
    modes: [usize; 3],
    mode_count: usize,
    num_transforms: usize,
    options: Options,
    params: KernelParams<T>,
    kernel: Box<dyn KernelEvaluator<T>>,
    grid_dims: [usize; 3],
    grid_size: usize,
    batch_size: usize,
    num_batches: usize,
    fseries: [Vec<T>; 3],
    fft: Option<FftPlanMany<T>>,
    fine_grid: Vec<Complex<T>>,
    points: Option<PointSet<'a, T>>,
    sort_indices: Vec<usize>,
    did_sort: bool,
    pool: Arc<ThreadPool>,
    num_threads: usize,
}

/// Borrowed view of everything a spread or interpolation pass needs.
struct SpreadStage<'s, T: Float> {
    spreader: Spreader<'s, T>,
    perm: &'s [usize],
    did_sort: bool,
    points: PointSet<'s, T>,
    num_points: usize,
    grid_size: usize,
    threads: usize,
    threading: SpreadThreading,
}

impl<'s, T: Float> SpreadStage<'s, T> {
    fn inner_threads(&self, count: usize) -> usize {
        if self.threading == SpreadThreading::SequentialMultiThreaded || count == 1 {
            self.threads
        } else {
            1
        }
    }

    /// Spread `count` strength vectors onto `count` consecutive grids.
    fn spread(&self, weights: &[Complex<T>], grids: &mut [Complex<T>], count: usize) {
        let m = self.num_points;
        let grids = &mut grids[..count * self.grid_size];
        if m == 0 {
            grids.fill(Complex::zero());
            return;
        }
        let weights = &weights[..count * m];
        let inner = self.inner_threads(count);
        if inner > 1 || count == 1 {
            for (g, w) in grids.chunks_mut(self.grid_size).zip(weights.chunks(m)) {
                self.spreader.spread(self.perm, self.did_sort, &self.points, w, g, inner);
            }
        } else {
            grids
                .par_chunks_mut(self.grid_size)
                .zip(weights.par_chunks(m))
                .for_each(|(g, w)| {
                    self.spreader.spread(self.perm, self.did_sort, &self.points, w, g, 1);
                });
        }
    }

    /// Interpolate `count` consecutive grids onto the points.
    fn interp(&self, grids: &[Complex<T>], out: &mut [Complex<T>], count: usize) {
        let m = self.num_points;
        if m == 0 {
            return;
        }
        let grids = &grids[..count * self.grid_size];
        let out = &mut out[..count * m];
        let inner = self.inner_threads(count);
        if inner > 1 || count == 1 {
            for (g, o) in grids.chunks(self.grid_size).zip(out.chunks_mut(m)) {
                self.spreader.interp(self.perm, &self.points, g, o, inner);
            }
        } else {
            grids
                .par_chunks(self.grid_size)
                .zip(out.par_chunks_mut(m))
                .for_each(|(g, o)| self.spreader.interp(self.perm, &self.points, g, o, 1));
        }
    }
}

impl<'a, T: Float> Plan<'a, T> {
    /// Configure a plan.
    ///
    /// `modes` holds one mode count per dimension (x first). `direction`
    /// is the sign of the exponent in the transform. `tol` is the requested
    /// relative accuracy.
    pub fn new(
        transform_type: TransformType,
        modes: &[usize],
        direction: FftDirection,
        num_transforms: usize,
        tol: f64,
        options: Options,
    ) -> Result<Self, NufftError> {
        if transform_type == TransformType::Type3 {
            return Err(NufftError::unimplemented("type-3 transforms are not supported"));
        }
        let rank = modes.len();
        if rank == 0 {
            return Err(NufftError::invalid("at least one mode count is required"));
        }
        if rank > 3 {
            return Err(NufftError::unimplemented(format!(
                "rank {} transforms are not supported, rank must be 1, 2 or 3",
                rank
            )));
        }
        if num_transforms < 1 {
            return Err(NufftError::invalid("number of transforms must be at least 1"));
        }
        if let Some(d) = modes.iter().position(|&m| m == 0) {
            return Err(NufftError::invalid(format!("mode count for axis {} is zero", d)));
        }
        if !(tol > 0.0) || !tol.is_finite() {
            return Err(NufftError::invalid(format!(
                "tolerance must be positive and finite, got {}",
                tol
            )));
        }

        let mut options = options;
        let mut mode_arr = [1usize; 3];
        mode_arr[..rank].copy_from_slice(modes);
        let mode_count = checked_array_size(&mode_arr, "mode array")?;

        let num_threads = if options.num_threads > 0 {
            options.num_threads
        } else {
            default_threads()
        };

        let (batch_size, num_batches) = if options.max_batch_size == 0 {
            let num_batches = 1 + (num_transforms - 1) / num_threads;
            (1 + (num_transforms - 1) / num_batches, num_batches)
        } else {
            let batch = options.max_batch_size.min(num_transforms);
            (batch, 1 + (num_transforms - 1) / batch)
        };

        if options.spread_threading == SpreadThreading::Auto {
            options.spread_threading = SpreadThreading::ParallelSingleThreaded;
        }
        if options.upsampling_factor == 0.0 {
            options.upsampling_factor = auto_upsampling_factor(rank, tol, mode_count);
        }

        let mut params = KernelParams::<T>::setup(
            rank,
            tol,
            options.upsampling_factor,
            options.kernel_evaluation_method,
            options.spread_interp_only,
            options.show_warnings,
        )?;
        params.sort_points = options.sort_points;
        params.sort_threads = options.sort_threads;
        params.num_threads = num_threads;
        params.check_bounds = options.check_bounds;
        params.point_domain = options.point_domain;
        params.verbosity = options.verbosity;
        params.atomic_threshold = options
            .spread_nthr_atomic
            .unwrap_or_else(default_atomic_threshold);
        params.max_subproblem_size = if options.max_spread_subproblem_size > 0 {
            options.max_spread_subproblem_size
        } else {
            default_max_subproblem_size(rank)
        };
        params.spread_direction = match transform_type {
            TransformType::Type1 => SpreadDirection::Spread,
            _ => SpreadDirection::Interp,
        };

        let mut grid_dims = [1usize; 3];
        for d in 0..rank {
            grid_dims[d] = fine_grid_size(
                mode_arr[d],
                options.upsampling_factor,
                params.width,
                options.spread_interp_only,
            )?;
        }
        let grid_size = checked_array_size(&grid_dims, "fine grid")?;
        let batched_size = checked_array_size(&[grid_size, batch_size], "batched fine grid")?;

        let kernel = params.evaluator()?;

        let (fseries, fft, fine_grid) = if options.spread_interp_only {
            ([Vec::new(), Vec::new(), Vec::new()], None, Vec::new())
        } else {
            let fine_grid = try_zeroed(batched_size, Complex::zero(), "fine grid")?;
            let mut fseries = [Vec::new(), Vec::new(), Vec::new()];
            for d in 0..rank {
                fseries[d] = kernel_fourier_series(grid_dims[d], &params)?;
            }
            let fft_dims: Vec<usize> = grid_dims[..rank].iter().rev().copied().collect();
            let mut planner = FftPlanner::new();
            let fft = FftPlanMany::new(&mut planner, &fft_dims, batch_size, direction)?;
            (fseries, Some(fft), fine_grid)
        };

        let pool = Registry::global().acquire(num_threads)?;

        if options.verbosity >= 1 {
            debug!(
                "{:?} rank {} plan: modes {:?}, {} transform(s) in {} batch(es) of {}, \
                 sigma {}, width {}, beta {}, grid {:?}, {} thread(s)",
                transform_type,
                rank,
                &mode_arr[..rank],
                num_transforms,
                num_batches,
                batch_size,
                options.upsampling_factor,
                params.width,
                params.beta,
                &grid_dims[..rank],
                num_threads
            );
        }

        Ok(Self {
            transform_type,
            rank,
            modes: mode_arr,
            mode_count,
            num_transforms,
            options,
            params,
            kernel,
            grid_dims,
            grid_size,
            batch_size,
            num_batches,
            fseries,
            fft,
            fine_grid,
            points: None,
            sort_indices: Vec::new(),
            did_sort: false,
            pool,
            num_threads,
        })
    }

    /// Bind the non-uniform points and sort them for spreading.
    ///
    /// `y` is required for rank ≥ 2 and `z` for rank 3; all coordinate
    /// slices must have the same length. The slices stay borrowed until the
    /// plan is dropped or new points are set.
    pub fn set_points(
        &mut self,
        x: &'a [T],
        y: Option<&'a [T]>,
        z: Option<&'a [T]>,
    ) -> Result<(), NufftError> {
        let m = x.len();
        let axes = [Some(x), y, z];
        for (d, (axis, name)) in axes.iter().zip(['x', 'y', 'z']).enumerate() {
            match axis {
                Some(_) if d >= self.rank => {
                    return Err(NufftError::invalid(format!(
                        "{} coordinates given for a rank {} plan",
                        name, self.rank
                    )));
                }
                Some(pts) if pts.len() != m => {
                    return Err(NufftError::invalid(format!(
                        "{} has {} points but x has {}",
                        name,
                        pts.len(),
                        m
                    )));
                }
                None if d < self.rank => {
                    return Err(NufftError::invalid(format!(
                        "{} coordinates are required for a rank {} plan",
                        name, self.rank
                    )));
                }
                _ => {}
            }
        }

        debug_assert!(self.grid_dims[..self.rank]
            .iter()
            .all(|&n| n >= 2 * self.params.width));
        if self.params.check_bounds {
            for (d, (axis, name)) in axes.iter().zip(['x', 'y', 'z']).enumerate().take(self.rank) {
                if let Some(pts) = axis {
                    check_bounds(pts, self.grid_dims[d], self.params.point_domain, name)?;
                }
            }
        }

        let points = PointSet { x, y, z };
        let params = &self.params;
        let dims = self.grid_dims;
        let (perm, did_sort) = self.pool.install(|| bin_sort_points(&points, dims, params));
        if self.params.verbosity >= 1 {
            debug!("set {} points, sorted: {}", m, did_sort);
        }
        self.sort_indices = perm;
        self.did_sort = did_sort;
        self.points = Some(points);
        Ok(())
    }

    fn stage(&self) -> Result<SpreadStage<'_, T>, NufftError> {
        let points = self
            .points
            .ok_or_else(|| NufftError::invalid("points must be set before execution"))?;
        Ok(SpreadStage {
            spreader: Spreader::new(&self.params, self.kernel.as_ref(), self.grid_dims, self.rank),
            perm: &self.sort_indices,
            did_sort: self.did_sort,
            points,
            num_points: points.len(),
            grid_size: self.grid_size,
            threads: self.num_threads,
            threading: self.options.spread_threading,
        })
    }

    fn check_len(what: &str, got: usize, want: usize) -> Result<(), NufftError> {
        if got != want {
            return Err(NufftError::invalid(format!(
                "{} has {} elements, expected {}",
                what, got, want
            )));
        }
        Ok(())
    }

    /// Run all transforms.
    ///
    /// `weights` holds `num_transforms × M` values at the points and `modes`
    /// `num_transforms × mode_count` uniform coefficients (x fastest). Type 1
    /// reads `weights` and writes `modes`; type 2 the reverse.
    pub fn execute(
        &mut self,
        weights: &mut [Complex<T>],
        modes: &mut [Complex<T>],
    ) -> Result<(), NufftError> {
        if self.points.is_none() {
            return Err(NufftError::invalid("points must be set before execution"));
        }
        let m = self.num_points();
        Self::check_len("weights", weights.len(), self.num_transforms * m)?;
        Self::check_len("modes", modes.len(), self.num_transforms * self.mode_count)?;

        if self.options.spread_interp_only {
            return match self.transform_type {
                TransformType::Type1 => self.spread_values(weights, modes),
                _ => self.interpolate(modes, weights),
            };
        }

        let mut fine_grid = core::mem::take(&mut self.fine_grid);
        let result = self.run_batches(&mut fine_grid, weights, modes);
        self.fine_grid = fine_grid;
        result
    }

    fn run_batches(
        &self,
        fine_grid: &mut [Complex<T>],
        weights: &mut [Complex<T>],
        modes: &mut [Complex<T>],
    ) -> Result<(), NufftError> {
        let stage = self.stage()?;
        let fft = self
            .fft
            .as_ref()
            .ok_or_else(|| NufftError::internal("plan has no FFT"))?;
        let m = stage.num_points;
        let mc = self.mode_count;
        let ng = self.grid_size;
        let shape = ShuffleShape {
            rank: self.rank,
            modes: self.modes,
            grid: self.grid_dims,
            kernel: [
                self.fseries[0].as_slice(),
                self.fseries[1].as_slice(),
                self.fseries[2].as_slice(),
            ],
            order: self.options.mode_order,
        };
        let direction = self.params.spread_direction;
        let verbose = self.options.verbosity >= 2;

        self.pool.install(|| -> Result<(), NufftError> {
            for b in 0..self.num_batches {
                let first = b * self.batch_size;
                let count = self.batch_size.min(self.num_transforms - first);
                let w = &mut weights[first * m..(first + count) * m];
                let f = &mut modes[first * mc..(first + count) * mc];
                let grid = &mut fine_grid[..count * ng];
                match direction {
                    SpreadDirection::Spread => {
                        stage.spread(w, grid, count);
                        fft.execute_batch(grid, count)?;
                        grid.par_chunks_mut(ng)
                            .zip(f.par_chunks_mut(mc))
                            .for_each(|(g, fk)| {
                                deconvolve_shuffle(direction, T::one(), &shape, fk, g);
                            });
                    }
                    SpreadDirection::Interp => {
                        grid.par_chunks_mut(ng)
                            .zip(f.par_chunks_mut(mc))
                            .for_each(|(g, fk)| {
                                deconvolve_shuffle(direction, T::one(), &shape, fk, g);
                            });
                        fft.execute_batch(grid, count)?;
                        stage.interp(grid, w, count);
                    }
                }
                if verbose {
                    debug!("batch {} done ({} transform(s))", b, count);
                }
            }
            Ok(())
        })
    }

    /// Interpolate uniform grids directly onto the points, skipping the FFT
    /// and deconvolution. Type-2 plans only.
    ///
    /// `grid` holds `num_transforms × grid_size` values and `out`
    /// `num_transforms × M`.
    pub fn interpolate(
        &mut self,
        grid: &[Complex<T>],
        out: &mut [Complex<T>],
    ) -> Result<(), NufftError> {
        if self.params.spread_direction != SpreadDirection::Interp {
            return Err(NufftError::invalid("interpolate requires a type-2 plan"));
        }
        let stage = self.stage()?;
        Self::check_len("grid", grid.len(), self.num_transforms * self.grid_size)?;
        Self::check_len("output", out.len(), self.num_transforms * stage.num_points)?;
        let ng = self.grid_size;
        let m = stage.num_points;
        self.pool.install(|| {
            for b in 0..self.num_batches {
                let first = b * self.batch_size;
                let count = self.batch_size.min(self.num_transforms - first);
                stage.interp(
                    &grid[first * ng..(first + count) * ng],
                    &mut out[first * m..(first + count) * m],
                    count,
                );
            }
        });
        Ok(())
    }

    /// Spread strengths directly onto uniform grids, skipping the FFT and
    /// deconvolution. Type-1 plans only.
    ///
    /// `weights` holds `num_transforms × M` values and `grid`
    /// `num_transforms × grid_size`.
    pub fn spread_values(
        &mut self,
        weights: &[Complex<T>],
        grid: &mut [Complex<T>],
    ) -> Result<(), NufftError> {
        if self.params.spread_direction != SpreadDirection::Spread {
            return Err(NufftError::invalid("spread_values requires a type-1 plan"));
        }
        let stage = self.stage()?;
        Self::check_len("weights", weights.len(), self.num_transforms * stage.num_points)?;
        Self::check_len("grid", grid.len(), self.num_transforms * self.grid_size)?;
        let ng = self.grid_size;
        let m = stage.num_points;
        self.pool.install(|| {
            for b in 0..self.num_batches {
                let first = b * self.batch_size;
                let count = self.batch_size.min(self.num_transforms - first);
                stage.spread(
                    &weights[first * m..(first + count) * m],
                    &mut grid[first * ng..(first + count) * ng],
                    count,
                );
            }
        });
        Ok(())
    }

    /// Release the plan. Equivalent to dropping it.
    pub fn destroy(self) {}

    pub fn transform_type(&self) -> TransformType {
        self.transform_type
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Fine-grid length per active axis.
    pub fn grid_dims(&self) -> &[usize] {
        &self.grid_dims[..self.rank]
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    pub fn num_transforms(&self) -> usize {
        self.num_transforms
    }

    pub fn mode_count(&self) -> usize {
        self.mode_count
    }

    pub fn kernel_params(&self) -> &KernelParams<T> {
        &self.params
    }

    pub fn did_sort(&self) -> bool {
        self.did_sort
    }

    /// Visiting order of the points (identity when not sorted).
    pub fn sort_indices(&self) -> &[usize] {
        &self.sort_indices
    }

    pub fn num_points(&self) -> usize {
        self.points.as_ref().map_or(0, |p| p.len())
    }

    /// Options after automatic choices were resolved.
    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl<'a, T: Float> Drop for Plan<'a, T> {
    fn drop(&mut self) {
        if self.options.verbosity >= 1 {
            debug!("releasing {:?} rank {} plan", self.transform_type, self.rank);
        }
    }
}
