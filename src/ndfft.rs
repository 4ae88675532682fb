//! Batched multi-dimensional FFT (rank 1–3)
//!
//! - Row-column algorithm over each axis, last axis first
//! - Element stride and transform distance, in the usual "plan many" layout
//! - Lines of one axis are transformed in parallel with rayon

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use rayon::prelude::*;

use crate::fft::{Complex, FftDirection, FftError, FftImpl, FftPlanner, Float, MixedRadixFft};

/// Below this many elements per line batch the axis pass stays on one thread.
const PAR_MIN_ELEMENTS: usize = 4096;

/// A plan for `howmany` rank-1..3 transforms of the same shape.
///
/// Element `(i0, i1, i2)` of transform `b` lives at
/// `b * dist + (i0 * n1 * n2 + i1 * n2 + i2) * stride`; `dims[0]` varies
/// slowest.
pub struct FftPlanMany<T: Float> {
    dims: Vec<usize>,
    howmany: usize,
    stride: usize,
    dist: usize,
    direction: FftDirection,
    axes: Vec<Arc<MixedRadixFft<T>>>,
}

impl<T: Float> FftPlanMany<T> {
    /// Contiguous layout: `stride = 1`, `dist = product(dims)`.
    pub fn new(
        planner: &mut FftPlanner<T>,
        dims: &[usize],
        howmany: usize,
        direction: FftDirection,
    ) -> Result<Self, FftError> {
        let total = dims.iter().product();
        Self::with_layout(planner, dims, howmany, 1, total, direction)
    }

    pub fn with_layout(
        planner: &mut FftPlanner<T>,
        dims: &[usize],
        howmany: usize,
        stride: usize,
        dist: usize,
        direction: FftDirection,
    ) -> Result<Self, FftError> {
        if dims.is_empty() || dims.len() > 3 {
            return Err(FftError::InvalidValue);
        }
        if dims.iter().any(|&n| n == 0) || howmany == 0 {
            return Err(FftError::EmptyInput);
        }
        let total: usize = dims.iter().product();
        if stride == 0 || (howmany > 1 && dist < total * stride) {
            return Err(FftError::InvalidStride);
        }
        let axes = dims
            .iter()
            .map(|&n| planner.plan(n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dims: dims.to_vec(),
            howmany,
            stride,
            dist,
            direction,
            axes,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn howmany(&self) -> usize {
        self.howmany
    }

    pub fn direction(&self) -> FftDirection {
        self.direction
    }

    /// Number of elements in one transform.
    pub fn transform_len(&self) -> usize {
        self.dims.iter().product()
    }

    /// Transform all `howmany` arrays in place.
    pub fn execute(&self, data: &mut [Complex<T>]) -> Result<(), FftError> {
        self.execute_batch(data, self.howmany)
    }

    /// Transform only the first `count` arrays in place.
    pub fn execute_batch(&self, data: &mut [Complex<T>], count: usize) -> Result<(), FftError> {
        if count > self.howmany {
            return Err(FftError::InvalidValue);
        }
        if count == 0 {
            return Ok(());
        }
        let span = (self.transform_len() - 1) * self.stride + 1;
        if data.len() < (count - 1) * self.dist + span {
            return Err(FftError::MismatchedLengths);
        }
        let mut lines = Vec::new();
        for b in 0..count {
            let start = b * self.dist;
            let one = &mut data[start..start + span];
            for axis in (0..self.dims.len()).rev() {
                self.transform_axis(one, axis, &mut lines)?;
            }
        }
        Ok(())
    }

    fn transform_axis(
        &self,
        data: &mut [Complex<T>],
        axis: usize,
        lines: &mut Vec<Complex<T>>,
    ) -> Result<(), FftError> {
        let n = self.dims[axis];
        if n == 1 {
            return Ok(());
        }
        let fft = &self.axes[axis];
        let direction = self.direction;
        let inner: usize = self.dims[axis + 1..].iter().product();
        let outer: usize = self.dims[..axis].iter().product();
        let count = outer * inner;
        let min_len = (PAR_MIN_ELEMENTS / n).max(1);

        if inner == 1 && self.stride == 1 {
            return data[..count * n]
                .par_chunks_mut(n)
                .with_min_len(min_len)
                .try_for_each_init(
                    || vec![Complex::zero(); fft.scratch_len()],
                    |scratch, line| fft.process_with_scratch(line, scratch, direction),
                );
        }

        let stride = self.stride;
        lines.clear();
        lines.resize(count * n, Complex::zero());
        {
            let src: &[Complex<T>] = data;
            lines
                .par_chunks_mut(n)
                .with_min_len(min_len)
                .enumerate()
                .try_for_each_init(
                    || vec![Complex::zero(); fft.scratch_len()],
                    |scratch, (l, line)| {
                        let base = (l / inner) * n * inner + l % inner;
                        for (j, v) in line.iter_mut().enumerate() {
                            *v = src[(base + j * inner) * stride];
                        }
                        fft.process_with_scratch(line, scratch, direction)
                    },
                )?;
        }
        for (l, line) in lines.chunks(n).enumerate() {
            let base = (l / inner) * n * inner + l % inner;
            for (j, &v) in line.iter().enumerate() {
                data[(base + j * inner) * stride] = v;
            }
        }
        Ok(())
    }
}
