//! Spreading non-uniform strengths onto the fine grid and interpolating the
//! fine grid back onto non-uniform points.
//!
//! Spreading splits the (sorted) points into contiguous subproblems. Each
//! subproblem is spread into a private subgrid covering just its points and
//! then added into the periodic fine grid. Concurrent merges are serialised
//! by a mutex, or done with per-element atomic adds once the thread count
//! passes `KernelParams::atomic_threshold`.

use alloc::vec::Vec;
use std::sync::Mutex;

use log::debug;
use rayon::prelude::*;

use crate::grid::fold_rescale;
use crate::kernel::{KernelEvaluator, KernelParams, MAX_KERNEL_WIDTH};
use crate::num::{as_atomic_cells, Complex, Float};
use crate::sort::PointSet;

/// Targets interpolated per work item.
const INTERP_CHUNK: usize = 16;

/// Box of fine-grid indices touched by one subproblem.
///
/// Offsets may be negative or run past the grid end; they are wrapped when
/// the subgrid is merged. Inactive axes have offset 0 and size 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subgrid {
    pub offset: [i64; 3],
    pub size: [usize; 3],
}

impl Subgrid {
    /// Smallest box holding the kernel footprint of every folded coordinate.
    pub fn bounding<T: Float>(coords: [&[T]; 3], rank: usize, width: usize) -> Self {
        let half = T::from_f64(width as f64 / 2.0);
        let mut offset = [0i64; 3];
        let mut size = [1usize; 3];
        for d in 0..rank {
            let c = coords[d];
            if c.is_empty() {
                continue;
            }
            let mut lo = c[0];
            let mut hi = c[0];
            for &v in &c[1..] {
                if v < lo {
                    lo = v;
                }
                if v > hi {
                    hi = v;
                }
            }
            let start = (lo - half).ceil().to_i64();
            let end = (hi - half).ceil().to_i64();
            offset[d] = start;
            size[d] = (end - start) as usize + width;
        }
        Self { offset, size }
    }

    pub fn len(&self) -> usize {
        self.size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-thread working storage, reused across subproblems.
struct Scratch<T: Float> {
    folded: [Vec<T>; 3],
    subgrid: Vec<Complex<T>>,
    wrapped: [Vec<usize>; 3],
}

impl<T: Float> Scratch<T> {
    fn new() -> Self {
        Self {
            folded: [Vec::new(), Vec::new(), Vec::new()],
            subgrid: Vec::new(),
            wrapped: [Vec::new(), Vec::new(), Vec::new()],
        }
    }
}

enum MergeTarget<'g, T: Float> {
    Locked(Mutex<&'g mut [Complex<T>]>),
    Atomic(&'g [T::Atomic]),
}

/// Kernel footprint of one point along one axis.
struct Footprint<T: Float> {
    start: i64,
    ker: [T; MAX_KERNEL_WIDTH],
}

/// Spread/interpolate engine bound to one fine grid geometry.
pub struct Spreader<'s, T: Float> {
    params: &'s KernelParams<T>,
    kernel: &'s dyn KernelEvaluator<T>,
    dims: [usize; 3],
    rank: usize,
}

impl<'s, T: Float> Spreader<'s, T> {
    pub fn new(
        params: &'s KernelParams<T>,
        kernel: &'s dyn KernelEvaluator<T>,
        dims: [usize; 3],
        rank: usize,
    ) -> Self {
        Self {
            params,
            kernel,
            dims,
            rank,
        }
    }

    fn grid_len(&self) -> usize {
        self.dims.iter().product()
    }

    fn axis_points<'p>(&self, pts: &PointSet<'p, T>, d: usize) -> &'p [T] {
        match d {
            0 => pts.x,
            1 => pts.y.unwrap_or(&[]),
            _ => pts.z.unwrap_or(&[]),
        }
    }

    #[inline]
    fn footprint(&self, coord: T) -> Footprint<T> {
        let w = self.params.width;
        let half = self.params.half_width;
        let start = (coord - half).ceil().to_i64();
        let mut x1 = T::from_i64(start) - coord;
        // rounding can push the offset just outside the kernel support
        if x1 < -half {
            x1 = -half;
        }
        let upper = -half + T::one();
        if x1 > upper {
            x1 = upper;
        }
        let mut ker = [T::zero(); MAX_KERNEL_WIDTH];
        self.kernel.evaluate(x1, &mut ker[..w]);
        Footprint { start, ker }
    }

    /// Number of subproblems and their point breakpoints.
    fn subproblem_breaks(&self, m: usize, threads: usize, did_sort: bool) -> Vec<usize> {
        let max_sub = self.params.max_subproblem_size.max(1);
        let mut nb = threads.min(m);
        if nb * max_sub < m {
            nb = 1 + (m - 1) / max_sub;
        }
        if m * 1000 < self.grid_len() {
            nb = m;
        }
        if !did_sort && threads == 1 {
            nb = 1;
        }
        (0..=nb)
            .map(|p| (0.5 + m as f64 * p as f64 / nb as f64) as usize)
            .collect()
    }

    /// Spread `weights` (one per point) onto `grid`, overwriting it.
    ///
    /// `perm` is the visiting order from the bin sort. Uses the current rayon
    /// pool when `threads > 1`.
    pub fn spread(
        &self,
        perm: &[usize],
        did_sort: bool,
        pts: &PointSet<'_, T>,
        weights: &[Complex<T>],
        grid: &mut [Complex<T>],
        threads: usize,
    ) {
        let grid = &mut grid[..self.grid_len()];
        grid.fill(Complex::zero());
        let m = perm.len();
        if m == 0 {
            return;
        }
        let threads = threads.max(1);
        let brk = self.subproblem_breaks(m, threads, did_sort);
        let nb = brk.len() - 1;
        let use_atomic = threads > self.params.atomic_threshold;
        if self.params.verbosity >= 2 {
            debug!(
                "spread: {} points in {} subproblem(s) on {} thread(s), {} merge",
                m,
                nb,
                threads,
                if use_atomic { "atomic" } else { "locked" }
            );
        }

        let target = if use_atomic {
            match as_atomic_cells(grid) {
                Ok(cells) => MergeTarget::Atomic(cells),
                Err(grid) => MergeTarget::Locked(Mutex::new(grid)),
            }
        } else {
            MergeTarget::Locked(Mutex::new(grid))
        };

        let run = |scratch: &mut Scratch<T>, p: usize| {
            let idx = &perm[brk[p]..brk[p + 1]];
            if idx.is_empty() {
                return;
            }
            let sub = self.fold_subproblem(scratch, pts, idx);
            self.spread_subproblem(scratch, &sub, idx, weights);
            self.merge(scratch, &sub, &target);
        };

        if threads == 1 || nb == 1 {
            let mut scratch = Scratch::new();
            for p in 0..nb {
                run(&mut scratch, p);
            }
        } else {
            (0..nb)
                .into_par_iter()
                .for_each_init(Scratch::new, |scratch, p| run(scratch, p));
        }
    }

    fn fold_subproblem(
        &self,
        scratch: &mut Scratch<T>,
        pts: &PointSet<'_, T>,
        idx: &[usize],
    ) -> Subgrid {
        let domain = self.params.point_domain;
        for d in 0..3 {
            let out = &mut scratch.folded[d];
            out.clear();
            if d >= self.rank {
                continue;
            }
            let n = T::from_f64(self.dims[d] as f64);
            let src = self.axis_points(pts, d);
            out.extend(idx.iter().map(|&i| fold_rescale(src[i], n, domain)));
        }
        let [a, b, c] = &scratch.folded;
        Subgrid::bounding([a.as_slice(), b.as_slice(), c.as_slice()], self.rank, self.params.width)
    }

    fn spread_subproblem(
        &self,
        scratch: &mut Scratch<T>,
        sub: &Subgrid,
        idx: &[usize],
        weights: &[Complex<T>],
    ) {
        let w = self.params.width;
        let scale = if self.params.spread_only {
            Some(self.params.kernel_scale)
        } else {
            None
        };
        scratch.subgrid.clear();
        scratch.subgrid.resize(sub.len(), Complex::zero());
        let [s1, s2, _] = sub.size;
        let out = &mut scratch.subgrid;
        for (j, &i) in idx.iter().enumerate() {
            let mut strength = weights[i];
            if let Some(s) = scale {
                strength = strength.scale(s);
            }
            let f1 = self.footprint(scratch.folded[0][j]);
            let b1 = (f1.start - sub.offset[0]) as usize;
            match self.rank {
                1 => {
                    for (dx, &k) in f1.ker[..w].iter().enumerate() {
                        out[b1 + dx] += strength.scale(k);
                    }
                }
                2 => {
                    let f2 = self.footprint(scratch.folded[1][j]);
                    let b2 = (f2.start - sub.offset[1]) as usize;
                    for (dy, &ky) in f2.ker[..w].iter().enumerate() {
                        let v = strength.scale(ky);
                        let row = (b2 + dy) * s1 + b1;
                        for (dx, &kx) in f1.ker[..w].iter().enumerate() {
                            out[row + dx] += v.scale(kx);
                        }
                    }
                }
                _ => {
                    let f2 = self.footprint(scratch.folded[1][j]);
                    let f3 = self.footprint(scratch.folded[2][j]);
                    let b2 = (f2.start - sub.offset[1]) as usize;
                    let b3 = (f3.start - sub.offset[2]) as usize;
                    for (dz, &kz) in f3.ker[..w].iter().enumerate() {
                        let vz = strength.scale(kz);
                        for (dy, &ky) in f2.ker[..w].iter().enumerate() {
                            let v = vz.scale(ky);
                            let row = ((b3 + dz) * s2 + b2 + dy) * s1 + b1;
                            for (dx, &kx) in f1.ker[..w].iter().enumerate() {
                                out[row + dx] += v.scale(kx);
                            }
                        }
                    }
                }
            }
        }
    }

    fn merge(&self, scratch: &mut Scratch<T>, sub: &Subgrid, target: &MergeTarget<'_, T>) {
        for d in 0..3 {
            let n = self.dims[d] as i64;
            let wrapped = &mut scratch.wrapped[d];
            wrapped.clear();
            wrapped.extend((0..sub.size[d] as i64).map(|l| (sub.offset[d] + l).rem_euclid(n) as usize));
        }
        let [n1, n2, _] = self.dims;
        let [wx, wy, wz] = &scratch.wrapped;
        let data = &scratch.subgrid;
        match target {
            MergeTarget::Locked(lock) => {
                let mut guard = match lock.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let grid: &mut [Complex<T>] = &mut guard;
                let mut s = 0;
                for &gz in wz {
                    for &gy in wy {
                        let base = (gz * n2 + gy) * n1;
                        for &gx in wx {
                            grid[base + gx] += data[s];
                            s += 1;
                        }
                    }
                }
            }
            MergeTarget::Atomic(cells) => {
                let mut s = 0;
                for &gz in wz {
                    for &gy in wy {
                        let base = (gz * n2 + gy) * n1;
                        for &gx in wx {
                            let g = 2 * (base + gx);
                            let v = data[s];
                            T::atomic_add(&cells[g], v.re);
                            T::atomic_add(&cells[g + 1], v.im);
                            s += 1;
                        }
                    }
                }
            }
        }
    }

    /// Interpolate `grid` at every point, writing `out[j]` for point `j`.
    pub fn interp(
        &self,
        perm: &[usize],
        pts: &PointSet<'_, T>,
        grid: &[Complex<T>],
        out: &mut [Complex<T>],
        threads: usize,
    ) {
        let m = perm.len();
        if m == 0 {
            return;
        }
        if self.params.verbosity >= 2 {
            debug!("interp: {} points on {} thread(s)", m, threads.max(1));
        }
        let eval_chunk = |ids: &[usize]| {
            let mut buf = [Complex::zero(); INTERP_CHUNK];
            for (v, &i) in buf.iter_mut().zip(ids.iter()) {
                *v = self.interp_point(pts, grid, i);
            }
            buf
        };
        if threads > 1 {
            // each chunk writes back its own targets; `perm` is a bijection
            let out = Mutex::new(out);
            perm.par_chunks(INTERP_CHUNK).for_each(|ids| {
                let buf = eval_chunk(ids);
                let mut guard = match out.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                for (&i, &v) in ids.iter().zip(buf.iter()) {
                    guard[i] = v;
                }
            });
        } else {
            for ids in perm.chunks(INTERP_CHUNK) {
                let buf = eval_chunk(ids);
                for (&i, &v) in ids.iter().zip(buf.iter()) {
                    out[i] = v;
                }
            }
        }
    }

    fn interp_point(&self, pts: &PointSet<'_, T>, grid: &[Complex<T>], i: usize) -> Complex<T> {
        let w = self.params.width;
        let domain = self.params.point_domain;
        let [n1, n2, n3] = self.dims;
        let wrap = |v: i64, n: usize| v.rem_euclid(n as i64) as usize;
        let f1 = self.footprint(fold_rescale(pts.x[i], T::from_f64(n1 as f64), domain));
        let mut ix = [0usize; MAX_KERNEL_WIDTH];
        for (dx, slot) in ix[..w].iter_mut().enumerate() {
            *slot = wrap(f1.start + dx as i64, n1);
        }
        let line = |base: usize| {
            let mut acc = Complex::zero();
            for dx in 0..w {
                acc += grid[base + ix[dx]].scale(f1.ker[dx]);
            }
            acc
        };
        let mut value = match self.rank {
            1 => line(0),
            2 => {
                let y = self.axis_points(pts, 1)[i];
                let f2 = self.footprint(fold_rescale(y, T::from_f64(n2 as f64), domain));
                let mut acc = Complex::zero();
                for dy in 0..w {
                    let gy = wrap(f2.start + dy as i64, n2);
                    acc += line(gy * n1).scale(f2.ker[dy]);
                }
                acc
            }
            _ => {
                let y = self.axis_points(pts, 1)[i];
                let z = self.axis_points(pts, 2)[i];
                let f2 = self.footprint(fold_rescale(y, T::from_f64(n2 as f64), domain));
                let f3 = self.footprint(fold_rescale(z, T::from_f64(n3 as f64), domain));
                let mut acc = Complex::zero();
                for dz in 0..w {
                    let gz = wrap(f3.start + dz as i64, n3);
                    let mut plane = Complex::zero();
                    for dy in 0..w {
                        let gy = wrap(f2.start + dy as i64, n2);
                        plane += line((gz * n2 + gy) * n1).scale(f2.ker[dy]);
                    }
                    acc += plane.scale(f3.ker[dz]);
                }
                acc
            }
        };
        if self.params.spread_only {
            value = value.scale(self.params.kernel_scale);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::evaluate_kernel;
    use crate::options::{KernelEvaluationMethod, PointDomain};
    use crate::num::Complex64;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn params(rank: usize) -> KernelParams<f64> {
        let mut p =
            KernelParams::setup(rank, 1e-6, 2.0, KernelEvaluationMethod::Direct, false, false)
                .unwrap();
        p.max_subproblem_size = 37;
        p
    }

    fn brute_spread(
        p: &KernelParams<f64>,
        dims: [usize; 3],
        rank: usize,
        coords: &[Vec<f64>],
        weights: &[Complex64],
    ) -> Vec<Complex64> {
        let mut grid = vec![Complex64::zero(); dims.iter().product()];
        for (j, &c) in weights.iter().enumerate() {
            for g in 0..grid.len() {
                let idx = [g % dims[0], (g / dims[0]) % dims[1], g / (dims[0] * dims[1])];
                let mut k = 1.0;
                for d in 0..rank {
                    let n = dims[d] as f64;
                    let x = fold_rescale(coords[d][j], n, p.point_domain);
                    // periodic distance
                    let mut dist = idx[d] as f64 - x;
                    dist -= n * (dist / n).round();
                    k *= evaluate_kernel(dist, p);
                }
                grid[g] += c.scale(k);
            }
        }
        grid
    }

    fn random_case(rank: usize, m: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<Complex64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let pi = core::f64::consts::PI;
        let coords = (0..rank)
            .map(|_| (0..m).map(|_| rng.gen_range(-pi..pi)).collect())
            .collect();
        let weights = (0..m)
            .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect();
        (coords, weights)
    }

    fn point_set(coords: &[Vec<f64>]) -> PointSet<'_, f64> {
        PointSet {
            x: &coords[0],
            y: coords.get(1).map(|v| v.as_slice()),
            z: coords.get(2).map(|v| v.as_slice()),
        }
    }

    #[test]
    fn spread_matches_brute_force_in_all_ranks() {
        for (rank, dims) in [(1, [40, 1, 1]), (2, [20, 16, 1]), (3, [16, 16, 18])] {
            let p = params(rank);
            let kernel = p.evaluator().unwrap();
            let (coords, weights) = random_case(rank, 60, rank as u64);
            let pts = point_set(&coords);
            let perm: Vec<usize> = (0..60).collect();
            let spreader = Spreader::new(&p, kernel.as_ref(), dims, rank);
            let mut grid = vec![Complex64::new(9.0, 9.0); dims.iter().product()];
            spreader.spread(&perm, true, &pts, &weights, &mut grid, 3);
            let expected = brute_spread(&p, dims, rank, &coords, &weights);
            let scale = expected.iter().map(|c| c.norm_sqr().sqrt()).fold(0.0, f64::max);
            for (a, b) in grid.iter().zip(expected.iter()) {
                assert!((*a - *b).norm_sqr().sqrt() < 1e-10 * scale, "rank {}", rank);
            }
        }
    }

    #[test]
    fn locked_and_atomic_merges_agree() {
        let rank = 2;
        let dims = [32, 24, 1];
        let (coords, weights) = random_case(rank, 500, 11);
        let pts = point_set(&coords);
        let perm: Vec<usize> = (0..500).collect();

        let mut locked_p = params(rank);
        locked_p.atomic_threshold = 64;
        let mut atomic_p = params(rank);
        atomic_p.atomic_threshold = 1;
        let kernel = locked_p.evaluator().unwrap();

        let mut a = vec![Complex64::zero(); 32 * 24];
        let mut b = a.clone();
        let mut c = a.clone();
        Spreader::new(&locked_p, kernel.as_ref(), dims, rank).spread(&perm, true, &pts, &weights, &mut a, 4);
        Spreader::new(&atomic_p, kernel.as_ref(), dims, rank).spread(&perm, true, &pts, &weights, &mut b, 4);
        Spreader::new(&locked_p, kernel.as_ref(), dims, rank).spread(&perm, true, &pts, &weights, &mut c, 1);
        for ((x, y), z) in a.iter().zip(b.iter()).zip(c.iter()) {
            assert!((*x - *y).norm_sqr() < 1e-20);
            assert!((*x - *z).norm_sqr() < 1e-20);
        }
    }

    #[test]
    fn interp_is_adjoint_of_spread() {
        for (rank, dims) in [(1, [30, 1, 1]), (2, [16, 20, 1]), (3, [16, 16, 16])] {
            let p = params(rank);
            let kernel = p.evaluator().unwrap();
            let (coords, weights) = random_case(rank, 25, 40 + rank as u64);
            let pts = point_set(&coords);
            let perm: Vec<usize> = (0..25).rev().collect();
            let spreader = Spreader::new(&p, kernel.as_ref(), dims, rank);
            let n: usize = dims.iter().product();
            let mut rng = StdRng::seed_from_u64(99);
            let g: Vec<Complex64> = (0..n)
                .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
                .collect();

            let mut spread = vec![Complex64::zero(); n];
            spreader.spread(&perm, false, &pts, &weights, &mut spread, 2);
            let mut interp = vec![Complex64::zero(); 25];
            spreader.interp(&perm, &pts, &g, &mut interp, 2);

            // <S c, g> == <c, I g> for a real kernel
            let lhs = spread
                .iter()
                .zip(g.iter())
                .fold(Complex64::zero(), |acc, (s, g)| acc + s.mul(g.conj()));
            let rhs = weights
                .iter()
                .zip(interp.iter())
                .fold(Complex64::zero(), |acc, (c, v)| acc + c.mul(v.conj()));
            let mag = lhs.norm_sqr().sqrt().max(1.0);
            assert!((lhs - rhs).norm_sqr().sqrt() < 1e-9 * mag, "rank {}", rank);
        }
    }

    #[test]
    fn parallel_interp_writes_every_target_once() {
        let p = params(2);
        let kernel = p.evaluator().unwrap();
        let dims = [20, 18, 1];
        // 53 points: three full chunks plus a ragged tail
        let (coords, _) = random_case(2, 53, 7);
        let pts = point_set(&coords);
        let perm: Vec<usize> = (0..53).map(|i| (i * 17) % 53).collect();
        let spreader = Spreader::new(&p, kernel.as_ref(), dims, 2);
        let mut rng = StdRng::seed_from_u64(3);
        let g: Vec<Complex64> = (0..20 * 18)
            .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect();

        let sentinel = Complex64::new(f64::NAN, 0.0);
        let mut serial = vec![sentinel; 53];
        let mut parallel = vec![sentinel; 53];
        spreader.interp(&perm, &pts, &g, &mut serial, 1);
        spreader.interp(&perm, &pts, &g, &mut parallel, 4);
        assert!(serial.iter().all(|v| v.re.is_finite()));
        assert_eq!(serial, parallel);
    }

    #[test]
    fn grid_domain_points_fold_periodically() {
        let mut p = params(1);
        p.point_domain = PointDomain::Grid;
        let kernel = p.evaluator().unwrap();
        let spreader = Spreader::new(&p, kernel.as_ref(), [32, 1, 1], 1);
        let a = vec![3.25f64];
        let b = vec![3.25f64 + 32.0];
        let w = vec![Complex64::new(1.0, 0.0)];
        let mut ga = vec![Complex64::zero(); 32];
        let mut gb = vec![Complex64::zero(); 32];
        spreader.spread(&[0], true, &PointSet { x: &a, y: None, z: None }, &w, &mut ga, 1);
        spreader.spread(&[0], true, &PointSet { x: &b, y: None, z: None }, &w, &mut gb, 1);
        assert_eq!(ga, gb);
        assert!(ga[3].re > ga[0].re);
    }

    #[test]
    fn subgrid_bounds_cover_footprint() {
        let xs = [10.2f64, 12.7];
        let empty: &[f64] = &[];
        let sub = Subgrid::bounding([&xs[..], empty, empty], 1, 7);
        assert_eq!(sub.offset[0], 7);
        assert_eq!(sub.size, [10, 1, 1]);
        assert_eq!(sub.len(), 10);
    }
}
