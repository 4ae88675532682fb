//! Spatial bin-sort of non-uniform points.
//!
//! Points are bucketed into boxes of 16 × 4 × 4 fine-grid cells, and the
//! returned permutation lists them box by box (x fastest). Spreading and
//! interpolating in that order keeps the touched grid region small.

use alloc::vec;
use alloc::vec::Vec;
use log::debug;
use rayon::prelude::*;

use crate::grid::fold_rescale;
use crate::kernel::{KernelParams, SpreadDirection};
use crate::num::Float;
use crate::options::{PointDomain, SortPoints};

const BIN_SIZE: [usize; 3] = [16, 4, 4];

/// Coordinates of the points, one slice per active axis.
#[derive(Clone, Copy)]
pub struct PointSet<'p, T: Float> {
    pub x: &'p [T],
    pub y: Option<&'p [T]>,
    pub z: Option<&'p [T]>,
}

impl<'p, T: Float> PointSet<'p, T> {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

struct Binning {
    dims: [usize; 3],
    nbins: [usize; 3],
    domain: PointDomain,
}

impl Binning {
    fn new(dims: [usize; 3], domain: PointDomain) -> Self {
        let mut nbins = [1; 3];
        for d in 0..3 {
            if d == 0 || dims[d] > 1 {
                // +1 absorbs points folded onto the upper edge by rounding
                nbins[d] = dims[d] / BIN_SIZE[d] + 1;
            }
        }
        Self {
            dims,
            nbins,
            domain,
        }
    }

    fn total(&self) -> usize {
        self.nbins.iter().product()
    }

    #[inline]
    fn axis<T: Float>(&self, v: T, d: usize) -> usize {
        let n = T::from_f64(self.dims[d] as f64);
        let f = fold_rescale(v, n, self.domain).to_f64();
        let b = if f > 0.0 { (f / BIN_SIZE[d] as f64) as usize } else { 0 };
        b.min(self.nbins[d] - 1)
    }

    #[inline]
    fn bin<T: Float>(&self, pts: &PointSet<'_, T>, i: usize) -> usize {
        let i1 = self.axis(pts.x[i], 0);
        let i2 = match pts.y {
            Some(y) if self.dims[1] > 1 => self.axis(y[i], 1),
            _ => 0,
        };
        let i3 = match pts.z {
            Some(z) if self.dims[2] > 1 => self.axis(z[i], 2),
            _ => 0,
        };
        i1 + self.nbins[0] * (i2 + self.nbins[1] * i3)
    }
}

/// Whether `SortPoints::Auto` sorts for this geometry.
///
/// One-dimensional interpolation and very dense 1D problems are left in input
/// order.
pub fn auto_should_sort(rank: usize, direction: SpreadDirection, num_points: usize, n1: usize) -> bool {
    !(rank == 1 && (direction == SpreadDirection::Interp || num_points > 1000 * n1))
}

/// Compute a cache-friendly visiting order for the points.
///
/// Returns the permutation and whether sorting actually happened; when it
/// did not, the permutation is the identity. Multi-threaded sorting runs on
/// the current rayon pool.
pub fn bin_sort_points<T: Float>(
    pts: &PointSet<'_, T>,
    dims: [usize; 3],
    params: &KernelParams<T>,
) -> (Vec<usize>, bool) {
    let m = pts.len();
    let rank = dims.iter().filter(|&&n| n > 1).count().max(1);
    let sort = match params.sort_points {
        SortPoints::Always => true,
        SortPoints::Never => false,
        SortPoints::Auto => auto_should_sort(rank, params.spread_direction, m, dims[0]),
    };
    if !sort {
        return ((0..m).collect(), false);
    }

    let grid_total: usize = dims.iter().product();
    let max_threads = params.num_threads.max(1);
    let mut threads = if params.sort_threads > 0 {
        params.sort_threads.min(max_threads)
    } else if 10 * m > grid_total {
        max_threads
    } else {
        1
    };
    threads = threads.min(m).max(1);

    let binning = Binning::new(dims, params.point_domain);
    if params.verbosity >= 2 {
        debug!("bin sort: {} points into {} bins on {} thread(s)", m, binning.total(), threads);
    }
    let perm = if threads == 1 {
        sort_single(pts, &binning)
    } else {
        sort_multi(pts, &binning, threads)
    };
    (perm, true)
}

fn sort_single<T: Float>(pts: &PointSet<'_, T>, binning: &Binning) -> Vec<usize> {
    let m = pts.len();
    let mut counts = vec![0usize; binning.total()];
    for i in 0..m {
        counts[binning.bin(pts, i)] += 1;
    }
    let mut offsets = exclusive_prefix_sum(&counts);
    let mut inv = vec![0usize; m];
    for (i, slot) in inv.iter_mut().enumerate() {
        let b = binning.bin(pts, i);
        *slot = offsets[b];
        offsets[b] += 1;
    }
    invert(&inv)
}

fn sort_multi<T: Float>(pts: &PointSet<'_, T>, binning: &Binning, threads: usize) -> Vec<usize> {
    let m = pts.len();
    let nb = binning.total();
    let brk: Vec<usize> = (0..=threads)
        .map(|t| (0.5 + m as f64 * t as f64 / threads as f64) as usize)
        .collect();

    let per_thread: Vec<Vec<usize>> = (0..threads)
        .into_par_iter()
        .map(|t| {
            let mut c = vec![0usize; nb];
            for i in brk[t]..brk[t + 1] {
                c[binning.bin(pts, i)] += 1;
            }
            c
        })
        .collect();

    let mut counts = vec![0usize; nb];
    for c in &per_thread {
        for (total, &v) in counts.iter_mut().zip(c.iter()) {
            *total += v;
        }
    }
    let mut thread_offsets = Vec::with_capacity(threads);
    thread_offsets.push(exclusive_prefix_sum(&counts));
    for t in 1..threads {
        let next: Vec<usize> = thread_offsets[t - 1]
            .iter()
            .zip(per_thread[t - 1].iter())
            .map(|(&o, &c)| o + c)
            .collect();
        thread_offsets.push(next);
    }
    drop(per_thread);

    let mut inv = vec![0usize; m];
    let mut chunks = Vec::with_capacity(threads);
    let mut rest: &mut [usize] = &mut inv;
    for t in 0..threads {
        let (head, tail) = rest.split_at_mut(brk[t + 1] - brk[t]);
        chunks.push(head);
        rest = tail;
    }
    chunks
        .into_par_iter()
        .zip(thread_offsets.into_par_iter())
        .enumerate()
        .for_each(|(t, (chunk, mut offsets))| {
            for (k, slot) in chunk.iter_mut().enumerate() {
                let b = binning.bin(pts, brk[t] + k);
                *slot = offsets[b];
                offsets[b] += 1;
            }
        });
    invert(&inv)
}

fn exclusive_prefix_sum(counts: &[usize]) -> Vec<usize> {
    let mut acc = 0;
    counts
        .iter()
        .map(|&c| {
            let o = acc;
            acc += c;
            o
        })
        .collect()
}

fn invert(inv: &[usize]) -> Vec<usize> {
    let mut perm = vec![0usize; inv.len()];
    for (i, &pos) in inv.iter().enumerate() {
        perm[pos] = i;
    }
    perm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::KernelEvaluationMethod;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn params(threads: usize, sort_threads: usize) -> KernelParams<f64> {
        let mut p =
            KernelParams::setup(2, 1e-6, 2.0, KernelEvaluationMethod::Direct, false, false).unwrap();
        p.sort_points = SortPoints::Always;
        p.num_threads = threads;
        p.sort_threads = sort_threads;
        p
    }

    fn is_permutation(p: &[usize]) -> bool {
        let mut seen = vec![false; p.len()];
        for &i in p {
            if i >= p.len() || seen[i] {
                return false;
            }
            seen[i] = true;
        }
        true
    }

    #[test]
    fn single_and_multi_thread_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        let pi = core::f64::consts::PI;
        let x: Vec<f64> = (0..5000).map(|_| rng.gen_range(-pi..pi)).collect();
        let y: Vec<f64> = (0..5000).map(|_| rng.gen_range(-pi..pi)).collect();
        let pts = PointSet { x: &x, y: Some(&y), z: None };
        let (a, sorted_a) = bin_sort_points(&pts, [64, 48, 1], &params(1, 1));
        let (b, sorted_b) = bin_sort_points(&pts, [64, 48, 1], &params(4, 4));
        assert!(sorted_a && sorted_b);
        assert!(is_permutation(&a));
        // both orders are stable within a bin, so they coincide
        assert_eq!(a, b);

        let binning = Binning::new([64, 48, 1], PointDomain::Pi);
        let bins: Vec<usize> = a.iter().map(|&i| binning.bin(&pts, i)).collect();
        assert!(bins.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn auto_skips_one_dimensional_interp() {
        let x = vec![0.5f64; 10];
        let pts = PointSet { x: &x, y: None, z: None };
        let mut p = params(1, 0);
        p.sort_points = SortPoints::Auto;
        p.spread_direction = SpreadDirection::Interp;
        let (perm, did) = bin_sort_points(&pts, [32, 1, 1], &p);
        assert!(!did);
        assert_eq!(perm, (0..10).collect::<Vec<_>>());

        p.spread_direction = SpreadDirection::Spread;
        assert!(bin_sort_points(&pts, [32, 1, 1], &p).1);
        assert!(!auto_should_sort(1, SpreadDirection::Spread, 32_001, 32));
        assert!(auto_should_sort(2, SpreadDirection::Interp, 10, 32));
    }

    #[test]
    fn never_returns_identity() {
        let x = vec![3.0f64, -3.0, 0.0];
        let pts = PointSet { x: &x, y: None, z: None };
        let mut p = params(2, 0);
        p.sort_points = SortPoints::Never;
        assert_eq!(bin_sort_points(&pts, [32, 1, 1], &p), (vec![0, 1, 2], false));
    }

    #[test]
    fn edge_points_stay_in_range() {
        let pi = core::f64::consts::PI;
        let x = vec![pi - 1e-16, -pi, 3.0 * pi, -3.0 * pi];
        let pts = PointSet { x: &x, y: None, z: None };
        let (perm, _) = bin_sort_points(&pts, [16, 1, 1], &params(1, 1));
        assert!(is_permutation(&perm));
    }
}
