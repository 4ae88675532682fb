//! Basic usage example for nufft
//!
//! Runs a 1D type-1 transform, checks it against the direct sum, then a 2D
//! type-2 transform on the same kind of points.

use nufft::direct::{relative_l2_error, type1_direct, type2_direct};
use nufft::{Complex64, FftDirection, ModeOrder, Options, Plan, TransformType};

fn main() -> Result<(), nufft::NufftError> {
    println!("=== nufft Basic Usage Example ===\n");

    // 1. Type 1 in one dimension
    println!("1. Type 1 (points -> modes), 1D");
    let m = 1000;
    let x: Vec<f64> = (0..m).map(|j| -3.0 + 6.0 * (j as f64 * 0.618_034).fract()).collect();
    let c: Vec<Complex64> = (0..m)
        .map(|j| Complex64::new((j as f64).cos(), (0.5 * j as f64).sin()))
        .collect();
    let modes = [64usize];
    let mut plan = Plan::new(TransformType::Type1, &modes, FftDirection::Backward, 1, 1e-9, Options::default())?;
    plan.set_points(&x, None, None)?;
    let mut f = vec![Complex64::zero(); 64];
    plan.execute(&mut c.clone(), &mut f)?;
    let want = type1_direct(&x, None, None, &c, &modes, FftDirection::Backward, ModeOrder::Centered);
    println!("   fine grid: {:?}, kernel width {}", plan.grid_dims(), plan.kernel_params().width);
    println!("   f[0] (k = -32) = {:.6}+{:.6}i", f[0].re, f[0].im);
    println!("   relative error vs direct sum: {:.2e}\n", relative_l2_error(&f, &want));

    // 2. Type 2 in two dimensions, three transforms at once
    println!("2. Type 2 (modes -> points), 2D, batch of 3");
    let y: Vec<f64> = x.iter().map(|v| (2.0 * v).sin() * 3.0).collect();
    let modes = [32usize, 24];
    let nm = 32 * 24;
    let coeffs: Vec<Complex64> = (0..3 * nm)
        .map(|i| Complex64::new(1.0 / (1.0 + i as f64), 0.25))
        .collect();
    let mut plan = Plan::new(TransformType::Type2, &modes, FftDirection::Forward, 3, 1e-7, Options::default())?;
    plan.set_points(&x, Some(&y), None)?;
    let mut out = vec![Complex64::zero(); 3 * m];
    plan.execute(&mut out, &mut coeffs.clone())?;
    println!("   batches: {} x {}", plan.num_batches(), plan.batch_size());
    for t in 0..3 {
        let want = type2_direct(
            &x,
            Some(&y),
            None,
            &coeffs[t * nm..(t + 1) * nm],
            &modes,
            FftDirection::Forward,
            ModeOrder::Centered,
        );
        println!(
            "   transform {}: relative error {:.2e}",
            t,
            relative_l2_error(&out[t * m..(t + 1) * m], &want)
        );
    }
    Ok(())
}
