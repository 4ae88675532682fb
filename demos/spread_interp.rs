//! Spread four impulses onto a 16-point grid and interpolate them back,
//! without any FFT.

use nufft::{Complex64, FftDirection, Options, Plan, TransformType};

fn main() -> Result<(), nufft::NufftError> {
    let pi = std::f64::consts::PI;
    let x = vec![0.0, pi / 2.0, pi, -pi / 2.0];
    let opts = Options {
        spread_interp_only: true,
        upsampling_factor: 2.0,
        ..Options::default()
    };

    let mut spread = Plan::new(TransformType::Type1, &[16], FftDirection::Backward, 1, 1e-6, opts.clone())?;
    spread.set_points(&x, None, None)?;
    let mut grid = vec![Complex64::zero(); 16];
    spread.execute(&mut vec![Complex64::new(1.0, 0.0); 4], &mut grid)?;
    println!("kernel width {}, scale {:.4e}", spread.kernel_params().width, spread.kernel_params().kernel_scale);
    for (l, g) in grid.iter().enumerate() {
        println!("grid[{:2}] = {:.6}", l, g.re);
    }

    let mut interp = Plan::new(TransformType::Type2, &[16], FftDirection::Backward, 1, 1e-6, opts)?;
    interp.set_points(&x, None, None)?;
    let mut back = vec![Complex64::zero(); 4];
    interp.execute(&mut back, &mut grid)?;
    for (xj, v) in x.iter().zip(back.iter()) {
        println!("x = {:+.4}: {:.6}", xj, v.re);
    }
    Ok(())
}
