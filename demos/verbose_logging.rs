//! Demonstrates enabling verbose logging for nufft.
use nufft::{Complex32, FftDirection, Options, Plan, TransformType};

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let x: Vec<f32> = (0..500).map(|j| (j as f32 * 0.37).sin() * 3.0).collect();
    let y: Vec<f32> = (0..500).map(|j| (j as f32 * 0.11).cos() * 3.0).collect();
    let opts = Options {
        verbosity: 2,
        show_warnings: true,
        num_threads: 4,
        ..Options::default()
    };
    // 1e-9 is below single precision; the plan warns and uses its floor
    let mut plan = Plan::new(TransformType::Type1, &[40, 30], FftDirection::Forward, 2, 1e-9, opts).unwrap();
    plan.set_points(&x, Some(&y), None).unwrap();
    let mut c = vec![Complex32::new(1.0, 0.0); 1000];
    let mut f = vec![Complex32::zero(); 2 * 1200];
    plan.execute(&mut c, &mut f).unwrap();
}
