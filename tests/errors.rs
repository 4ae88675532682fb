// Test intent: every rejected configuration maps to the documented error
// kind, and errors render readable messages.

use std::error::Error;

use nufft::{
    Complex64, FftDirection, FftError, KernelEvaluationMethod, NufftError, Options, Plan, TransformType,
};

fn new_plan(kind: TransformType, modes: &[usize], nt: usize, opts: Options) -> Result<Plan<'static, f64>, NufftError> {
    Plan::new(kind, modes, FftDirection::Backward, nt, 1e-6, opts)
}

#[test]
fn configuration_errors() {
    let d = Options::default;
    assert!(matches!(
        new_plan(TransformType::Type3, &[8], 1, d()),
        Err(NufftError::Unimplemented(_))
    ));
    assert!(matches!(
        new_plan(TransformType::Type1, &[8, 8, 8, 8], 1, d()),
        Err(NufftError::Unimplemented(_))
    ));
    assert!(matches!(
        new_plan(TransformType::Type1, &[], 1, d()),
        Err(NufftError::InvalidArgument(_))
    ));
    assert!(matches!(
        new_plan(TransformType::Type2, &[8], 0, d()),
        Err(NufftError::InvalidArgument(_))
    ));
    assert!(matches!(
        new_plan(TransformType::Type1, &[8, 0], 1, d()),
        Err(NufftError::InvalidArgument(_))
    ));
    assert!(matches!(
        Plan::<f64>::new(TransformType::Type1, &[8], FftDirection::Forward, 1, f64::NAN, d()),
        Err(NufftError::InvalidArgument(_))
    ));
    let horner = Options {
        kernel_evaluation_method: KernelEvaluationMethod::Horner,
        upsampling_factor: 1.5,
        ..d()
    };
    assert!(matches!(
        new_plan(TransformType::Type1, &[8], 1, horner),
        Err(NufftError::Internal(_))
    ));
    let sigma = Options {
        upsampling_factor: 0.9,
        ..d()
    };
    assert!(matches!(new_plan(TransformType::Type1, &[8], 1, sigma), Err(NufftError::Internal(_))));
}

#[test]
fn oversized_grid_is_internal() {
    let r = new_plan(TransformType::Type1, &[100_000, 100_000, 100], 1, Options::default());
    assert!(matches!(r, Err(NufftError::Internal(_))));
}

#[test]
fn overflowing_sizes_are_internal() {
    let sigma2 = || Options {
        upsampling_factor: 2.0,
        ..Options::default()
    };
    // mode count itself overflows 64 bits
    let r = new_plan(TransformType::Type1, &[1 << 31, 1 << 31, 1 << 31], 1, Options::default());
    assert!(matches!(r, Err(NufftError::Internal(_))));
    // every axis fits, the product of fine-grid axes does not
    let r = new_plan(TransformType::Type2, &[200_000, 200_000], 1, sigma2());
    assert!(matches!(r, Err(NufftError::Internal(_))));
    // one fine grid fits, the batch of four does not
    let batched = Options {
        max_batch_size: 4,
        ..sigma2()
    };
    let r = new_plan(TransformType::Type1, &[100_000, 100_000], 4, batched);
    assert!(matches!(r, Err(NufftError::Internal(_))));
}

#[cfg(target_pointer_width = "64")]
#[test]
fn unallocatable_grid_is_resource_exhausted() {
    // 1e11 elements: at the size limit, far beyond any real memory
    let opts = Options {
        upsampling_factor: 1.25,
        ..Options::default()
    };
    let r = new_plan(TransformType::Type1, &[80_000_000_000], 1, opts);
    assert!(matches!(r, Err(NufftError::ResourceExhausted(_))), "{:?}", r.err());
}

#[test]
fn point_errors() {
    let pi = core::f64::consts::PI;
    let good = vec![0.0f64, 1.0, -1.0];
    let short = vec![0.0f64, 1.0];
    let wild = vec![0.0f64, 4.0 * pi, 1.0];

    let mut p2 = Plan::<f64>::new(TransformType::Type1, &[8, 8], FftDirection::Backward, 1, 1e-6, Options::default())
        .unwrap();
    assert!(matches!(p2.set_points(&good, None, None), Err(NufftError::InvalidArgument(_))));
    assert!(matches!(
        p2.set_points(&good, Some(&short), None),
        Err(NufftError::InvalidArgument(_))
    ));
    assert!(matches!(
        p2.set_points(&good, Some(&good), Some(&good)),
        Err(NufftError::InvalidArgument(_))
    ));
    match p2.set_points(&good, Some(&wild), None) {
        Err(NufftError::InvalidArgument(msg)) => assert!(msg.contains("y[1]"), "{}", msg),
        other => panic!("expected a bounds error, got {:?}", other.err()),
    }

    let unchecked = Options {
        check_bounds: false,
        ..Options::default()
    };
    let mut p1 =
        Plan::<f64>::new(TransformType::Type1, &[8], FftDirection::Backward, 1, 1e-6, unchecked).unwrap();
    p1.set_points(&good, None, None).unwrap();
}

#[test]
fn execution_errors() {
    let x = vec![0.5f64, -0.5];
    let mut plan =
        Plan::<f64>::new(TransformType::Type1, &[6], FftDirection::Backward, 2, 1e-6, Options::default()).unwrap();
    let mut c = vec![Complex64::new(1.0, 0.0); 4];
    let mut f = vec![Complex64::zero(); 12];
    assert!(matches!(plan.execute(&mut c, &mut f), Err(NufftError::InvalidArgument(_))));

    plan.set_points(&x, None, None).unwrap();
    assert!(matches!(
        plan.execute(&mut c[..2], &mut f),
        Err(NufftError::InvalidArgument(_))
    ));
    assert!(matches!(
        plan.execute(&mut c, &mut f[..6]),
        Err(NufftError::InvalidArgument(_))
    ));
    plan.execute(&mut c, &mut f).unwrap();
    plan.destroy();
}

#[test]
fn errors_display_and_chain() {
    let e = NufftError::InvalidArgument("x[3] out of range".into());
    assert!(e.to_string().contains("x[3]"));
    assert!(e.source().is_none());

    let wrapped: NufftError = FftError::MismatchedLengths.into();
    assert!(matches!(wrapped, NufftError::Fft(FftError::MismatchedLengths)));
    assert!(wrapped.source().is_some());
    assert!(!wrapped.to_string().is_empty());
}
