//! Error type shared by every NUFFT operation.

use alloc::string::String;
use core::fmt;

use crate::fft::FftError;

/// Failure categories reported by plan creation, point setup and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NufftError {
    /// A caller-supplied value or buffer is unusable.
    InvalidArgument(String),
    /// The request is well formed but not supported (type 3, rank > 3).
    Unimplemented(String),
    /// An internal limit or consistency condition was violated.
    Internal(String),
    /// A working buffer could not be allocated.
    ResourceExhausted(String),
    /// The FFT engine rejected a transform.
    Fft(FftError),
}

impl NufftError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        NufftError::InvalidArgument(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        NufftError::Internal(msg.into())
    }

    pub(crate) fn unimplemented(msg: impl Into<String>) -> Self {
        NufftError::Unimplemented(msg.into())
    }
}

impl fmt::Display for NufftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NufftError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            NufftError::Unimplemented(msg) => write!(f, "unimplemented: {}", msg),
            NufftError::Internal(msg) => write!(f, "internal error: {}", msg),
            NufftError::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            NufftError::Fft(e) => write!(f, "fft failed: {}", e),
        }
    }
}

impl std::error::Error for NufftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NufftError::Fft(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FftError> for NufftError {
    fn from(e: FftError) -> Self {
        match e {
            FftError::AllocationFailed => {
                NufftError::ResourceExhausted(alloc::format!("FFT plan: {}", e))
            }
            e => NufftError::Fft(e),
        }
    }
}

/// An empty buffer with room for exactly `len` elements, reporting
/// allocation failure instead of aborting.
pub(crate) fn try_with_capacity<V>(len: usize, what: &str) -> Result<alloc::vec::Vec<V>, NufftError> {
    let mut v = alloc::vec::Vec::new();
    v.try_reserve_exact(len).map_err(|_| {
        NufftError::ResourceExhausted(alloc::format!("cannot allocate {} elements for {}", len, what))
    })?;
    Ok(v)
}

/// A zero-filled buffer of `len` elements; see [`try_with_capacity`].
pub(crate) fn try_zeroed<V: Clone>(len: usize, zero: V, what: &str) -> Result<alloc::vec::Vec<V>, NufftError> {
    let mut v = try_with_capacity(len, what)?;
    v.resize(len, zero);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn display_names_the_category() {
        let e = NufftError::invalid("bad tol");
        assert_eq!(e.to_string(), "invalid argument: bad tol");
        let e: NufftError = FftError::EmptyInput.into();
        assert!(e.to_string().contains("input slice is empty"));
        assert!(e.source().is_some());
    }

    #[test]
    fn try_zeroed_reports_exhaustion() {
        let v = try_zeroed(4, 0u8, "test").unwrap();
        assert_eq!(v, vec![0u8; 4]);
        let err = try_zeroed(usize::MAX, 0u64, "huge").unwrap_err();
        assert!(matches!(err, NufftError::ResourceExhausted(_)));
    }

    #[test]
    fn fft_allocation_failure_is_resource_exhaustion() {
        let e: NufftError = FftError::AllocationFailed.into();
        assert!(matches!(e, NufftError::ResourceExhausted(_)));
        let e: NufftError = FftError::InvalidStride.into();
        assert_eq!(e, NufftError::Fft(FftError::InvalidStride));
    }
}
