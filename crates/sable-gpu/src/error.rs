//! Status codes shared by every core operation.

use thiserror::Error;

/// Failure of a core operation.
///
/// Success is `Ok(_)`. None of these is retried internally; the caller drops the
/// offending primitive or draw and carries on with the frame.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum GpuError {
    /// An allocation failed. Only the current primitive/draw is lost.
    #[error("out of memory")]
    NoMem,

    /// API misuse, e.g. geometry without an active `begin`, or a dead context.
    #[error("invalid state for this operation")]
    BadState,

    /// An index does not fit in 32 bits.
    #[error("index exceeds the 32-bit addressable range")]
    Overflow,

    /// The driver reported something unexpected (e.g. incomplete framebuffer).
    #[error("unexpected driver failure")]
    UnknownErr,
}

impl From<std::collections::TryReserveError> for GpuError {
    fn from(_: std::collections::TryReserveError) -> Self {
        GpuError::NoMem
    }
}

/// Result type for core operations.
pub type GpuResult<T> = std::result::Result<T, GpuError>;
