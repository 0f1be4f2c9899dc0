//! Errors reported by solid construction, boolean operations and persistence

use std::fmt::Display;

/// Every way a public operation on a [`Solid`](crate::bsp::Solid) can refuse or fail.
///
/// Contract violations leave the solid untouched. `Cancelled` is the normal
/// early exit of a long build and leaves the solid cleared.
#[derive(Debug, thiserror::Error)]
pub enum CsgError {
    /// (EmptyMesh) Construction was given no triangles
    EmptyMesh,
    /// (Combined) The operation needs an uncombined solid
    Combined { operation: &'static str },
    /// (NotCombined) The operation needs a combined solid
    NotCombined { operation: &'static str },
    /// (MissingOperation) A query on a combined solid was given no operation
    MissingOperation { operation: &'static str },
    /// (Cancelled) A cancellation token was raised during the operation
    Cancelled,
    /// (UnsupportedVersion) The stream was written by a newer format
    UnsupportedVersion { found: u32, current: u32 },
    /// (CorruptStream) The stream ended early or holds inconsistent data
    CorruptStream(String),
    /// Underlying reader or writer failure
    Io(#[from] std::io::Error),
}

impl Display for CsgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsgError::EmptyMesh => write!(f, "(EmptyMesh) cannot build a solid from zero triangles"),
            CsgError::Combined { operation } => write!(f, "(Combined) {} is not valid on a combined solid", operation),
            CsgError::NotCombined { operation } => write!(f, "(NotCombined) {} requires a combined solid", operation),
            CsgError::MissingOperation { operation } => {
                write!(f, "(MissingOperation) {} on a combined solid needs an operation", operation)
            },
            CsgError::Cancelled => write!(f, "(Cancelled) operation cancelled by caller"),
            CsgError::UnsupportedVersion { found, current } => {
                write!(f, "(UnsupportedVersion) stream version {} is newer than supported version {}", found, current)
            },
            CsgError::CorruptStream(reason) => write!(f, "(CorruptStream) {}", reason),
            CsgError::Io(error) => error.fmt(f),
        }
    }
}

impl CsgError {
    /// True for the cooperative-cancellation outcome, which callers usually
    /// handle separately from genuine failures.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, CsgError::Cancelled)
    }
}
