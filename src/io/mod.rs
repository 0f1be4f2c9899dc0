//! Mesh file import and export.

#[cfg(feature = "stl-io")]
pub mod stl;

use crate::errors::CsgError;

/// Generic I/O and format-conversion errors.
///
/// Format support sits behind cargo feature flags. When a feature is disabled
/// the corresponding functions are not compiled.
#[derive(Debug)]
pub enum IoError {
    StdIo(std::io::Error),
    MalformedInput(String),
    /// The file parsed but the kernel refused the geometry.
    Csg(CsgError),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use IoError::*;

        match self {
            StdIo(error) => write!(f, "std::io::Error: {error}"),
            MalformedInput(msg) => write!(f, "Input is malformed: {msg}"),
            Csg(error) => write!(f, "Geometry rejected: {error}"),
        }
    }
}

impl std::error::Error for IoError {}

impl From<std::io::Error> for IoError {
    fn from(value: std::io::Error) -> Self {
        Self::StdIo(value)
    }
}

impl From<CsgError> for IoError {
    fn from(value: CsgError) -> Self {
        Self::Csg(value)
    }
}
