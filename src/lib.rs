//! A robust, tolerance-based **Constructive Solid Geometry (CSG)** kernel built on
//! [binary space partition](bsp) trees.
//!
//! Solids are built from closed triangle meshes (or convex plane sets), combined
//! pairwise and collapsed with any of the sixteen two-operand boolean
//! [operations](operation::Operation), measured for surface area and volume,
//! split into connected islands and turned back into attributed triangles.
//! Degenerate plane intersections are caught by a half-space feasibility test
//! instead of exact arithmetic.
//!
//! # Features
//! #### Default
//! - **f64**: use f64 as Real
//! - [**stl-io**](https://en.wikipedia.org/wiki/STL_(file_format)): `.stl` import/export
//!
//! #### Optional
//! - **f32**: use f32 as Real, this conflicts with f64
//! - **parallel**: use rayon for multithreading

#![forbid(unsafe_code)]
#![warn(clippy::missing_const_for_fn, clippy::approx_constant, clippy::all)]

pub mod bsp;
pub mod clip;
pub mod config;
pub mod errors;
pub mod feasibility;
pub mod float_types;
pub mod interpolator;
pub mod io;
pub mod operation;
pub mod plane;
pub mod progress;
pub mod random;
pub mod shapes;
pub mod traits;
pub mod triangle;
pub mod vertex;

#[cfg(any(all(feature = "f64", feature = "f32"), not(any(feature = "f64", feature = "f32"))))]
compile_error!("Either 'f64' or 'f32' feature must be specified, but not both");

pub use bsp::{AreaAndVolume, BuildContext, Solid, SolidType};
pub use config::{BuildParameters, Tolerances};
pub use errors::CsgError;
pub use operation::Operation;
pub use plane::Plane;
pub use progress::{CancellationToken, ProgressListener};
pub use random::UserRandom;
pub use traits::BooleanOps;
pub use triangle::RenderTriangle;
pub use vertex::{Vertex, VertexData};
