//! Binary space partition solids.
//!
//! A [`Solid`] is a tree whose branches split space with the plane of a
//! surface (a run of coplanar triangles) and whose leaves mark their cell as
//! inside or outside. Solids are built from triangle meshes or convex plane
//! sets, combined pairwise and collapsed with an [`Operation`](crate::operation::Operation),
//! measured, split into islands, turned back into triangles and persisted.

pub mod boolean;
pub mod build;
pub mod cache;
pub mod islands;
pub mod measure;
pub mod node;
pub mod persist;
pub mod reconstruct;
pub mod solid;

pub use boolean::REGION_SKIN;
pub use build::BuildContext;
pub use cache::MemCache;
pub use measure::AreaAndVolume;
pub use node::{Node, NodeId, NodeKind, NodePool, Region, Surface};
pub use persist::Version;
pub use reconstruct::Diagnostics;
pub use solid::{Solid, SolidType};
