//! Tolerances and tree-construction parameters.
//!
//! Every build call takes these by reference; there is no process-wide default
//! that can be mutated.

use crate::float_types::Real;
use nalgebra::Matrix4;

/// Tolerances used while building and evaluating a solid.
///
/// All distances are relative: they are multiplied by the solid's mesh size
/// (or applied in the normalized build frame, where the mesh size is 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Maximum distance of a vertex from a surface plane for its triangle to join the surface.
    pub linear: Real,
    /// Maximum `|n × n'|` between a triangle normal and a surface normal.
    pub angular: Real,
    /// Tolerance of the spatial partitioning itself (vertex classification, redundancy tests).
    pub base: Real,
    /// Tolerance used when clipping triangles to leaf regions during reconstruction.
    pub clip: Real,
    /// Distance below which reconstructed geometry is considered degenerate. Zero disables cleaning.
    pub cleaning: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            linear: 1e-4,
            angular: 1e-3,
            base: 1e-6,
            clip: 1e-4,
            cleaning: 1e-7,
        }
    }
}

/// Parameters for [`Solid::from_mesh`](crate::bsp::Solid::from_mesh).
#[derive(Debug, Clone, PartialEq)]
pub struct BuildParameters {
    pub tolerances: Tolerances,
    /// If positive, input positions are snapped to a grid with this many cells per unit
    /// of the normalized frame.
    pub snap_grid_size: u32,
    /// Weight of split triangles in the branch-surface score.
    pub split_weight: Real,
    /// Weight of the front/back imbalance in the branch-surface score.
    pub imbalance_weight: Real,
    /// Number of candidate surfaces scored per branch. Zero scores every surface.
    pub test_set_size: u32,
    /// If the largest surface's log-area lies within this many standard deviations
    /// of the mean, candidates are scored instead of taking the largest. Zero disables scoring.
    pub log_area_sigma_threshold: Real,
    /// Frame the tree is built in. `None` builds in the normalized unit frame.
    pub internal_transform: Option<Matrix4<Real>>,
    /// Keep the source triangles after the tree is built. Without them the solid can
    /// still be queried but not reconstructed.
    pub keep_triangles: bool,
}

impl Default for BuildParameters {
    fn default() -> Self {
        Self {
            tolerances: Tolerances::default(),
            snap_grid_size: 0,
            split_weight: 0.5,
            imbalance_weight: 0.0,
            test_set_size: 10,
            log_area_sigma_threshold: 2.0,
            internal_transform: None,
            keep_triangles: true,
        }
    }
}

impl BuildParameters {
    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn with_snap_grid_size(mut self, snap_grid_size: u32) -> Self {
        self.snap_grid_size = snap_grid_size;
        self
    }

    pub fn with_weights(mut self, split_weight: Real, imbalance_weight: Real) -> Self {
        self.split_weight = split_weight;
        self.imbalance_weight = imbalance_weight;
        self
    }

    pub fn with_test_set_size(mut self, test_set_size: u32) -> Self {
        self.test_set_size = test_set_size;
        self
    }

    pub fn with_log_area_sigma_threshold(mut self, threshold: Real) -> Self {
        self.log_area_sigma_threshold = threshold;
        self
    }

    pub fn with_internal_transform(mut self, transform: Matrix4<Real>) -> Self {
        self.internal_transform = Some(transform);
        self
    }

    pub fn with_keep_triangles(mut self, keep_triangles: bool) -> Self {
        self.keep_triangles = keep_triangles;
        self
    }
}
