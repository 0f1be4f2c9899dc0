//! The solid: a tree plus the triangle, plane and interpolator buffers it refers to.

use crate::bsp::cache::MemCache;
use crate::bsp::node::{Node, NodeId, NodeKind, NodePool};
use crate::config::Tolerances;
use crate::errors::CsgError;
use crate::feasibility::{PlaneSet, test_feasibility};
use crate::float_types::Real;
use crate::float_types::parry3d::bounding_volume::Aabb;
use crate::interpolator::Interpolator;
use crate::plane::{Plane, determinant3, inverse34, is_identity, plane_matrix, transform_point};
use crate::triangle::Triangle;
use hashbrown::HashSet;
use nalgebra::{Matrix4, Point3};
use tracing::warn;

/// Coarse classification of a solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolidType {
    /// Mid-operation: combined but no operator applied yet.
    Combined,
    /// A tree with at least one branch.
    Nontrivial,
    AllSpace,
    EmptySet,
}

/// A BSP solid.
///
/// The tree lives in an internal frame. Triangles and planes are stored in that
/// frame; `internal_transform` maps caller space into it and
/// `internal_transform_inverse` maps back. Interpolation frames evaluate caller
/// space positions.
#[derive(Debug, Clone)]
pub struct Solid {
    pub(crate) cache: MemCache,
    pub(crate) root: NodeId,
    pub(crate) tolerances: Tolerances,
    pub(crate) mesh: Vec<Triangle>,
    pub(crate) frames: Vec<Interpolator>,
    pub(crate) planes: Vec<Plane>,
    pub(crate) mesh_size: Real,
    pub(crate) mesh_bounds: Aabb,
    pub(crate) internal_transform: Matrix4<Real>,
    pub(crate) internal_transform_inverse: Matrix4<Real>,
    /// Triangles decorate the surface but do not split space.
    pub(crate) incidental_mesh: bool,
    pub(crate) combined: bool,
    pub(crate) combining_mesh_size: Real,
    pub(crate) combining_incidental_mesh: bool,
}

impl Default for Solid {
    fn default() -> Self {
        Self::new()
    }
}

impl Solid {
    /// The empty set.
    pub fn new() -> Self {
        Self::from_trivial(false)
    }

    /// A single-leaf tree: all of space if `inside`, the empty set otherwise.
    pub fn from_trivial(inside: bool) -> Self {
        let mut cache = MemCache::new();
        let root = cache.nodes.borrow(Node::leaf(inside as u32));
        Self {
            cache,
            root,
            tolerances: Tolerances::default(),
            mesh: Vec::new(),
            frames: Vec::new(),
            planes: Vec::new(),
            mesh_size: 1.0,
            mesh_bounds: Aabb::new_invalid(),
            internal_transform: Matrix4::identity(),
            internal_transform_inverse: Matrix4::identity(),
            incidental_mesh: false,
            combined: false,
            combining_mesh_size: 1.0,
            combining_incidental_mesh: false,
        }
    }

    pub const fn root(&self) -> NodeId {
        self.root
    }

    pub const fn nodes(&self) -> &NodePool {
        &self.cache.nodes
    }

    pub const fn mem_cache(&mut self) -> &mut MemCache {
        &mut self.cache
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.mesh
    }

    pub fn interpolators(&self) -> &[Interpolator] {
        &self.frames
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub const fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    pub fn set_tolerances(&mut self, tolerances: Tolerances) {
        self.tolerances = tolerances;
    }

    pub const fn mesh_size(&self) -> Real {
        self.mesh_size
    }

    /// Bounds of the triangle buffer, in the internal frame.
    pub const fn mesh_bounds(&self) -> &Aabb {
        &self.mesh_bounds
    }

    pub const fn internal_transform(&self) -> &Matrix4<Real> {
        &self.internal_transform
    }

    pub const fn internal_transform_inverse(&self) -> &Matrix4<Real> {
        &self.internal_transform_inverse
    }

    pub const fn is_combined(&self) -> bool {
        self.combined
    }

    pub const fn is_incidental_mesh(&self) -> bool {
        self.incidental_mesh
    }

    pub fn get_type(&self) -> SolidType {
        if self.combined {
            return SolidType::Combined;
        }
        match self.cache.nodes[self.root].kind {
            NodeKind::Branch(_) => SolidType::Nontrivial,
            NodeKind::Leaf(region) if region.side != 0 => SolidType::AllSpace,
            NodeKind::Leaf(_) => SolidType::EmptySet,
        }
    }

    /// Leaf nodes in pre-order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cache.nodes.iter(self.root).filter(|id| self.cache.nodes[*id].is_leaf())
    }

    /// Release every node and buffer, leaving the empty set. The arena's
    /// accounting is checked on the way.
    pub fn clear(&mut self) {
        self.cache.nodes.release_subtree(self.root);
        self.cache.clear_all();
        let tolerances = self.tolerances;
        *self = Self {
            cache: std::mem::take(&mut self.cache),
            ..Self::new()
        };
        self.root = self.cache.nodes.borrow(Node::leaf(0));
        self.tolerances = tolerances;
    }

    /// Swap inside and outside.
    pub fn complement(&mut self) -> Result<(), CsgError> {
        if self.combined {
            warn!("complement refused: solid is combined");
            return Err(CsgError::Combined { operation: "complement" });
        }
        let leaves: Vec<NodeId> = self.leaves().collect();
        for leaf in leaves {
            if let NodeKind::Leaf(region) = &mut self.cache.nodes[leaf].kind {
                region.side ^= 1;
            }
        }
        Ok(())
    }

    /// Half-spaces bounding `leaf`, nearest ancestor first, each tagged with its
    /// plane index. A leaf in slot 1 of a branch keeps the plane as is, slot 0 negates it.
    pub(crate) fn leaf_halfspaces(&self, leaf: NodeId) -> Vec<(u32, Plane)> {
        self.cache
            .nodes
            .surfaces(leaf)
            .map(|(surface, side)| {
                let plane = self.planes[surface.plane_index as usize];
                (surface.plane_index, if side != 0 { plane } else { -plane })
            })
            .collect()
    }

    /// Half-spaces of `leaf` pushed outward by `skin`, for emptiness tests.
    pub(crate) fn leaf_region(&self, leaf: NodeId, skin: Real) -> Vec<Plane> {
        self.leaf_halfspaces(leaf)
            .into_iter()
            .map(|(_, plane)| Plane::new(plane.normal, plane.d - skin))
            .collect()
    }

    /// Whether the region of `leaf`, grown by `skin`, has any volume.
    pub(crate) fn leaf_region_is_nonempty(&self, leaf: NodeId, skin: Real) -> bool {
        let planes = self.leaf_region(leaf, skin);
        !test_feasibility(&[], &PlaneSet::new(&planes)).is_empty()
    }

    /// Leaf containing `point` (internal frame).
    pub(crate) fn locate(&self, point: &Point3<Real>) -> NodeId {
        let nodes = &self.cache.nodes;
        let mut id = self.root;
        while let NodeKind::Branch(surface) = nodes[id].kind {
            let index = (self.planes[surface.plane_index as usize].distance(point) <= 0.0) as usize;
            match nodes[id].children[index] {
                Some(child) => id = child,
                None => break,
            }
        }
        id
    }

    /// Move the solid by `tm`, given in caller space.
    pub fn transform(&mut self, tm: &Matrix4<Real>) {
        let net = self.internal_transform * tm * self.internal_transform_inverse;
        if !is_identity(&net) {
            self.apply_transform(&net, Some(tm));
        }
    }

    pub fn transformed(&self, tm: &Matrix4<Real>) -> Solid {
        let mut result = self.clone();
        result.transform(tm);
        result
    }

    /// Become a copy of `other` moved by `tm` (caller space), optionally adopting a
    /// new internal frame.
    pub fn copy_from(&mut self, other: &Solid, tm: &Matrix4<Real>, internal_transform: Option<Matrix4<Real>>) {
        *self = other.clone();
        let old_inverse = self.internal_transform_inverse;
        if let Some(internal) = internal_transform {
            self.internal_transform = internal;
            self.internal_transform_inverse = inverse34(&internal);
        }
        let net = self.internal_transform * tm * old_inverse;
        if !is_identity(&net) {
            self.apply_transform(&net, Some(tm));
        }
    }

    /// Apply `net` to everything stored in the internal frame. Interpolation
    /// frames move with `frame_tm` when given.
    pub(crate) fn apply_transform(&mut self, net: &Matrix4<Real>, frame_tm: Option<&Matrix4<Real>>) {
        let det = determinant3(net);
        let mirrored = det < 0.0;
        for triangle in &mut self.mesh {
            triangle.transform(net, mirrored);
        }
        if let Some(frame_tm) = frame_tm {
            for frame in &mut self.frames {
                *frame = frame.transformed(frame_tm);
            }
        }

        let plane_tm = plane_matrix(net);
        let mut area_scales = Vec::with_capacity(self.planes.len());
        for plane in &mut self.planes {
            *plane = plane.transformed(&plane_tm);
            area_scales.push(plane.normalize());
        }
        let branches: Vec<NodeId> = self.cache.nodes.iter(self.root).collect();
        for id in branches {
            if let NodeKind::Branch(surface) = &mut self.cache.nodes[id].kind {
                surface.total_triangle_area *= area_scales[surface.plane_index as usize] as f32;
            }
        }

        let linear_scale = det.abs().cbrt();
        self.mesh_size *= linear_scale;
        self.combining_mesh_size *= linear_scale;
        if self.mesh.is_empty() {
            if self.mesh_bounds.mins.x <= self.mesh_bounds.maxs.x {
                let mut bounds = Aabb::new_invalid();
                for corner in self.mesh_bounds.vertices() {
                    bounds.take_point(transform_point(net, &corner));
                }
                self.mesh_bounds = bounds;
            }
        } else {
            self.update_mesh_bounds();
        }
    }

    pub(crate) fn update_mesh_bounds(&mut self) {
        let mut bounds = Aabb::new_invalid();
        for triangle in &self.mesh {
            for vertex in &triangle.vertices {
                bounds.take_point(*vertex);
            }
        }
        self.mesh_bounds = bounds;
    }

    /// Drop planes and triangles that no branch refers to (all triangles stay when the
    /// mesh is incidental), recompute the bounds and mesh size, and re-index the tree.
    pub fn clean(&mut self) {
        let mut plane_used = vec![false; self.planes.len()];
        let mut triangle_used = vec![false; self.mesh.len()];
        for id in self.cache.nodes.iter(self.root) {
            if let NodeKind::Branch(surface) = self.cache.nodes[id].kind {
                plane_used[surface.plane_index as usize] = true;
                for index in surface.triangles() {
                    triangle_used[index] = true;
                }
            }
        }
        if self.incidental_mesh || (self.combined && self.combining_incidental_mesh) {
            triangle_used.fill(true);
        }

        let plane_map = compact(&mut self.planes, &plane_used);
        let triangle_map = compact(&mut self.mesh, &triangle_used);
        compact(&mut self.frames, &triangle_used);

        self.update_mesh_bounds();
        if !self.mesh.is_empty() {
            self.mesh_size = self.mesh_bounds.half_extents().max();
        }

        let branches: Vec<NodeId> = self.cache.nodes.iter(self.root).collect();
        for id in branches {
            if let NodeKind::Branch(surface) = &mut self.cache.nodes[id].kind {
                let count = surface.triangle_count();
                surface.plane_index = plane_map[surface.plane_index as usize];
                surface.triangle_start = triangle_map[surface.triangle_start as usize];
                surface.triangle_stop = surface.triangle_start + count;
            }
        }
    }

    /// Give every triangle whose extra-data index is listed in `frame_indices` the
    /// submesh `submesh_index`.
    pub fn replace_interior_submeshes(&mut self, frame_indices: &[u32], submesh_index: i32) {
        let frames: HashSet<u32> = frame_indices.iter().copied().collect();
        for triangle in &mut self.mesh {
            if frames.contains(&triangle.extra_data_index) {
                triangle.submesh_index = submesh_index;
            }
        }
    }

    /// Drop the triangle buffer. The tree still answers containment and
    /// measurement queries; reconstruction yields nothing.
    pub fn delete_triangles(&mut self) {
        self.mesh = Vec::new();
        self.frames = Vec::new();
        let branches: Vec<NodeId> = self.cache.nodes.iter(self.root).collect();
        for id in branches {
            if let NodeKind::Branch(surface) = &mut self.cache.nodes[id].kind {
                surface.triangle_start = 0;
                surface.triangle_stop = 0;
                surface.total_triangle_area = 0.0;
            }
        }
    }
}

/// Keep the flagged items in order. Returns old index → new index, with one
/// trailing entry so that range ends map too.
fn compact<T: Copy>(items: &mut Vec<T>, used: &[bool]) -> Vec<u32> {
    let mut map = Vec::with_capacity(items.len() + 1);
    let mut next = 0usize;
    for old in 0..items.len() {
        map.push(next as u32);
        if used[old] {
            items[next] = items[old];
            next += 1;
        }
    }
    map.push(next as u32);
    items.truncate(next);
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_solids() {
        assert_eq!(Solid::new().get_type(), SolidType::EmptySet);
        let mut all = Solid::from_trivial(true);
        assert_eq!(all.get_type(), SolidType::AllSpace);
        all.complement().unwrap();
        assert_eq!(all.get_type(), SolidType::EmptySet);
    }

    #[test]
    fn clear_resets_to_empty_set() {
        let mut solid = Solid::from_trivial(true);
        solid.clear();
        assert_eq!(solid.get_type(), SolidType::EmptySet);
        assert_eq!(solid.nodes().outstanding(), 1);
    }

    #[test]
    fn compact_maps_range_ends() {
        let mut items = vec![10, 11, 12, 13];
        let map = compact(&mut items, &[false, true, true, false]);
        assert_eq!(items, vec![11, 12]);
        assert_eq!(map, vec![0, 0, 1, 2, 2]);
    }
}
