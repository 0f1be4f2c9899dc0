//! Combining two solids and collapsing the result with an [`Operation`].
//!
//! [`Solid::combine`] grafts the other solid's tree below every leaf of this
//! one, pruning branches whose planes miss the leaf region, and packs both
//! operands' sides into the leaves. [`Solid::apply_op`] then evaluates an
//! operator on every leaf and merges sibling leaves that agree.

use crate::bsp::node::{Node, NodeId, NodeKind, Region, Surface};
use crate::bsp::solid::Solid;
use crate::errors::CsgError;
use crate::float_types::Real;
use crate::float_types::parry3d::bounding_volume::BoundingVolume;
use crate::operation::Operation;
use crate::plane::transforms_equal;
use tracing::{debug, instrument, warn};

/// Relative width by which leaf regions are grown when testing whether a
/// grafted plane actually splits them.
pub const REGION_SKIN: Real = 1e-4;

/// Internal transforms further apart than this are reported when combining.
const TRANSFORM_TOLERANCE: Real = 1e-3;

impl Solid {
    /// Merge `other` into this solid. Afterwards every leaf side packs this
    /// solid in bit 0 and `other` in bit 1, and only [`Solid::apply_op`],
    /// measurement with an operator and point queries with an operator are
    /// meaningful.
    #[instrument(skip_all, fields(planes = self.planes.len(), other_planes = other.planes.len()))]
    pub fn combine(&mut self, other: &Solid) -> Result<(), CsgError> {
        if self.combined || other.combined {
            warn!("combine refused: only two uncombined solids can be combined");
            return Err(CsgError::Combined { operation: "combine" });
        }
        if !transforms_equal(&self.internal_transform, &other.internal_transform, TRANSFORM_TOLERANCE) {
            warn!("combining solids with different internal transforms, the result is undefined");
        }

        let triangle_offset = self.mesh.len() as u32;
        let plane_offset = self.planes.len() as u32;
        self.mesh.extend_from_slice(&other.mesh);
        self.frames.extend_from_slice(&other.frames);
        self.planes.extend_from_slice(&other.planes);

        self.combine_trees(other, triangle_offset, plane_offset);

        self.combining_mesh_size = other.mesh_size;
        self.combining_incidental_mesh = other.incidental_mesh;
        self.mesh_bounds.merge(&other.mesh_bounds);
        self.combined = true;
        self.clean();
        debug!(nodes = self.cache.nodes.outstanding(), "trees combined");
        Ok(())
    }

    /// Collapse a combined solid in place by evaluating `operation` on every
    /// leaf.
    #[instrument(skip(self))]
    pub fn apply_op(&mut self, operation: Operation) -> Result<(), CsgError> {
        if !self.combined {
            warn!("op refused: the solid is not combined");
            return Err(CsgError::NotCombined { operation: "op" });
        }

        match operation.code() >> 1 {
            // depends on A only
            1 | 5 => {},
            // depends on B only
            2 | 6 => self.mesh_size = self.combining_mesh_size,
            // constant
            0 => self.mesh_size = 1.0,
            _ => self.mesh_size = self.mesh_size.min(self.combining_mesh_size),
        }

        self.merge_leaves(operation);
        self.incidental_mesh |= self.combining_incidental_mesh;
        self.combined = false;
        Ok(())
    }

    /// The result of `operation` applied to this combined solid.
    pub fn op(&self, operation: Operation) -> Result<Solid, CsgError> {
        let mut result = self.clone();
        result.apply_op(operation)?;
        Ok(result)
    }

    /// Combine with `other` and collapse with `operation` in one step.
    pub fn boolean(&self, other: &Solid, operation: Operation) -> Result<Solid, CsgError> {
        let mut result = self.clone();
        result.combine(other)?;
        result.apply_op(operation)?;
        Ok(result)
    }

    /// Graft `other`'s tree below every leaf, offsetting its surface indices.
    fn combine_trees(&mut self, other: &Solid, triangle_offset: u32, plane_offset: u32) {
        let skin = REGION_SKIN * self.mesh_size;
        let other_nodes = &other.cache.nodes;
        let mut stack: Vec<(NodeId, NodeId)> = Vec::with_capacity(self.planes.len());
        let mut frame = (self.root, other.root);

        loop {
            let (node, combine_node) = frame;
            match self.cache.nodes[node].kind {
                NodeKind::Branch(_) => {
                    if let [Some(child0), Some(child1)] = self.cache.nodes[node].children {
                        stack.push((child1, combine_node));
                        frame = (child0, combine_node);
                        continue;
                    }
                },
                NodeKind::Leaf(region) => match other_nodes[combine_node].kind {
                    NodeKind::Branch(surface) => {
                        if let [Some(combine0), Some(combine1)] = other_nodes[combine_node].children {
                            self.cache.nodes[node].kind = NodeKind::Branch(Surface {
                                plane_index: surface.plane_index + plane_offset,
                                triangle_start: surface.triangle_start + triangle_offset,
                                triangle_stop: surface.triangle_stop + triangle_offset,
                                total_triangle_area: surface.total_triangle_area,
                            });
                            let mut children = [node; 2];
                            let mut intersects = [false; 2];
                            for index in 0..2 {
                                let child = self.cache.nodes.borrow(Node::leaf(region.side));
                                self.cache.nodes.set_child(node, index, child);
                                children[index] = child;
                                intersects[index] = self.leaf_region_is_nonempty(child, skin);
                            }

                            if intersects[0] && intersects[1] {
                                stack.push((children[1], combine1));
                                frame = (children[0], combine0);
                                continue;
                            }

                            // the plane misses this leaf: undo the split and follow one side
                            for child in children {
                                self.cache.nodes.release_subtree(child);
                            }
                            self.cache.nodes[node].kind = NodeKind::Leaf(region);
                            if intersects[0] {
                                frame = (node, combine0);
                                continue;
                            }
                            if intersects[1] {
                                frame = (node, combine1);
                                continue;
                            }
                        }
                    },
                    NodeKind::Leaf(combine_region) => {
                        self.cache.nodes[node].kind = NodeKind::Leaf(Region {
                            side: region.side | combine_region.side << 1,
                        });
                    },
                },
            }
            match stack.pop() {
                Some(next) => frame = next,
                None => break,
            }
        }
    }

    /// Evaluate `operation` on every leaf and turn branches whose two children
    /// are leaves with the same side into leaves. Walks without a stack.
    pub(crate) fn merge_leaves(&mut self, operation: Operation) {
        let nodes = &mut self.cache.nodes;
        let mut node = self.root;
        let stop = nodes[node].parent;
        let mut up = false;

        loop {
            if up {
                up = nodes[node].index == 1;
                let parent = nodes[node].parent;
                if parent == stop {
                    break;
                }
                let Some(parent) = parent else { break };
                node = parent;
                if !up {
                    match nodes[node].children[1] {
                        Some(child1) => node = child1,
                        None => up = true,
                    }
                    continue;
                }
                if let [Some(child0), Some(child1)] = nodes[node].children {
                    if let (Some(side0), Some(side1)) = (nodes[child0].side(), nodes[child1].side()) {
                        if side0 == side1 {
                            nodes.release_subtree(child0);
                            nodes.release_subtree(child1);
                            nodes[node].kind = NodeKind::Leaf(Region { side: side0 });
                        }
                    }
                }
            } else {
                match nodes[node].kind {
                    NodeKind::Branch(_) => match nodes[node].children[0] {
                        Some(child0) => node = child0,
                        None => up = true,
                    },
                    NodeKind::Leaf(region) => {
                        nodes[node].set_side(operation.apply(region.side));
                        up = true;
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::solid::SolidType;
    use crate::plane::Plane;
    use nalgebra::{Point3, Vector3};

    fn slab(axis: usize, lo: Real, hi: Real) -> Solid {
        let mut n = Vector3::zeros();
        n[axis] = 1.0;
        Solid::from_convex_polyhedron(&[Plane::new(n, -hi), Plane::new(-n, lo)], None, &[])
    }

    #[test]
    fn combine_refuses_combined_operands() {
        let mut a = slab(0, 0.0, 1.0);
        a.combine(&slab(0, 0.5, 2.0)).unwrap();
        assert!(matches!(a.combine(&slab(1, 0.0, 1.0)), Err(CsgError::Combined { .. })));
        assert_eq!(a.get_type(), SolidType::Combined);
    }

    #[test]
    fn op_requires_combined() {
        let mut a = slab(0, 0.0, 1.0);
        assert!(matches!(a.apply_op(Operation::Union), Err(CsgError::NotCombined { .. })));
    }

    #[test]
    fn overlapping_slabs() {
        let a = slab(0, 0.0, 1.0);
        let b = slab(0, 0.5, 2.0);
        let union = a.boolean(&b, Operation::Union).unwrap();
        let intersection = a.boolean(&b, Operation::Intersection).unwrap();
        let difference = a.boolean(&b, Operation::AMinusB).unwrap();
        for (x, in_union, in_intersection, in_difference) in [
            (-0.5, false, false, false),
            (0.25, true, false, true),
            (0.75, true, true, false),
            (1.5, true, false, false),
            (2.5, false, false, false),
        ] {
            let p = Point3::new(x, 0.0, 0.0);
            assert_eq!(union.point_inside(&p, None).unwrap(), in_union, "union at {x}");
            assert_eq!(intersection.point_inside(&p, None).unwrap(), in_intersection, "intersection at {x}");
            assert_eq!(difference.point_inside(&p, None).unwrap(), in_difference, "difference at {x}");
        }
    }

    #[test]
    fn constant_operators_collapse_to_a_leaf() {
        let a = slab(0, 0.0, 1.0);
        let b = slab(1, 0.0, 1.0);
        assert_eq!(a.boolean(&b, Operation::EmptySet).unwrap().get_type(), SolidType::EmptySet);
        assert_eq!(a.boolean(&b, Operation::AllSpace).unwrap().get_type(), SolidType::AllSpace);
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = slab(0, 0.0, 1.0);
        let b = slab(0, 2.0, 3.0);
        let result = a.boolean(&b, Operation::Intersection).unwrap();
        assert_eq!(result.get_type(), SolidType::EmptySet);
    }
}
