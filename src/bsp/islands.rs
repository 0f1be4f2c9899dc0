//! Splitting a solid into its connected components.
//!
//! Two inside leaves are neighbors when their cells, each grown by a small
//! skin, overlap. Islands are the connected components of that neighbor
//! graph, and each island becomes a copy of the solid in which only its own
//! leaves stay inside.

use crate::bsp::boolean::REGION_SKIN;
use crate::bsp::node::{NodeId, NodeKind};
use crate::bsp::solid::Solid;
use crate::errors::CsgError;
use crate::feasibility::{PlaneSet, test_feasibility};
use crate::operation::Operation;
use crate::plane::Plane;
use hashbrown::HashMap;
use std::collections::VecDeque;
use tracing::{debug, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

impl Solid {
    /// Connected components of the inside region, one solid each. A solid with
    /// a single component yields one copy of itself, and one with no inside
    /// region yields nothing. Fails on a combined solid.
    #[instrument(skip_all)]
    pub fn decompose_into_islands(&self) -> Result<Vec<Solid>, CsgError> {
        if self.combined {
            warn!("decompose_into_islands refused: the solid is combined");
            return Err(CsgError::Combined {
                operation: "decompose_into_islands",
            });
        }

        let inside: Vec<NodeId> = self.leaves().filter(|&leaf| self.cache.nodes[leaf].side() == Some(1)).collect();
        if inside.is_empty() {
            return Ok(Vec::new());
        }

        let neighbors = self.find_inside_leaf_neighbors(&inside);
        let islands = find_islands(&neighbors);
        debug!(leaves = inside.len(), islands = islands.len(), "islands found");

        if islands.len() == 1 {
            return Ok(vec![self.clone()]);
        }
        Ok(self.island_solids(&inside, &islands))
    }

    #[cfg(not(feature = "parallel"))]
    fn island_solids(&self, inside: &[NodeId], islands: &[Vec<usize>]) -> Vec<Solid> {
        islands.iter().map(|island| self.island_solid(inside, island)).collect()
    }

    #[cfg(feature = "parallel")]
    fn island_solids(&self, inside: &[NodeId], islands: &[Vec<usize>]) -> Vec<Solid> {
        islands.par_iter().map(|island| self.island_solid(inside, island)).collect()
    }

    /// Copy of this solid with only the leaves of `island` inside. Clones share
    /// node ids, so `inside` indexes the copy too.
    fn island_solid(&self, inside: &[NodeId], island: &[usize]) -> Solid {
        let mut solid = self.clone();
        for &leaf in inside {
            solid.cache.nodes[leaf].set_side(0);
        }
        for &index in island {
            solid.cache.nodes[inside[index]].set_side(1);
        }
        solid.merge_leaves(Operation::SetA);
        solid
    }

    /// Adjacency lists over `inside`: for each inside leaf, the other inside
    /// leaves whose grown cells meet its grown cell.
    fn find_inside_leaf_neighbors(&self, inside: &[NodeId]) -> Vec<Vec<usize>> {
        let skin = REGION_SKIN * self.mesh_size;
        let index_of: HashMap<NodeId, usize> = inside.iter().enumerate().map(|(i, &leaf)| (leaf, i)).collect();
        let mut neighbors = vec![Vec::new(); inside.len()];

        for (i, &leaf) in inside.iter().enumerate() {
            let mut planes = self.leaf_region(leaf, skin);
            cull_unneeded_planes(&mut planes);
            if planes.is_empty() {
                continue;
            }

            // (node, length of the plane list at its parent, plane of the edge into it)
            let mut stack: Vec<(NodeId, usize, Option<Plane>)> = vec![(self.root, planes.len(), None)];
            while let Some((node, parent_len, edge)) = stack.pop() {
                planes.truncate(parent_len);
                if let Some(edge) = edge {
                    planes.push(edge);
                    if test_feasibility(&[], &PlaneSet::new(&planes)).is_empty() {
                        continue;
                    }
                }
                match self.cache.nodes[node].kind {
                    NodeKind::Leaf(region) => {
                        if region.side == 1 && node != leaf {
                            if let Some(&j) = index_of.get(&node) {
                                neighbors[i].push(j);
                            }
                        }
                    },
                    NodeKind::Branch(surface) => {
                        let plane = self.planes[surface.plane_index as usize];
                        let children = self.cache.nodes[node].children;
                        let len = planes.len();
                        if let Some(child1) = children[1] {
                            stack.push((child1, len, Some(Plane::new(plane.normal, plane.d - skin))));
                        }
                        if let Some(child0) = children[0] {
                            stack.push((child0, len, Some(Plane::new(-plane.normal, -plane.d - skin))));
                        }
                    },
                }
            }
        }
        neighbors
    }
}

/// Remove half-spaces whose removal leaves the intersection unchanged, found
/// by flipping each one and testing for emptiness.
fn cull_unneeded_planes(planes: &mut Vec<Plane>) {
    for index in (0..planes.len()).rev() {
        planes[index] = -planes[index];
        let needed = !test_feasibility(&[], &PlaneSet::new(planes)).is_empty();
        planes[index] = -planes[index];
        if !needed {
            planes.swap_remove(index);
        }
    }
}

/// Connected components of an adjacency list, by breadth-first search. Edges
/// are treated as undirected. Components come out ordered by their smallest
/// member, members in visiting order.
fn find_islands(neighbors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let count = neighbors.len();
    let mut adjacency = vec![Vec::new(); count];
    for (i, list) in neighbors.iter().enumerate() {
        for &j in list {
            adjacency[i].push(j);
            adjacency[j].push(i);
        }
    }

    let mut visited = vec![false; count];
    let mut islands = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..count {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut island = Vec::new();
        while let Some(i) = queue.pop_front() {
            island.push(i);
            for &j in &adjacency[i] {
                if !visited[j] {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }
        islands.push(island);
    }
    islands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::solid::SolidType;
    use nalgebra::Vector3;

    fn box_planes(center: Vector3<crate::float_types::Real>) -> Vec<Plane> {
        let mut planes = Vec::new();
        for axis in 0..3 {
            let mut n = Vector3::zeros();
            n[axis] = 1.0;
            planes.push(Plane::new(n, -1.0 - center[axis]));
            planes.push(Plane::new(-n, -1.0 + center[axis]));
        }
        planes
    }

    #[test]
    fn components_of_a_graph() {
        let neighbors = vec![vec![1], vec![], vec![], vec![2], vec![0]];
        let islands = find_islands(&neighbors);
        assert_eq!(islands, vec![vec![0, 1, 4], vec![2, 3]]);
    }

    #[test]
    fn culling_drops_redundant_planes() {
        let mut planes = box_planes(Vector3::zeros());
        // x <= 5 is implied by x <= 1
        planes.push(Plane::new(Vector3::x(), -5.0));
        cull_unneeded_planes(&mut planes);
        assert_eq!(planes.len(), 6);
    }

    #[test]
    fn two_separate_boxes_are_two_islands() {
        let a = Solid::from_convex_polyhedron(&box_planes(Vector3::zeros()), None, &[]);
        let b = Solid::from_convex_polyhedron(&box_planes(Vector3::new(5.0, 0.0, 0.0)), None, &[]);
        let union = a.boolean(&b, Operation::Union).unwrap();
        let islands = union.decompose_into_islands().unwrap();
        assert_eq!(islands.len(), 2);
        for island in &islands {
            assert_eq!(island.get_type(), SolidType::Nontrivial);
            let measure = island.surface_area_and_volume(true, None).unwrap();
            assert!((measure.volume - 8.0).abs() < 1e-6);
        }
    }

    #[test]
    fn touching_boxes_are_one_island() {
        let a = Solid::from_convex_polyhedron(&box_planes(Vector3::zeros()), None, &[]);
        let b = Solid::from_convex_polyhedron(&box_planes(Vector3::new(2.0, 0.0, 0.0)), None, &[]);
        let union = a.boolean(&b, Operation::Union).unwrap();
        assert_eq!(union.decompose_into_islands().unwrap().len(), 1);
    }

    #[test]
    fn empty_set_has_no_islands() {
        assert!(Solid::new().decompose_into_islands().unwrap().is_empty());
    }
}
