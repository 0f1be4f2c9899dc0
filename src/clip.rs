//! Convex polygon clipping against half-spaces.
//!
//! Polygons are circular doubly linked rings of vertices borrowed from a
//! [`VertexPool`]. Clipping inserts at most two new vertices per plane and
//! returns everything it cuts away to the pool, so a pool reused across
//! calls stops allocating once it has grown to the working size.

use crate::float_types::Real;
use crate::plane::{BACK, COPLANAR, FRONT, Plane};
use nalgebra::{Point3, Vector3};

/// Index of a vertex in a [`VertexPool`].
pub type VertexId = u32;

#[derive(Debug, Clone, Copy)]
struct LinkedVertex {
    position: Point3<Real>,
    /// `adj[1]` is the next vertex along the ring, `adj[0]` the previous.
    adj: [VertexId; 2],
}

/// Arena of ring vertices.
#[derive(Debug, Clone, Default)]
pub struct VertexPool {
    vertices: Vec<LinkedVertex>,
    free: Vec<VertexId>,
    outstanding: usize,
}

impl VertexPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a vertex forming a ring of one.
    pub fn borrow(&mut self, position: Point3<Real>) -> VertexId {
        self.outstanding += 1;
        match self.free.pop() {
            Some(id) => {
                self.vertices[id as usize] = LinkedVertex { position, adj: [id, id] };
                id
            },
            None => {
                let id = self.vertices.len() as VertexId;
                self.vertices.push(LinkedVertex { position, adj: [id, id] });
                id
            },
        }
    }

    /// Return a vertex. It must already be unlinked from any ring.
    pub fn replace(&mut self, id: VertexId) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(id);
    }

    /// Vertices currently borrowed.
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Drop every vertex, borrowed or not. Returns the count that was still borrowed.
    pub fn clear(&mut self) -> usize {
        let leaked = self.outstanding;
        self.vertices.clear();
        self.free.clear();
        self.outstanding = 0;
        leaked
    }

    #[inline]
    pub fn position(&self, id: VertexId) -> Point3<Real> {
        self.vertices[id as usize].position
    }

    #[inline]
    pub fn adj(&self, id: VertexId, dir: usize) -> VertexId {
        self.vertices[id as usize].adj[dir]
    }

    /// Insert the singleton `node` next to `id` in direction `dir`.
    pub fn set_adj(&mut self, id: VertexId, dir: usize, node: VertexId) {
        let other = self.adj(id, dir);
        self.vertices[node as usize].adj[1 - dir] = id;
        self.vertices[node as usize].adj[dir] = other;
        self.vertices[other as usize].adj[1 - dir] = node;
        self.vertices[id as usize].adj[dir] = node;
    }

    /// Unlink `id` from its ring, leaving it a ring of one.
    pub fn remove(&mut self, id: VertexId) {
        let [prev, next] = self.vertices[id as usize].adj;
        self.vertices[prev as usize].adj[1] = next;
        self.vertices[next as usize].adj[0] = prev;
        self.vertices[id as usize].adj = [id, id];
    }

    /// Return a whole ring to the pool.
    pub fn release_ring(&mut self, head: VertexId) {
        loop {
            let v = self.adj(head, 0);
            self.remove(v);
            self.replace(v);
            if v == head {
                break;
            }
        }
    }

    /// Build a ring from a triangle. `edge_dir == 1` keeps the winding,
    /// `edge_dir == 0` reverses it.
    pub fn ring_from_triangle(&mut self, positions: &[Point3<Real>; 3], edge_dir: usize) -> VertexId {
        let v0 = self.borrow(positions[0]);
        let v1 = self.borrow(positions[1]);
        let v2 = self.borrow(positions[2]);
        self.set_adj(v0, edge_dir, v1);
        self.set_adj(v1, edge_dir, v2);
        v0
    }

    /// Positions of a ring, following `adj[1]` from `head`.
    pub fn ring_positions(&self, head: VertexId) -> Vec<Point3<Real>> {
        let mut positions = vec![self.position(head)];
        let mut v = self.adj(head, 1);
        while v != head {
            positions.push(self.position(v));
            v = self.adj(v, 1);
        }
        positions
    }

    /// Clip the ring at `head` to `plane.distance(x) <= tolerance`. Vertices within
    /// `tolerance` of the plane count as on it. Returns the new head, or `None` if
    /// the polygon lies entirely outside (its vertices go back to the pool).
    pub fn clip_polygon_by_plane(&mut self, head: VertexId, plane: &Plane, tolerance: Real) -> Option<VertexId> {
        let mut head = head;
        let mut prev = head;
        let mut prev_side = plane.classify(&self.position(prev), tolerance);
        let mut outside_found = prev_side == FRONT;
        let mut inside_found = prev_side == BACK;
        let mut clip0: Option<VertexId> = None;
        let mut clip1: Option<VertexId> = None;

        let mut next = self.adj(prev, 1);
        if next != head {
            loop {
                let next_side = plane.classify(&self.position(next), tolerance);
                match next_side {
                    BACK => {
                        inside_found = true;
                        if prev_side == FRONT {
                            let v = self.intersection(prev, next, plane);
                            self.set_adj(next, 0, v);
                            clip1 = Some(v);
                        } else if prev_side == COPLANAR {
                            clip1 = Some(prev);
                        }
                    },
                    COPLANAR => {
                        if prev_side == BACK {
                            clip0 = Some(next);
                        } else if prev_side == FRONT {
                            clip1 = Some(next);
                        }
                    },
                    _ => {
                        outside_found = true;
                        if prev_side == BACK {
                            let v = self.intersection(prev, next, plane);
                            self.set_adj(next, 0, v);
                            clip0 = Some(v);
                        } else if prev_side == COPLANAR {
                            clip0 = Some(prev);
                        }
                    },
                }
                prev = next;
                prev_side = next_side;
                next = self.adj(prev, 1);
                if prev == head {
                    break;
                }
            }
        }

        if let (Some(c0), Some(c1)) = (clip0, clip1) {
            if c0 != c1 {
                let mut v = self.adj(c0, 1);
                while v != c1 {
                    let w = self.adj(v, 1);
                    self.remove(v);
                    self.replace(v);
                    v = w;
                }
                head = c1;
            }
        }

        if outside_found && !inside_found {
            self.release_ring(head);
            return None;
        }
        Some(head)
    }

    /// Borrow the point where segment `a → b` crosses `plane`.
    fn intersection(&mut self, a: VertexId, b: VertexId, plane: &Plane) -> VertexId {
        let pa = self.position(a);
        let disp: Vector3<Real> = self.position(b) - pa;
        let d_disp = disp.dot(&plane.normal);
        let position = if d_disp != 0.0 {
            pa - disp * (plane.distance(&pa) / d_disp)
        } else {
            pa
        };
        self.borrow(position)
    }
}

/// Area and 3× signed pyramid volume of a clipped piece, measured from an origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClipMeasure {
    pub area: Real,
    pub pyramid_volume3: Real,
}

/// Clip a triangle to the intersection of `halfspaces` (each `plane(x) <= 0`,
/// tagged with the plane index it came from, which is skipped when equal to
/// `skip_plane`), fan-triangulate what is left into `output` if given, and measure it.
pub fn clip_triangle_to_halfspaces(
    pool: &mut VertexPool,
    positions: &[Point3<Real>; 3],
    edge_dir: usize,
    halfspaces: &[(u32, Plane)],
    skip_plane: Option<u32>,
    tolerance: Real,
    origin: &Point3<Real>,
    mut output: Option<&mut Vec<[Point3<Real>; 3]>>,
) -> ClipMeasure {
    let mut measure = ClipMeasure::default();
    let mut head = Some(pool.ring_from_triangle(positions, edge_dir));

    for (plane_index, plane) in halfspaces {
        if Some(*plane_index) == skip_plane {
            continue;
        }
        let Some(h) = head else { break };
        head = pool.clip_polygon_by_plane(h, plane, tolerance);
    }

    let Some(v0) = head else {
        return measure;
    };
    let mut v1 = pool.adj(v0, 1);
    let mut v2 = pool.adj(v1, 1);
    if v1 != v0 && v2 != v0 {
        let p0 = pool.position(v0);
        while v2 != v0 {
            let p1 = pool.position(v1);
            let p2 = pool.position(v2);
            let cross = (p1 - p0).cross(&(p2 - p0));
            let length = cross.norm();
            if length > 0.0 {
                let area = 0.5 * length;
                measure.area += area;
                measure.pyramid_volume3 += area * (p0 - origin).dot(&(cross / length));
            }
            if let Some(out) = output.as_deref_mut() {
                out.push([p0, p1, p2]);
            }
            v1 = v2;
            v2 = pool.adj(v2, 1);
        }
    }
    pool.release_ring(v0);
    measure
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_triangle() -> [Point3<Real>; 3] {
        [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)]
    }

    #[test]
    fn unclipped_triangle_keeps_area() {
        let mut pool = VertexPool::new();
        let m = clip_triangle_to_halfspaces(&mut pool, &unit_triangle(), 1, &[], None, 1e-9, &Point3::origin(), None);
        assert_relative_eq!(m.area, 0.5, epsilon = 1e-12);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn clip_removes_half() {
        let mut pool = VertexPool::new();
        let mut out = Vec::new();
        // keep x <= 0.5
        let halfspaces = [(0, Plane::new(Vector3::x(), -0.5))];
        let m = clip_triangle_to_halfspaces(&mut pool, &unit_triangle(), 1, &halfspaces, None, 1e-9, &Point3::origin(), Some(&mut out));
        assert_relative_eq!(m.area, 0.5 - 0.125, epsilon = 1e-12);
        assert_eq!(out.len(), 2);
        for tri in &out {
            for p in tri {
                assert!(p.x <= 0.5 + 1e-12);
            }
            let n = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
            assert!(n.z > 0.0);
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn reversed_ring_flips_winding() {
        let mut pool = VertexPool::new();
        let mut out = Vec::new();
        clip_triangle_to_halfspaces(&mut pool, &unit_triangle(), 0, &[], None, 1e-9, &Point3::origin(), Some(&mut out));
        let tri = out[0];
        assert!((tri[1] - tri[0]).cross(&(tri[2] - tri[0])).z < 0.0);
    }

    #[test]
    fn fully_outside_is_eliminated_and_skipped_plane_ignored() {
        let mut pool = VertexPool::new();
        let halfspaces = [(7, Plane::new(-Vector3::x(), 2.0))];
        let m = clip_triangle_to_halfspaces(&mut pool, &unit_triangle(), 1, &halfspaces, None, 1e-9, &Point3::origin(), None);
        assert_eq!(m.area, 0.0);
        let m = clip_triangle_to_halfspaces(&mut pool, &unit_triangle(), 1, &halfspaces, Some(7), 1e-9, &Point3::origin(), None);
        assert_relative_eq!(m.area, 0.5, epsilon = 1e-12);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn touching_plane_keeps_degenerate_nothing() {
        // triangle lies in x >= 0 with an edge on x = 0; clip to x <= 0
        let mut pool = VertexPool::new();
        let halfspaces = [(0, Plane::new(Vector3::x(), 0.0))];
        let m = clip_triangle_to_halfspaces(&mut pool, &unit_triangle(), 1, &halfspaces, None, 1e-9, &Point3::origin(), None);
        assert_eq!(m.area, 0.0);
        assert_eq!(pool.outstanding(), 0);
    }
}
