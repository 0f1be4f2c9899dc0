//! Boundary reconstruction.
//!
//! Every inside leaf is bounded by pieces of its ancestors' surfaces. Each
//! ancestor triangle is clipped to the leaf and the pieces are emitted facing
//! out of the leaf. Attributes come from the source triangle's interpolator,
//! evaluated at the caller-space position of each new vertex.

use crate::bsp::solid::Solid;
use crate::clip::{VertexPool, clip_triangle_to_halfspaces};
use crate::errors::CsgError;
use crate::float_types::{EPSILON, Real};
use crate::plane::determinant3;
use crate::triangle::{RenderTriangle, Triangle};
use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use tracing::{debug, instrument, warn};

/// Relative area error above which [`Solid::perform_diagnostics`] reports a triangle.
const AREA_ERROR_TOLERANCE: Real = 1e-6;

/// A piece of a source triangle clipped to an inside leaf (internal frame).
#[derive(Debug, Clone, Copy)]
struct ClippedTriangle {
    positions: [Point3<Real>; 3],
    /// Plane the piece lies on, `None` for incidental triangles.
    plane_index: Option<u32>,
    source: u32,
    /// Whether the piece keeps the winding of its source triangle.
    ccw: bool,
}

impl ClippedTriangle {
    fn area(&self) -> Real {
        let [a, b, c] = self.positions;
        0.5 * (b - a).cross(&(c - a)).norm()
    }
}

/// Findings of [`Solid::perform_diagnostics`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    /// Triangles no branch refers to.
    pub unreferenced_triangles: Vec<u32>,
    /// Triangles whose reconstructed pieces do not add up to their own area,
    /// with the relative error.
    pub area_errors: Vec<(u32, Real)>,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.unreferenced_triangles.is_empty() && self.area_errors.is_empty()
    }
}

type CellKey = [i64; 3];

fn cell_key(point: &Point3<Real>, cell: Real) -> CellKey {
    [0, 1, 2].map(|axis| (point[axis] / cell).round() as i64)
}

impl Solid {
    /// Reconstruct the boundary as triangles in caller space. Fails on a
    /// combined solid. A solid without triangles yields an empty mesh.
    #[instrument(skip_all, fields(triangles = self.mesh.len()))]
    pub fn to_mesh(&self) -> Result<Vec<RenderTriangle>, CsgError> {
        if self.combined {
            warn!("to_mesh refused: the solid is combined, use op() first");
            return Err(CsgError::Combined { operation: "to_mesh" });
        }

        let mut pool = VertexPool::new();
        let mut pieces = self.clip_mesh_to_leaves(&mut pool);
        if self.tolerances.cleaning > 0.0 && !self.incidental_mesh {
            pieces = self.clean_mesh(pieces);
        }

        let mirrored = determinant3(&self.internal_transform_inverse) < 0.0;
        let mesh: Vec<RenderTriangle> = pieces.iter().map(|piece| self.render_triangle(piece, mirrored)).collect();
        debug!(output = mesh.len(), "mesh reconstructed");
        Ok(mesh)
    }

    /// Check that every triangle is referenced by a branch and comes back from
    /// reconstruction with its full area. Findings are logged and returned.
    pub fn perform_diagnostics(&self) -> Diagnostics {
        debug!("diagnostics starting");
        let mut report = Diagnostics::default();
        let referenced = self.referenced_triangles();
        for (index, used) in referenced.iter().enumerate() {
            if !used {
                warn!(triangle = index, "triangle is not referenced by any branch");
                report.unreferenced_triangles.push(index as u32);
            }
        }

        let mut pool = VertexPool::new();
        let mut reconstructed = vec![0.0; self.mesh.len()];
        for piece in self.clip_mesh_to_leaves(&mut pool) {
            if piece.plane_index.is_some() {
                reconstructed[piece.source as usize] += piece.area();
            }
        }
        for (index, triangle) in self.mesh.iter().enumerate() {
            if !referenced[index] || triangle.area <= 0.0 {
                continue;
            }
            let error = reconstructed[index] / triangle.area - 1.0;
            if error.abs() > AREA_ERROR_TOLERANCE {
                warn!(triangle = index, error_percent = 100.0 * error, "triangle reconstructed with a different area");
                report.area_errors.push((index as u32, error));
            }
        }
        debug!(clean = report.is_clean(), "diagnostics finished");
        report
    }

    /// Triangles lying in some branch's surface range.
    fn referenced_triangles(&self) -> Vec<bool> {
        let mut referenced = vec![false; self.mesh.len()];
        for id in self.cache.nodes.iter(self.root) {
            if let Some(surface) = self.cache.nodes[id].surface() {
                referenced[surface.triangles()].fill(true);
            }
        }
        referenced
    }

    /// Clip ancestor triangles (and incidental ones) to every inside leaf.
    fn clip_mesh_to_leaves(&self, pool: &mut VertexPool) -> Vec<ClippedTriangle> {
        let tolerance = self.tolerances.clip * self.mesh_size;
        let origin = Point3::origin();
        let incidental: Vec<usize> = if self.incidental_mesh {
            let referenced = self.referenced_triangles();
            // referenced triangles already reach their leaves through the ancestor walk;
            // clipping them here too would emit them twice
            (0..self.mesh.len()).filter(|&i| !referenced[i]).collect()
        } else {
            Vec::new()
        };

        let mut output = Vec::new();
        let mut pieces = Vec::new();
        for leaf in self.leaves() {
            if self.cache.nodes[leaf].side() != Some(1) {
                continue;
            }
            let halfspaces = self.leaf_halfspaces(leaf);
            for (surface, side) in self.cache.nodes.surfaces(leaf) {
                for source in surface.triangles() {
                    pieces.clear();
                    clip_triangle_to_halfspaces(
                        pool,
                        &self.mesh[source].vertices,
                        side as usize,
                        &halfspaces,
                        Some(surface.plane_index),
                        tolerance,
                        &origin,
                        Some(&mut pieces),
                    );
                    output.extend(pieces.iter().map(|&positions| ClippedTriangle {
                        positions,
                        plane_index: Some(surface.plane_index),
                        source: source as u32,
                        ccw: side != 0,
                    }));
                }
            }
            for &source in &incidental {
                pieces.clear();
                clip_triangle_to_halfspaces(pool, &self.mesh[source].vertices, 1, &halfspaces, None, tolerance, &origin, Some(&mut pieces));
                output.extend(pieces.iter().map(|&positions| ClippedTriangle {
                    positions,
                    plane_index: None,
                    source: source as u32,
                    ccw: true,
                }));
            }
        }
        output
    }

    /// Remove reconstruction debris: faces with inside on both sides, exact
    /// duplicates and slivers thinner than the cleaning distance. Vertices
    /// closer than that distance are welded.
    fn clean_mesh(&self, mut pieces: Vec<ClippedTriangle>) -> Vec<ClippedTriangle> {
        let distance = (self.tolerances.cleaning * self.mesh_size).max(EPSILON);
        let probe = self.tolerances.linear * self.mesh_size;
        let before = pieces.len();

        pieces.retain(|piece| {
            let [a, b, c] = piece.positions;
            let Some(normal) = (b - a).cross(&(c - a)).try_normalize(0.0) else {
                return false;
            };
            let centroid = Point3::from((a.coords + b.coords + c.coords) / 3.0);
            let beyond = self.locate(&(centroid + normal * probe));
            self.cache.nodes[beyond].side() != Some(1)
        });

        let mut seen: HashSet<[CellKey; 3]> = HashSet::with_capacity(pieces.len());
        pieces.retain(|piece| {
            let mut keys = piece.positions.map(|p| cell_key(&p, distance));
            let first = (0..3).min_by_key(|&i| keys[i]).unwrap_or(0);
            keys.rotate_left(first);
            seen.insert(keys)
        });

        pieces.retain(|piece| {
            let [a, b, c] = piece.positions;
            let longest = (b - a).norm().max((c - b).norm()).max((a - c).norm());
            longest > 0.0 && 2.0 * piece.area() / longest >= distance
        });

        let mut welded: HashMap<CellKey, Point3<Real>> = HashMap::with_capacity(3 * pieces.len());
        for piece in &mut pieces {
            for position in &mut piece.positions {
                *position = weld(&mut welded, position, distance);
            }
        }
        pieces.retain(|piece| {
            let [a, b, c] = piece.positions;
            a != b && b != c && c != a
        });

        debug!(before, after = pieces.len(), "reconstructed mesh cleaned");
        pieces
    }

    fn render_triangle(&self, piece: &ClippedTriangle, mirrored: bool) -> RenderTriangle {
        let source = &self.mesh[piece.source as usize];
        let mut triangle = Triangle {
            vertices: piece.positions,
            submesh_index: source.submesh_index,
            smoothing_mask: source.smoothing_mask,
            extra_data_index: source.extra_data_index,
            ..Triangle::default()
        };
        triangle.transform(&self.internal_transform_inverse, mirrored);
        let frame = &self.frames[piece.source as usize];
        let data = triangle.vertices.map(|p| {
            let mut data = frame.interpolate(&p);
            if !piece.ccw {
                data.normal = -data.normal;
            }
            data
        });
        triangle.to_render_triangle(data)
    }
}

/// Snap `position` to a previously seen point within `distance`, or record it.
fn weld(welded: &mut HashMap<CellKey, Point3<Real>>, position: &Point3<Real>, distance: Real) -> Point3<Real> {
    let key = cell_key(position, distance);
    for dx in -1..=1 {
        for dy in -1..=1 {
            for dz in -1..=1 {
                if let Some(existing) = welded.get(&[key[0] + dx, key[1] + dy, key[2] + dz]) {
                    if (existing - position).norm() <= distance {
                        return *existing;
                    }
                }
            }
        }
    }
    *welded.entry(key).or_insert(*position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::Plane;
    use crate::vertex::Vertex;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn cube_planes() -> Vec<Plane> {
        let mut planes = Vec::new();
        for axis in 0..3 {
            let mut n = Vector3::zeros();
            n[axis] = 1.0;
            planes.push(Plane::new(n, -1.0));
            planes.push(Plane::new(-n, -1.0));
        }
        planes
    }

    #[test]
    fn convex_polyhedron_reconstructs_nothing_without_triangles() {
        let solid = Solid::from_convex_polyhedron(&cube_planes(), None, &[]);
        assert!(solid.to_mesh().unwrap().is_empty());
    }

    #[test]
    fn incidental_triangles_are_clipped_to_the_solid() {
        // a triangle through the middle of the cube, poking out along +x
        let normal = Vector3::z();
        let triangle = RenderTriangle::new([
            Vertex::new(Point3::new(-0.5, -0.5, 0.0), normal),
            Vertex::new(Point3::new(3.0, -0.5, 0.0), normal),
            Vertex::new(Point3::new(-0.5, 0.5, 0.0), normal),
        ]);
        let solid = Solid::from_convex_polyhedron(&cube_planes(), None, &[triangle]);
        let mesh = solid.to_mesh().unwrap();
        assert!(!mesh.is_empty());
        let area: Real = mesh.iter().map(RenderTriangle::area).sum();
        assert!(area < triangle.area());
        for tri in &mesh {
            for vertex in &tri.vertices {
                assert!(vertex.position.x <= 1.0 + 1e-6);
                assert_relative_eq!(vertex.data.normal.z, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn weld_snaps_nearby_points() {
        let mut welded = HashMap::new();
        let a = weld(&mut welded, &Point3::new(0.0, 0.0, 0.0), 1e-3);
        let b = weld(&mut welded, &Point3::new(4e-4, 0.0, 0.0), 1e-3);
        let c = weld(&mut welded, &Point3::new(0.5, 0.0, 0.0), 1e-3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
