//! Closed triangle meshes for common solids, ready for
//! [`Solid::from_mesh`](crate::bsp::Solid::from_mesh).
//!
//! Triangles wind counter-clockwise seen from outside and carry smooth or
//! per-face normals plus a UV set in channel 0.

use crate::float_types::{PI, Real, TAU};
use crate::triangle::RenderTriangle;
use crate::vertex::Vertex;
use nalgebra::{Point3, Vector2, Vector3};

/// Axis-aligned box with one corner at the origin and the opposite corner at
/// `(width, length, height)`.
///
/// ```text
///     4-------5
///    /|      /|
///   0-------1 |
///   | |     | |
///   | 7-----|-6
///   |/      |/
///   3-------2
/// ```
pub fn cuboid(width: Real, length: Real, height: Real) -> Vec<RenderTriangle> {
    let corners = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(width, 0.0, 0.0),
        Point3::new(width, length, 0.0),
        Point3::new(0.0, length, 0.0),
        Point3::new(0.0, 0.0, height),
        Point3::new(width, 0.0, height),
        Point3::new(width, length, height),
        Point3::new(0.0, length, height),
    ];
    let faces = [
        ([0, 3, 2, 1], -Vector3::z()),
        ([4, 5, 6, 7], Vector3::z()),
        ([0, 1, 5, 4], -Vector3::y()),
        ([3, 7, 6, 2], Vector3::y()),
        ([0, 4, 7, 3], -Vector3::x()),
        ([1, 2, 6, 5], Vector3::x()),
    ];
    let uvs = [
        Vector2::new(0.0, 0.0),
        Vector2::new(1.0, 0.0),
        Vector2::new(1.0, 1.0),
        Vector2::new(0.0, 1.0),
    ];

    let mut triangles = Vec::with_capacity(12);
    for (face, (indices, normal)) in faces.into_iter().enumerate() {
        let vertex = |k: usize| {
            let mut v = Vertex::new(corners[indices[k]], normal);
            v.data.uv[0] = uvs[k];
            v
        };
        for [a, b, c] in [[0, 1, 2], [0, 2, 3]] {
            let mut triangle = RenderTriangle::new([vertex(a), vertex(b), vertex(c)]);
            triangle.extra_data_index = face as u32;
            triangles.push(triangle);
        }
    }
    triangles
}

pub fn cube(width: Real) -> Vec<RenderTriangle> {
    cuboid(width, width, width)
}

/// UV sphere centered at the origin with smooth normals. Pole caps are fans,
/// so no degenerate triangles are emitted.
pub fn sphere(radius: Real, segments: usize, stacks: usize) -> Vec<RenderTriangle> {
    let segments = segments.max(3);
    let stacks = stacks.max(2);
    let vertex = |i: usize, j: usize| {
        let u = i as Real / segments as Real;
        let v = j as Real / stacks as Real;
        let (theta, phi) = (u * TAU, v * PI);
        let normal = Vector3::new(theta.cos() * phi.sin(), phi.cos(), theta.sin() * phi.sin());
        let mut vertex = Vertex::new(Point3::from(normal * radius), normal);
        vertex.data.uv[0] = Vector2::new(u, v);
        vertex
    };

    let mut triangles = Vec::with_capacity(2 * segments * stacks);
    for i in 0..segments {
        for j in 0..stacks {
            let (a, b, c, d) = (vertex(i, j), vertex(i + 1, j), vertex(i + 1, j + 1), vertex(i, j + 1));
            if j > 0 {
                triangles.push(RenderTriangle::new([a, b, c]));
            }
            if j + 1 < stacks {
                triangles.push(RenderTriangle::new([a, c, d]));
            }
        }
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_faces_point_outward() {
        let mesh = cuboid(1.0, 2.0, 3.0);
        assert_eq!(mesh.len(), 12);
        let center = Point3::new(0.5, 1.0, 1.5);
        for triangle in &mesh {
            let [a, b, c] = triangle.positions();
            let n = (b - a).cross(&(c - a));
            assert!(n.dot(&(a - center)) > 0.0);
            assert!(n.normalize().dot(&triangle.vertices[0].data.normal) > 0.999);
        }
        let area: Real = mesh.iter().map(RenderTriangle::area).sum();
        assert!((area - 22.0).abs() < 1e-12);
    }

    #[test]
    fn sphere_faces_point_outward() {
        let mesh = sphere(2.0, 12, 6);
        assert_eq!(mesh.len(), 2 * 12 * 6 - 2 * 12);
        for triangle in &mesh {
            let [a, b, c] = triangle.positions();
            let n = (b - a).cross(&(c - a));
            assert!(n.norm() > 0.0);
            let centroid = (a.coords + b.coords + c.coords) / 3.0;
            assert!(n.dot(&centroid) > 0.0);
        }
    }
}
