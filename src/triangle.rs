//! Triangles: the external render format and the internal splitting-surface format

use crate::float_types::Real;
use crate::plane::{Plane, transform_point};
use crate::vertex::{Vertex, VertexData};
use nalgebra::{Matrix4, Point3, Vector3};

/// A triangle as it enters and leaves the kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTriangle {
    pub vertices: [Vertex; 3],
    pub submesh_index: i32,
    pub smoothing_mask: u32,
    /// Opaque index into a caller-owned material frame table.
    pub extra_data_index: u32,
}

impl RenderTriangle {
    pub const fn new(vertices: [Vertex; 3]) -> Self {
        Self {
            vertices,
            submesh_index: 0,
            smoothing_mask: 0,
            extra_data_index: 0,
        }
    }

    /// Triangle with positions only; attributes get the geometric normal.
    pub fn from_positions(positions: [Point3<Real>; 3]) -> Self {
        let normal = (positions[1] - positions[0])
            .cross(&(positions[2] - positions[0]))
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::zeros);
        Self {
            vertices: positions.map(|p| Vertex::new(p, normal)),
            submesh_index: 0,
            smoothing_mask: 0,
            extra_data_index: 0,
        }
    }

    pub fn positions(&self) -> [Point3<Real>; 3] {
        [self.vertices[0].position, self.vertices[1].position, self.vertices[2].position]
    }

    pub fn area(&self) -> Real {
        let [a, b, c] = self.positions();
        0.5 * (b - a).cross(&(c - a)).norm()
    }
}

/// A triangle of a solid's mesh buffer. Attributes live in a parallel
/// interpolator buffer; only geometry and tags are kept here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Point3<Real>; 3],
    /// Unit normal, following the counter-clockwise winding.
    pub normal: Vector3<Real>,
    pub area: Real,
    pub submesh_index: i32,
    pub smoothing_mask: u32,
    pub extra_data_index: u32,
}

impl Default for Triangle {
    fn default() -> Self {
        Self {
            vertices: [Point3::origin(); 3],
            normal: Vector3::zeros(),
            area: 0.0,
            submesh_index: 0,
            smoothing_mask: 0,
            extra_data_index: 0,
        }
    }
}

impl Triangle {
    pub fn from_render_triangle(tri: &RenderTriangle) -> Self {
        let mut result = Self {
            vertices: tri.positions(),
            submesh_index: tri.submesh_index,
            smoothing_mask: tri.smoothing_mask,
            extra_data_index: tri.extra_data_index,
            ..Self::default()
        };
        result.calculate_quantities();
        result
    }

    /// Recompute the normal and area from the vertex positions.
    pub fn calculate_quantities(&mut self) {
        let e0 = self.vertices[1] - self.vertices[0];
        let e1 = self.vertices[2] - self.vertices[1];
        let e2 = self.vertices[0] - self.vertices[2];
        // each term is twice the area vector; summing spreads the rounding error
        let mut normal = e0.cross(&e1) + e1.cross(&e2) + e2.cross(&e0);
        let length = normal.norm();
        if length > 0.0 {
            normal /= length;
        }
        self.normal = normal;
        self.area = length / 6.0;
    }

    pub fn centroid(&self) -> Point3<Real> {
        Point3::from((self.vertices[0].coords + self.vertices[1].coords + self.vertices[2].coords) / 3.0)
    }

    /// Plane through the centroid with the triangle's normal.
    pub fn plane(&self) -> Plane {
        Plane::from_normal_and_point(self.normal, &self.centroid())
    }

    /// Move the vertices by `tm`. Mirroring transforms swap two vertices so the
    /// winding keeps facing outward.
    pub fn transform(&mut self, tm: &Matrix4<Real>, mirrored: bool) {
        for v in &mut self.vertices {
            *v = transform_point(tm, v);
        }
        if mirrored {
            self.vertices.swap(1, 2);
        }
        self.calculate_quantities();
    }

    pub fn to_render_triangle(&self, data: [VertexData; 3]) -> RenderTriangle {
        RenderTriangle {
            vertices: [0, 1, 2].map(|i| Vertex {
                position: self.vertices[i],
                data: data[i],
            }),
            submesh_index: self.submesh_index,
            smoothing_mask: self.smoothing_mask,
            extra_data_index: self.extra_data_index,
        }
    }
}
