use crate::bsp::Solid;
use crate::errors::CsgError;
use crate::float_types::parry3d::bounding_volume::Aabb;
use crate::float_types::{EPSILON, Real};
use crate::operation::Operation;
use crate::plane::{Plane, transform_point};
use nalgebra::{Matrix3, Matrix4, Rotation3, Translation3, Vector3};

/// Boolean operations + transformations
pub trait BooleanOps: Sized + Clone {
    fn union(&self, other: &Self) -> Result<Self, CsgError>;
    fn difference(&self, other: &Self) -> Result<Self, CsgError>;
    fn intersection(&self, other: &Self) -> Result<Self, CsgError>;
    fn xor(&self, other: &Self) -> Result<Self, CsgError>;
    fn transform(&self, matrix: &Matrix4<Real>) -> Self;
    fn bounding_box(&self) -> Aabb;
    fn inverse(&self) -> Result<Self, CsgError>;

    /// Returns a new Self translated by vector.
    fn translate_vector(&self, vector: Vector3<Real>) -> Self {
        self.transform(&Translation3::from(vector).to_homogeneous())
    }

    /// Returns a new Self translated by x, y, and z.
    fn translate(&self, x: Real, y: Real, z: Real) -> Self {
        self.translate_vector(Vector3::new(x, y, z))
    }

    /// Returns a new Self translated so that its bounding-box center is at the origin.
    fn center(&self) -> Self {
        let aabb = self.bounding_box();
        let center = aabb.center();
        self.translate(-center.x, -center.y, -center.z)
    }

    /// Rotates by x_deg, y_deg, z_deg, applied in that order.
    fn rotate(&self, x_deg: Real, y_deg: Real, z_deg: Real) -> Self {
        let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), x_deg.to_radians());
        let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), y_deg.to_radians());
        let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), z_deg.to_radians());
        let rot = rz * ry * rx;
        self.transform(&rot.to_homogeneous())
    }

    /// Scales by sx, sy, sz
    fn scale(&self, sx: Real, sy: Real, sz: Real) -> Self {
        let mat4 = Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz));
        self.transform(&mat4)
    }

    /// Reflect about `plane`. The normal need not be unit length; a zero
    /// normal leaves the object unchanged.
    fn mirror(&self, plane: Plane) -> Self {
        let len = plane.normal.norm();
        if len < EPSILON {
            return self.clone();
        }
        let n = plane.normal / len;
        // point of the plane closest to the origin
        let offset = n * (-plane.d / len);

        let t1 = Translation3::from(-offset).to_homogeneous();
        let mut reflect = Matrix4::identity();
        reflect
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(Matrix3::identity() - 2.0 * n * n.transpose()));
        let t2 = Translation3::from(offset).to_homogeneous();

        self.transform(&(t2 * reflect * t1))
    }
}

impl BooleanOps for Solid {
    fn union(&self, other: &Self) -> Result<Self, CsgError> {
        self.boolean(other, Operation::Union)
    }

    fn difference(&self, other: &Self) -> Result<Self, CsgError> {
        self.boolean(other, Operation::AMinusB)
    }

    fn intersection(&self, other: &Self) -> Result<Self, CsgError> {
        self.boolean(other, Operation::Intersection)
    }

    fn xor(&self, other: &Self) -> Result<Self, CsgError> {
        self.boolean(other, Operation::SymmetricDifference)
    }

    fn transform(&self, matrix: &Matrix4<Real>) -> Self {
        self.transformed(matrix)
    }

    /// Caller-space box around the triangle buffer. Invalid (inverted) when
    /// the solid holds no triangles and no bounds were recorded.
    fn bounding_box(&self) -> Aabb {
        let bounds = self.mesh_bounds();
        if bounds.mins.x > bounds.maxs.x {
            return *bounds;
        }
        let mut result = Aabb::new_invalid();
        for corner in bounds.vertices() {
            result.take_point(transform_point(self.internal_transform_inverse(), &corner));
        }
        result
    }

    fn inverse(&self) -> Result<Self, CsgError> {
        let mut result = self.clone();
        result.complement()?;
        Ok(result)
    }
}
