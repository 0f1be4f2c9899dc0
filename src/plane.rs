//! Oriented planes and the affine-transform algebra used to move planes,
//! points and interpolation frames between coordinate frames.

use crate::float_types::{EPSILON, IDENTITY_TOLERANCE, Real};
use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};
use std::ops::{Mul, Neg};

/// Classification of a point or polygon against a plane.
pub const COPLANAR: i8 = 0;
pub const FRONT: i8 = 1;
pub const BACK: i8 = -1;

/// A plane `n·x + d = 0`. The half-space "below" the plane is `n·x + d <= 0`.
///
/// Planes owned by a solid are kept with a unit normal. Interpolation frames
/// reuse this type with arbitrary normals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<Real>,
    pub d: Real,
}

impl Default for Plane {
    fn default() -> Self {
        Self::zero()
    }
}

impl Plane {
    pub const fn new(normal: Vector3<Real>, d: Real) -> Self {
        Self { normal, d }
    }

    /// All-zero plane; used for an empty interpolation frame.
    pub fn zero() -> Self {
        Self {
            normal: Vector3::zeros(),
            d: 0.0,
        }
    }

    /// Plane through `point` with the given normal.
    pub fn from_normal_and_point(normal: Vector3<Real>, point: &Point3<Real>) -> Self {
        Self {
            normal,
            d: -normal.dot(&point.coords),
        }
    }

    pub fn from_vector4(v: &Vector4<Real>) -> Self {
        Self {
            normal: Vector3::new(v.x, v.y, v.z),
            d: v.w,
        }
    }

    pub fn to_vector4(&self) -> Vector4<Real> {
        Vector4::new(self.normal.x, self.normal.y, self.normal.z, self.d)
    }

    /// Signed distance of `point` (scaled by `|normal|` when it is not unit length).
    #[inline]
    pub fn distance(&self, point: &Point3<Real>) -> Real {
        self.normal.dot(&point.coords) + self.d
    }

    /// Projection of the origin onto the plane.
    pub fn project_origin(&self) -> Point3<Real> {
        let n2 = self.normal.norm_squared();
        if n2 == 0.0 {
            return Point3::origin();
        }
        Point3::from(self.normal * (-self.d / n2))
    }

    /// Scale so the normal has unit length. Returns the original normal length.
    pub fn normalize(&mut self) -> Real {
        let length = self.normal.norm();
        if length > 0.0 {
            let recip = 1.0 / length;
            self.normal *= recip;
            self.d *= recip;
        }
        length
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Classify `point` as [`FRONT`], [`BACK`] or [`COPLANAR`] within `tolerance`.
    #[inline]
    pub fn classify(&self, point: &Point3<Real>, tolerance: Real) -> i8 {
        let distance = self.distance(point);
        if distance < -tolerance {
            BACK
        } else if distance > tolerance {
            FRONT
        } else {
            COPLANAR
        }
    }

    /// Apply a plane-transformation matrix (see [`plane_matrix`]).
    pub fn transformed(&self, plane_matrix: &Matrix4<Real>) -> Self {
        Self::from_vector4(&(plane_matrix * self.to_vector4()))
    }

    /// Equality within `tolerance` on every coefficient.
    pub fn approx_eq(&self, other: &Plane, tolerance: Real) -> bool {
        (self.normal - other.normal).abs().max() <= tolerance && (self.d - other.d).abs() <= tolerance
    }
}

impl Neg for Plane {
    type Output = Plane;

    fn neg(self) -> Plane {
        Plane::new(-self.normal, -self.d)
    }
}

impl Mul<Real> for Plane {
    type Output = Plane;

    fn mul(self, scale: Real) -> Plane {
        Plane::new(self.normal * scale, self.d * scale)
    }
}

/// Upper-left 3×3 block of an affine matrix.
pub fn linear_part(tm: &Matrix4<Real>) -> Matrix3<Real> {
    tm.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Translation column of an affine matrix.
pub fn translation_part(tm: &Matrix4<Real>) -> Vector3<Real> {
    Vector3::new(tm[(0, 3)], tm[(1, 3)], tm[(2, 3)])
}

/// Cofactor matrix of the 3×3 linear block: `det(A)·A⁻ᵀ`, defined for singular `A` as well.
pub fn cofactor3(a: &Matrix3<Real>) -> Matrix3<Real> {
    let a0 = a.column(0).into_owned();
    let a1 = a.column(1).into_owned();
    let a2 = a.column(2).into_owned();
    Matrix3::from_columns(&[a1.cross(&a2), a2.cross(&a0), a0.cross(&a1)])
}

/// Cofactor matrix of an affine 4×4 transform. Acting on `(n, d)` it maps a plane
/// through the transform, scaled by `det(A)`; the `[3][3]` entry is `det(A)`.
pub fn cofactor34(tm: &Matrix4<Real>) -> Matrix4<Real> {
    let a = linear_part(tm);
    let t = translation_part(tm);
    let cof = cofactor3(&a);
    let bottom = -(cof.transpose() * t);
    let mut result = Matrix4::zeros();
    result.fixed_view_mut::<3, 3>(0, 0).copy_from(&cof);
    result[(3, 0)] = bottom.x;
    result[(3, 1)] = bottom.y;
    result[(3, 2)] = bottom.z;
    result[(3, 3)] = a.determinant();
    result
}

/// Plane-transformation matrix that preserves the below/above sides of a plane
/// under `tm`, including mirroring transforms.
pub fn plane_matrix(tm: &Matrix4<Real>) -> Matrix4<Real> {
    let cof = cofactor34(tm);
    if cof[(3, 3)] < 0.0 { -cof } else { cof }
}

/// Inverse transpose of an affine transform; maps affine functions of position
/// (interpolation frames) through the transform. `None` for singular transforms.
pub fn inverse_transpose34(tm: &Matrix4<Real>) -> Option<Matrix4<Real>> {
    let cof = cofactor34(tm);
    let det = cof[(3, 3)];
    if det.abs() <= EPSILON * EPSILON {
        return None;
    }
    Some(cof / det)
}

/// Inverse of an affine transform. Singular transforms return the zero matrix.
pub fn inverse34(tm: &Matrix4<Real>) -> Matrix4<Real> {
    tm.try_inverse().unwrap_or_else(Matrix4::zeros)
}

pub fn determinant3(tm: &Matrix4<Real>) -> Real {
    linear_part(tm).determinant()
}

#[inline]
pub fn transform_point(tm: &Matrix4<Real>, point: &Point3<Real>) -> Point3<Real> {
    let v = tm * point.to_homogeneous();
    Point3::new(v.x, v.y, v.z)
}

#[inline]
pub fn transform_vector(tm: &Matrix4<Real>, vector: &Vector3<Real>) -> Vector3<Real> {
    linear_part(tm) * vector
}

pub fn is_zero_matrix(tm: &Matrix4<Real>) -> bool {
    tm.iter().all(|x| *x == 0.0)
}

pub fn transforms_equal(a: &Matrix4<Real>, b: &Matrix4<Real>, tolerance: Real) -> bool {
    (a - b).abs().max() <= tolerance
}

pub fn is_identity(tm: &Matrix4<Real>) -> bool {
    transforms_equal(tm, &Matrix4::identity(), IDENTITY_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Translation3};

    #[test]
    fn plane_transform_matches_point_transform() {
        let tm = Translation3::new(1.0, -2.0, 0.5).to_homogeneous()
            * Rotation3::from_euler_angles(0.3, -0.2, 1.1).to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 0.5, 3.0));
        let plane = Plane::from_normal_and_point(Vector3::new(1.0, 2.0, -1.0).normalize(), &Point3::new(0.2, 0.1, -0.4));
        let moved = plane.transformed(&plane_matrix(&tm)).normalized();

        let inside = Point3::new(-1.0, -1.0, 1.0);
        assert!(plane.distance(&inside) < 0.0);
        assert!(moved.distance(&transform_point(&tm, &inside)) < 0.0);

        let on = plane.project_origin();
        assert_relative_eq!(moved.distance(&transform_point(&tm, &on)), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn mirror_keeps_plane_sides() {
        let mirror = Matrix4::new_nonuniform_scaling(&Vector3::new(-1.0, 1.0, 1.0));
        let plane = Plane::new(Vector3::x(), -1.0);
        let moved = plane.transformed(&plane_matrix(&mirror));
        // x <= 1 maps to -x <= 1
        assert!(moved.distance(&Point3::new(0.0, 0.0, 0.0)) < 0.0);
        assert!(moved.distance(&Point3::new(-2.0, 0.0, 0.0)) > 0.0);
    }

    #[test]
    fn cofactor_of_identity_is_identity() {
        assert!(is_identity(&cofactor34(&Matrix4::identity())));
    }
}
