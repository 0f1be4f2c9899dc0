//! Test support library
//! Provides various helper functions & utilities for tests.

#![allow(dead_code)]

use bspcsg::float_types::Real;
use bspcsg::{BooleanOps, BuildContext, BuildParameters, RenderTriangle, Solid, shapes};
use nalgebra::{Matrix4, Point3};

/// Build parameters shared by every solid a test combines: the tree is built
/// in caller space so operands agree on their internal frame.
pub fn params() -> BuildParameters {
    BuildParameters::default().with_internal_transform(Matrix4::identity())
}

/// Build a solid from `mesh` in caller space.
pub fn build(mesh: &[RenderTriangle]) -> Solid {
    Solid::from_mesh(mesh, &params(), BuildContext::default()).expect("mesh builds")
}

/// Axis-aligned box solid spanning `min..min + size`.
pub fn box_solid(min: [Real; 3], size: [Real; 3]) -> Solid {
    build(&shapes::cuboid(size[0], size[1], size[2])).translate(min[0], min[1], min[2])
}

/// Membership of `p` in the box `min..min + size`, and its distance to the
/// nearest face plane.
pub fn box_membership(min: [Real; 3], size: [Real; 3], p: &Point3<Real>) -> (bool, Real) {
    let mut inside = true;
    let mut nearest = Real::MAX;
    for axis in 0..3 {
        let lo = min[axis];
        let hi = min[axis] + size[axis];
        inside &= p[axis] > lo && p[axis] < hi;
        nearest = nearest.min((p[axis] - lo).abs()).min((p[axis] - hi).abs());
    }
    (inside, nearest)
}

/// Total area of a triangle list.
pub fn mesh_area(mesh: &[RenderTriangle]) -> Real {
    mesh.iter().map(RenderTriangle::area).sum()
}

/// Volume enclosed by a closed, outward-wound triangle list.
pub fn mesh_volume(mesh: &[RenderTriangle]) -> Real {
    mesh.iter()
        .map(|tri| {
            let [a, b, c] = tri.positions();
            a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
        })
        .sum()
}

/// Quick helper to compare floating-point results with an acceptable tolerance.
pub fn approx_eq(a: Real, b: Real, eps: Real) -> bool {
    (a - b).abs() < eps
}
