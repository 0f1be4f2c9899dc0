//! Emptiness test for an intersection of half-spaces.
//!
//! The tester keeps a small active set of half-spaces and the point of minimum
//! norm inside their intersection. Each round asks the supplier for the
//! half-space violated most at that point; if none is violated the intersection
//! is non-empty, otherwise the violator joins the active set, the set is reduced
//! to the constraints supporting the new minimum-norm point, and the round
//! repeats. The minimum norm grows strictly, so few rounds are needed in practice.
//!
//! Half-spaces are planes read as `plane.distance(x) <= 0`.

use crate::float_types::{FEASIBILITY_EPSILON, Real};
use crate::plane::Plane;
use nalgebra::{Matrix3, Point3, Vector3};

/// Rounds before the tester gives up and reports [`Feasibility::Error`].
pub const MAX_ITERATIONS: usize = 64;

/// Largest active set kept between rounds.
const MAX_ACTIVE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    Feasible,
    Infeasible,
    /// The iteration bound was exceeded. Callers treat this as feasible.
    Error,
}

impl Feasibility {
    /// Conservative reading: only a proven empty intersection counts as empty.
    pub const fn is_empty(self) -> bool {
        matches!(self, Feasibility::Infeasible)
    }
}

/// An implicit set of half-spaces.
pub trait HalfspaceSupplier {
    /// The half-space whose plane value at `point` is largest, and that value.
    /// Positive values mean `point` lies outside that half-space.
    fn farthest_halfspace(&self, point: &Point3<Real>) -> (Plane, Real);
}

/// Explicit list of half-spaces. An empty list is all of space.
#[derive(Debug, Clone, Copy)]
pub struct PlaneSet<'a> {
    pub planes: &'a [Plane],
}

impl<'a> PlaneSet<'a> {
    pub const fn new(planes: &'a [Plane]) -> Self {
        Self { planes }
    }
}

impl HalfspaceSupplier for PlaneSet<'_> {
    fn farthest_halfspace(&self, point: &Point3<Real>) -> (Plane, Real) {
        let mut best = (Plane::new(Vector3::zeros(), -1.0), -1.0);
        for plane in self.planes {
            let distance = plane.distance(point);
            if distance > best.1 {
                best = (*plane, distance);
            }
        }
        best
    }
}

#[inline]
fn tolerance_at(point: &Vector3<Real>) -> Real {
    FEASIBILITY_EPSILON * point.norm_squared().max(1.0)
}

/// Decide whether the intersection of `initial` (at most four are used) and every
/// half-space of `supplier` is non-empty.
pub fn test_feasibility(initial: &[Plane], supplier: &dyn HalfspaceSupplier) -> Feasibility {
    let mut active: Vec<Plane> = initial.iter().take(MAX_ACTIVE).copied().collect();
    let Some((mut x, support)) = min_norm_point(&active) else {
        return Feasibility::Infeasible;
    };
    active = support;

    for _ in 0..MAX_ITERATIONS {
        let (halfspace, violation) = supplier.farthest_halfspace(&Point3::from(x));
        if violation <= tolerance_at(&x) {
            return Feasibility::Feasible;
        }
        active.push(halfspace);
        match min_norm_point(&active) {
            Some((next, support)) => {
                x = next;
                active = support;
            },
            None => return Feasibility::Infeasible,
        }
    }
    Feasibility::Error
}

/// Point of minimum norm in the intersection of `halfspaces`, with the subset of
/// half-spaces supporting it. `None` when the intersection is empty.
fn min_norm_point(halfspaces: &[Plane]) -> Option<(Vector3<Real>, Vec<Plane>)> {
    let count = halfspaces.len();
    let mut best: Option<(Vector3<Real>, Vec<Plane>)> = None;

    // every subset of at most three constraints, the empty subset first
    for mask in 0u32..(1 << count) {
        if mask.count_ones() > 3 {
            continue;
        }
        let subset: Vec<Plane> = (0..count).filter(|i| mask & (1 << i) != 0).map(|i| halfspaces[i]).collect();
        let Some(x) = solve_active_set(&subset) else {
            continue;
        };
        let tolerance = tolerance_at(&x);
        if halfspaces.iter().any(|h| h.normal.dot(&x) + h.d > tolerance) {
            continue;
        }
        if best.as_ref().is_none_or(|(b, _)| x.norm_squared() < b.norm_squared()) {
            best = Some((x, subset));
        }
    }
    best
}

/// Minimum-norm point on the intersection of the subset's planes, provided every
/// Lagrange multiplier is non-negative (the point is a KKT point of the subset).
fn solve_active_set(subset: &[Plane]) -> Option<Vector3<Real>> {
    match subset.len() {
        0 => Some(Vector3::zeros()),
        1 => {
            let h = &subset[0];
            let n2 = h.normal.norm_squared();
            if n2 <= FEASIBILITY_EPSILON * FEASIBILITY_EPSILON {
                return None;
            }
            let lambda = h.d / n2;
            (lambda >= -FEASIBILITY_EPSILON).then(|| -h.normal * lambda)
        },
        2 => {
            let (n0, n1) = (subset[0].normal, subset[1].normal);
            let g00 = n0.dot(&n0);
            let g01 = n0.dot(&n1);
            let g11 = n1.dot(&n1);
            let det = g00 * g11 - g01 * g01;
            if det <= FEASIBILITY_EPSILON * g00 * g11 || det <= 0.0 {
                return None;
            }
            let (d0, d1) = (subset[0].d, subset[1].d);
            let l0 = (g11 * d0 - g01 * d1) / det;
            let l1 = (g00 * d1 - g01 * d0) / det;
            (l0 >= -FEASIBILITY_EPSILON && l1 >= -FEASIBILITY_EPSILON).then(|| -(n0 * l0 + n1 * l1))
        },
        3 => {
            let normals = Matrix3::from_rows(&[
                subset[0].normal.transpose(),
                subset[1].normal.transpose(),
                subset[2].normal.transpose(),
            ]);
            let scale = subset.iter().map(|h| h.normal.norm_squared()).product::<Real>();
            let gram = normals * normals.transpose();
            if gram.determinant() <= FEASIBILITY_EPSILON * scale {
                return None;
            }
            let lambda = gram.try_inverse()? * Vector3::new(subset[0].d, subset[1].d, subset[2].d);
            (lambda.min() >= -FEASIBILITY_EPSILON).then(|| -(normals.transpose() * lambda))
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_planes(half: Real) -> Vec<Plane> {
        let mut planes = Vec::new();
        for axis in 0..3 {
            let mut n = Vector3::zeros();
            n[axis] = 1.0;
            planes.push(Plane::new(n, -half));
            planes.push(Plane::new(-n, -half));
        }
        planes
    }

    #[test]
    fn empty_set_of_planes_is_feasible() {
        assert_eq!(test_feasibility(&[], &PlaneSet::new(&[])), Feasibility::Feasible);
    }

    #[test]
    fn offset_cube_is_feasible() {
        let planes: Vec<Plane> = cube_planes(1.0)
            .into_iter()
            .map(|p| Plane::new(p.normal, p.d - p.normal.dot(&Vector3::new(5.0, -3.0, 2.0))))
            .collect();
        assert_eq!(test_feasibility(&[], &PlaneSet::new(&planes)), Feasibility::Feasible);
    }

    #[test]
    fn opposing_slabs_are_infeasible() {
        let planes = [Plane::new(Vector3::x(), 1.0), Plane::new(-Vector3::x(), 1.0)];
        assert_eq!(test_feasibility(&[], &PlaneSet::new(&planes)), Feasibility::Infeasible);
        assert_eq!(test_feasibility(&planes, &PlaneSet::new(&[])), Feasibility::Infeasible);
    }

    #[test]
    fn cube_minus_corner_region() {
        // x + y + z >= 3.5 misses the cube [-1, 1]^3
        let mut planes = cube_planes(1.0);
        planes.push(Plane::new(-Vector3::new(1.0, 1.0, 1.0).normalize(), 3.5 / (3.0 as Real).sqrt()));
        assert_eq!(test_feasibility(&[], &PlaneSet::new(&planes)), Feasibility::Infeasible);

        // x + y + z >= 2.5 clips the corner
        let last = planes.len() - 1;
        planes[last] = Plane::new(-Vector3::new(1.0, 1.0, 1.0).normalize(), 2.5 / (3.0 as Real).sqrt());
        assert_eq!(test_feasibility(&[], &PlaneSet::new(&planes)), Feasibility::Feasible);
    }

    #[test]
    fn touching_faces_are_feasible() {
        let planes = [Plane::new(Vector3::x(), 0.0), Plane::new(-Vector3::x(), 0.0)];
        assert_eq!(test_feasibility(&[], &PlaneSet::new(&planes)), Feasibility::Feasible);
    }
}
