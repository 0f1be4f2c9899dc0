//! Containment, surface area and volume queries.
//!
//! Area and volume come from the tree alone: every selected leaf is a convex
//! cell bounded by its ancestor planes, so each face polygon is rebuilt by
//! clipping the lines where two bounding planes meet against the remaining
//! half-spaces. No triangles are needed.

use crate::bsp::solid::Solid;
use crate::errors::CsgError;
use crate::float_types::{EPSILON, Real};
use crate::operation::Operation;
use crate::plane::{Plane, cofactor3, determinant3, linear_part, transform_point};
use nalgebra::{Matrix3, Point3, Vector3};
use tracing::warn;

/// Surface area and enclosed volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaAndVolume {
    pub area: Real,
    pub volume: Real,
}

impl AreaAndVolume {
    pub const ZERO: Self = Self { area: 0.0, volume: 0.0 };

    /// Returned when a selected region is unbounded.
    pub const UNBOUNDED: Self = Self {
        area: Real::MAX,
        volume: Real::MAX,
    };

    pub fn is_bounded(&self) -> bool {
        self.area < Real::MAX && self.volume < Real::MAX
    }
}

impl Solid {
    /// Side of a leaf as seen by a query. Combined sides go through
    /// `operation`; plain sides ignore it.
    fn query_side(&self, side: u32, operation: Option<Operation>) -> u32 {
        match (self.combined, operation) {
            (true, Some(operation)) => operation.apply(side),
            _ => side,
        }
    }

    fn check_query_operation(&self, query: &'static str, operation: Option<Operation>) -> Result<(), CsgError> {
        match (self.combined, operation) {
            (true, None) => {
                warn!("{query}: an operation must be given for a combined solid");
                Err(CsgError::MissingOperation { operation: query })
            },
            (false, Some(_)) => {
                warn!("{query}: operation ignored for an uncombined solid");
                Ok(())
            },
            _ => Ok(()),
        }
    }

    /// Whether `point` (caller space) is inside. A combined solid needs an
    /// operation to interpret its leaves.
    pub fn point_inside(&self, point: &Point3<Real>, operation: Option<Operation>) -> Result<bool, CsgError> {
        self.check_query_operation("point_inside", operation)?;
        let local = transform_point(&self.internal_transform, point);
        let leaf = self.locate(&local);
        let side = self.cache.nodes[leaf].side().unwrap_or(0);
        Ok(self.query_side(side, operation) != 0)
    }

    /// Total boundary area and volume of the inside cells (or the outside
    /// cells when `inside` is false), in caller space. Any unbounded cell makes
    /// the result [`AreaAndVolume::UNBOUNDED`].
    pub fn surface_area_and_volume(&self, inside: bool, operation: Option<Operation>) -> Result<AreaAndVolume, CsgError> {
        self.check_query_operation("surface_area_and_volume", operation)?;

        let to_caller = linear_part(&self.internal_transform_inverse);
        let area_tm = cofactor3(&to_caller);
        let volume_scale = determinant3(&self.internal_transform_inverse).abs();

        let mut total = AreaAndVolume::ZERO;
        for leaf in self.leaves() {
            let side = self.cache.nodes[leaf].side().unwrap_or(0);
            if (self.query_side(side, operation) != 0) != inside {
                continue;
            }
            let planes: Vec<Plane> = self.leaf_halfspaces(leaf).into_iter().map(|(_, plane)| plane).collect();
            match cell_area_and_volume(&essential_planes(&planes), &area_tm) {
                Some(cell) => {
                    total.area += cell.area;
                    total.volume += cell.volume * volume_scale;
                },
                None => return Ok(AreaAndVolume::UNBOUNDED),
            }
        }
        Ok(total)
    }
}

/// Drop planes that repeat an earlier one within tolerance.
fn essential_planes(planes: &[Plane]) -> Vec<Plane> {
    let mut kept: Vec<Plane> = Vec::with_capacity(planes.len());
    for plane in planes {
        let duplicate = kept
            .iter()
            .any(|k| (1.0 - k.normal.dot(&plane.normal)).abs() <= EPSILON && (k.d - plane.d).abs() <= EPSILON);
        if !duplicate {
            kept.push(*plane);
        }
    }
    kept
}

/// Line where two planes meet, as a point and a unit direction `n0 × n1`.
/// `None` for (nearly) parallel planes.
fn intersect_planes(plane0: &Plane, plane1: &Plane) -> Option<(Point3<Real>, Vector3<Real>)> {
    let (n0, n1) = (plane0.normal, plane1.normal);
    let dir = n0.cross(&n1);
    let dir2 = dir.norm_squared();
    if dir2 < EPSILON * EPSILON {
        return None;
    }
    let recip_dir2 = 1.0 / dir2;
    let n0n0 = n0.norm_squared() * recip_dir2;
    let n1n1 = n1.norm_squared() * recip_dir2;
    let n0n1 = n0.dot(&n1) * recip_dir2;
    let solve = |e0: Real, e1: Real| (e1 * n0n1 - e0 * n1n1) * n0 + (e0 * n0n1 - e1 * n0n0) * n1;

    let mut pos = Point3::from(solve(plane0.d, plane1.d));
    // one refinement step
    let correction = solve(plane0.distance(&pos), plane1.distance(&pos));
    pos += correction;
    Some((pos, dir * recip_dir2.sqrt()))
}

/// Narrow the parameter interval `[min_s, max_s]` of the line `pos + s·dir` to
/// the half-space of `plane`. Returns whether anything is left.
fn clip_line_to_halfspace(
    min_s: &mut Real,
    max_s: &mut Real,
    pos: &Point3<Real>,
    dir: &Vector3<Real>,
    plane: &Plane,
) -> bool {
    let num = -plane.distance(pos);
    let den = dir.dot(&plane.normal);
    if den < -EPSILON {
        *min_s = min_s.max(num / den);
    } else if den > EPSILON {
        *max_s = max_s.min(num / den);
    } else if num < -EPSILON {
        *min_s = EPSILON;
        *max_s = -EPSILON;
    }
    *min_s < *max_s
}

/// Area and volume of the convex cell `planes` bound, or `None` if it is
/// unbounded. Face areas are mapped through `area_tm` (the cofactor of the
/// linear map to caller space); the volume is returned in the cell's own frame.
fn cell_area_and_volume(planes: &[Plane], area_tm: &Matrix3<Real>) -> Option<AreaAndVolume> {
    if planes.len() <= 1 {
        return None;
    }

    let mut area: Real = 0.0;
    let mut volume: Real = 0.0;
    let mut origin: Option<Point3<Real>> = None;

    for (i, face) in planes.iter().enumerate() {
        let mut fan: Option<(Point3<Real>, Real)> = None;
        let mut face_area2: Real = 0.0;
        for (j, edge) in planes.iter().enumerate() {
            if j == i {
                continue;
            }
            let Some((pos, dir)) = intersect_planes(face, edge) else {
                continue;
            };
            let mut min_s = Real::MIN;
            let mut max_s = Real::MAX;
            for (k, bound) in planes.iter().enumerate() {
                if k != i && k != j && !clip_line_to_halfspace(&mut min_s, &mut max_s, &pos, &dir, bound) {
                    break;
                }
            }
            if min_s >= max_s {
                continue;
            }
            if min_s == Real::MIN || max_s == Real::MAX {
                return None;
            }

            let p1 = pos + dir * min_s;
            let apex = *origin.get_or_insert(p1);
            match fan {
                None => fan = Some((p1, face.normal.dot(&(p1 - apex)))),
                Some((p0, _)) => {
                    let p2 = pos + dir * max_s;
                    face_area2 += (p1 - p0).cross(&(p2 - p0)).dot(&face.normal);
                },
            }
        }
        if let Some((_, height)) = fan {
            area += face_area2 * (area_tm * face.normal).norm();
            volume += face_area2 * height;
        }
    }

    Some(AreaAndVolume {
        area: 0.5 * area,
        volume: volume / 6.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn box_planes(half: Vector3<Real>) -> Vec<Plane> {
        let mut planes = Vec::new();
        for axis in 0..3 {
            let mut n = Vector3::zeros();
            n[axis] = 1.0;
            planes.push(Plane::new(n, -half[axis]));
            planes.push(Plane::new(-n, -half[axis]));
        }
        planes
    }

    #[test]
    fn box_cell() {
        let planes = box_planes(Vector3::new(0.5, 1.0, 1.5));
        let cell = cell_area_and_volume(&planes, &Matrix3::identity()).unwrap();
        assert_relative_eq!(cell.volume, 6.0, epsilon = 1e-9);
        assert_relative_eq!(cell.area, 2.0 * (2.0 + 3.0 + 6.0), epsilon = 1e-9);
    }

    #[test]
    fn open_cell_is_unbounded() {
        let mut planes = box_planes(Vector3::new(1.0, 1.0, 1.0));
        planes.pop();
        assert!(cell_area_and_volume(&planes, &Matrix3::identity()).is_none());
        assert!(cell_area_and_volume(&planes[..1], &Matrix3::identity()).is_none());
    }

    #[test]
    fn duplicate_planes_are_dropped() {
        let mut planes = box_planes(Vector3::new(1.0, 1.0, 1.0));
        planes.push(planes[0]);
        let planes = essential_planes(&planes);
        assert_eq!(planes.len(), 6);
        let cell = cell_area_and_volume(&planes, &Matrix3::identity()).unwrap();
        assert_relative_eq!(cell.volume, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn tetrahedron_cell() {
        let planes = [
            Plane::new(-Vector3::x(), 0.0),
            Plane::new(-Vector3::y(), 0.0),
            Plane::new(-Vector3::z(), 0.0),
            Plane::new(Vector3::new(1.0, 1.0, 1.0).normalize(), -1.0 / (3.0 as Real).sqrt()),
        ];
        let cell = cell_area_and_volume(&planes, &Matrix3::identity()).unwrap();
        assert_relative_eq!(cell.volume, 1.0 / 6.0, epsilon = 1e-9);
        assert_relative_eq!(cell.area, 1.5 + (3.0 as Real).sqrt() / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn convex_solid_measures_in_caller_space() {
        let solid = Solid::from_convex_polyhedron(&box_planes(Vector3::new(1.0, 1.0, 1.0)), None, &[]);
        let inside = solid.surface_area_and_volume(true, None).unwrap();
        assert_relative_eq!(inside.volume, 8.0, epsilon = 1e-9);
        assert_relative_eq!(inside.area, 24.0, epsilon = 1e-9);
        assert!(!solid.surface_area_and_volume(false, None).unwrap().is_bounded());
        assert!(solid.point_inside(&Point3::new(0.5, -0.5, 0.9), None).unwrap());
        assert!(!solid.point_inside(&Point3::new(1.5, 0.0, 0.0), None).unwrap());
    }
}
