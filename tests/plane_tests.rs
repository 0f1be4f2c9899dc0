use approx::assert_relative_eq;
use bspcsg::clip::{VertexPool, clip_triangle_to_halfspaces};
use bspcsg::float_types::{EPSILON, Real};
use bspcsg::plane::{BACK, COPLANAR, FRONT, Plane, plane_matrix, transform_point};
use nalgebra::{Matrix4, Point3, Rotation3, Vector3};

#[test]
fn negation() {
    let plane = -Plane::new(Vector3::y(), 2.0);
    assert_eq!(plane.normal, Vector3::new(0.0, -1.0, 0.0));
    assert_eq!(plane.d, -2.0);
}

#[test]
fn classify_points() {
    let plane = Plane::new(Vector3::z(), -1.0);
    assert_eq!(plane.classify(&Point3::new(0.0, 0.0, 2.0), EPSILON), FRONT);
    assert_eq!(plane.classify(&Point3::new(0.0, 0.0, 0.0), EPSILON), BACK);
    assert_eq!(plane.classify(&Point3::new(3.0, -2.0, 1.0), EPSILON), COPLANAR);
}

#[test]
fn normalize_reports_the_old_length() {
    let mut plane = Plane::new(Vector3::new(0.0, 3.0, 4.0), 10.0);
    let length = plane.normalize();
    assert_relative_eq!(length, 5.0);
    assert_relative_eq!(plane.normal.norm(), 1.0);
    assert_relative_eq!(plane.d, 2.0);
}

#[test]
fn rotated_plane_follows_its_points() {
    let plane = Plane::from_normal_and_point(Vector3::x(), &Point3::new(1.0, 0.0, 0.0));
    let tm = Matrix4::new_translation(&Vector3::new(0.0, 2.0, 0.0))
        * Rotation3::from_axis_angle(&Vector3::z_axis(), 0.7).to_homogeneous();
    let moved = plane.transformed(&plane_matrix(&tm));
    for p in [Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 5.0, -3.0)] {
        assert_relative_eq!(moved.distance(&transform_point(&tm, &p)), 0.0, epsilon = 1e-12);
    }
    let outside = transform_point(&tm, &Point3::new(2.0, 0.0, 0.0));
    assert!(moved.distance(&outside) > 0.0);
}

#[test]
fn split_triangle_across_a_plane() {
    // the square (-1,-1)..(1,1) split at y = 0, one triangle at a time
    let below = Plane::new(Vector3::y(), 0.0);
    let above = -below;
    let triangles = [
        [Point3::new(-1.0, -1.0, 0.0), Point3::new(1.0, -1.0, 0.0), Point3::new(1.0, 1.0, 0.0)],
        [Point3::new(-1.0, -1.0, 0.0), Point3::new(1.0, 1.0, 0.0), Point3::new(-1.0, 1.0, 0.0)],
    ];
    let mut pool = VertexPool::new();
    let origin = Point3::origin();
    let mut areas: [Real; 2] = [0.0; 2];
    for (side, plane) in [below, above].into_iter().enumerate() {
        for triangle in &triangles {
            let mut pieces = Vec::new();
            let measure =
                clip_triangle_to_halfspaces(&mut pool, triangle, 1, &[(0, plane)], None, EPSILON, &origin, Some(&mut pieces));
            areas[side] += measure.area;
            for piece in &pieces {
                for p in piece {
                    assert!(plane.distance(p) <= EPSILON);
                }
            }
        }
    }
    assert_relative_eq!(areas[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(areas[1], 2.0, epsilon = 1e-12);
    assert_eq!(pool.clear(), 0);
}
