mod support;

use approx::assert_relative_eq;
use bspcsg::bsp::Version;
use bspcsg::float_types::Real;
use bspcsg::{BooleanOps, CsgError, Operation, Plane, Solid, SolidType, shapes};
use nalgebra::{Point3, Vector3};
use support::*;

#[test]
fn cutting_a_cube_in_two_gives_two_islands() {
    let cube = box_solid([0.0; 3], [2.0; 3]);
    let blade = box_solid([0.9, -1.0, -1.0], [0.2, 4.0, 4.0]);
    let cut = cube.difference(&blade).unwrap();
    let islands = cut.decompose_into_islands().unwrap();
    assert_eq!(islands.len(), 2);

    let mut volumes: Vec<Real> = islands
        .iter()
        .map(|island| island.surface_area_and_volume(true, None).unwrap().volume)
        .collect();
    volumes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_relative_eq!(volumes[0], 3.6, epsilon = 1e-8);
    assert_relative_eq!(volumes[1], 3.6, epsilon = 1e-8);

    let left = Point3::new(0.5, 1.0, 1.0);
    let right = Point3::new(1.5, 1.0, 1.0);
    let holders: Vec<(bool, bool)> = islands
        .iter()
        .map(|island| (island.point_inside(&left, None).unwrap(), island.point_inside(&right, None).unwrap()))
        .collect();
    assert!(holders.contains(&(true, false)));
    assert!(holders.contains(&(false, true)));
}

#[test]
fn one_piece_is_one_island() {
    let solid = box_solid([0.0; 3], [1.0; 3]).union(&box_solid([0.5; 3], [1.0; 3])).unwrap();
    let islands = solid.decompose_into_islands().unwrap();
    assert_eq!(islands.len(), 1);
    assert_relative_eq!(islands[0].surface_area_and_volume(true, None).unwrap().volume, 1.875, epsilon = 1e-8);
}

#[test]
fn islands_refuse_combined_solids() {
    let mut solid = box_solid([0.0; 3], [1.0; 3]);
    solid.combine(&box_solid([0.5; 3], [1.0; 3])).unwrap();
    assert!(matches!(solid.decompose_into_islands(), Err(CsgError::Combined { .. })));
}

#[test]
fn serialized_solid_reconstructs_the_same_mesh() {
    let solid = build(&shapes::sphere(1.0, 12, 6)).difference(&box_solid([0.0; 3], [2.0; 3])).unwrap();
    let mut bytes = Vec::new();
    solid.serialize(&mut bytes).unwrap();
    assert_eq!(u32::from_le_bytes(bytes[..4].try_into().unwrap()), Version::CURRENT as u32);

    let copy = Solid::deserialize(&mut bytes.as_slice()).unwrap();
    assert_eq!(copy.get_type(), SolidType::Nontrivial);
    assert_eq!(copy.internal_transform(), solid.internal_transform());

    let original = solid.to_mesh().unwrap();
    let restored = copy.to_mesh().unwrap();
    assert_eq!(original.len(), restored.len());
    assert_relative_eq!(mesh_area(&original), mesh_area(&restored), epsilon = 1e-9);
    for (a, b) in original.iter().zip(&restored) {
        assert_eq!(a.positions(), b.positions());
        assert_relative_eq!(a.vertices[0].data.normal, b.vertices[0].data.normal, epsilon = 1e-12);
    }
}

#[test]
fn combined_state_survives_serialization() {
    let mut solid = box_solid([0.0; 3], [1.0; 3]);
    solid.combine(&box_solid([0.5; 3], [1.0; 3])).unwrap();
    let mut bytes = Vec::new();
    solid.serialize(&mut bytes).unwrap();
    let copy = Solid::deserialize(&mut bytes.as_slice()).unwrap();
    assert!(copy.is_combined());
    let union = copy.op(Operation::Union).unwrap();
    assert_relative_eq!(union.surface_area_and_volume(true, None).unwrap().volume, 1.875, epsilon = 1e-8);
}

#[test]
fn newer_streams_are_rejected() {
    let mut bytes = Vec::new();
    build(&shapes::cube(1.0)).serialize(&mut bytes).unwrap();
    bytes[..4].copy_from_slice(&(Version::CURRENT as u32 + 1).to_le_bytes());
    match Solid::deserialize(&mut bytes.as_slice()) {
        Err(CsgError::UnsupportedVersion { found, current }) => {
            assert_eq!(found, current + 1);
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn clean_keeps_the_volume() {
    let (a, b) = (box_solid([0.0; 3], [1.0; 3]), box_solid([3.0, 0.0, 0.0], [1.0; 3]));
    let mut solid = a.intersection(&b).unwrap();
    assert_eq!(solid.get_type(), SolidType::EmptySet);
    solid.clean();
    assert!(solid.planes().is_empty());
    assert!(solid.triangles().is_empty());

    let mut union = a.union(&b).unwrap();
    let planes_before = union.planes().len();
    union.clean();
    assert!(union.planes().len() <= planes_before);
    assert_relative_eq!(union.surface_area_and_volume(true, None).unwrap().volume, 2.0, epsilon = 1e-8);
}

#[test]
fn convex_polyhedron_with_incidental_faces() {
    let mut planes = Vec::new();
    for axis in 0..3 {
        let mut n = Vector3::zeros();
        n[axis] = 1.0;
        planes.push(Plane::new(n, -1.0));
        planes.push(Plane::new(-n, -1.0));
    }
    // a big quad through the middle, clipped down to the cross-section
    let quad = shapes::cuboid(4.0, 4.0, 0.0);
    let faces: Vec<_> = quad
        .into_iter()
        .filter(|tri| tri.vertices[0].data.normal.z > 0.5)
        .map(|mut tri| {
            for v in &mut tri.vertices {
                v.position -= Vector3::new(2.0, 2.0, 0.0);
            }
            tri
        })
        .collect();
    let solid = Solid::from_convex_polyhedron(&planes, None, &faces);
    assert!(solid.is_incidental_mesh());
    let mesh = solid.to_mesh().unwrap();
    assert_relative_eq!(mesh_area(&mesh), 4.0, epsilon = 1e-9);
}

#[test]
fn diagnostics_are_clean_for_a_closed_mesh() {
    let solid = build(&shapes::cube(1.0));
    let report = solid.perform_diagnostics();
    assert!(report.is_clean(), "{report:?}");
}

#[test]
fn half_space_unit_cube() {
    let mut planes = Vec::new();
    for axis in 0..3 {
        let mut n = Vector3::zeros();
        n[axis] = 1.0;
        planes.push(Plane::new(n, -0.5));
        planes.push(Plane::new(-n, -0.5));
    }
    let cube = Solid::from_convex_polyhedron(&planes, None, &[]);
    assert_eq!(cube.get_type(), SolidType::Nontrivial);
    let measure = cube.surface_area_and_volume(true, None).unwrap();
    assert_relative_eq!(measure.area, 6.0, max_relative = 1e-4);
    assert_relative_eq!(measure.volume, 1.0, max_relative = 1e-4);
    assert!(cube.point_inside(&Point3::origin(), None).unwrap());
    assert!(!cube.point_inside(&Point3::new(2.0, 2.0, 2.0), None).unwrap());
}

#[test]
fn islands_union_back_to_the_whole() {
    let cube = box_solid([0.0; 3], [2.0; 3]);
    let blade = box_solid([0.9, -1.0, -1.0], [0.2, 4.0, 4.0]);
    let cut = cube.difference(&blade).unwrap();
    let islands = cut.decompose_into_islands().unwrap();
    assert_eq!(islands.len(), 2);
    let merged = islands[0].union(&islands[1]).unwrap();
    assert_relative_eq!(merged.surface_area_and_volume(true, None).unwrap().volume, 7.2, epsilon = 1e-8);
}
