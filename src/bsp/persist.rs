//! Versioned binary persistence.
//!
//! Streams are little-endian. Scalars are written as `f64` whatever the
//! `Real` width, surface areas as `f32` and flags as one byte. Each format
//! revision appends or reshapes fields; decoding walks the [`Version`] ladder so
//! streams written by any earlier revision still load.

use crate::bsp::node::{Node, NodeId, NodeKind, Region, Surface};
use crate::bsp::solid::Solid;
use crate::errors::CsgError;
use crate::float_types::Real;
use crate::float_types::parry3d::bounding_volume::Aabb;
use crate::interpolator::Interpolator;
use crate::plane::{Plane, inverse34};
use crate::triangle::Triangle;
use crate::vertex::VertexData;
use nalgebra::{Matrix4, Point3, Vector2, Vector3, Vector4};
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, instrument, warn};

/// Format revisions, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Version {
    Initial = 0,
    RevisedMeshTolerances = 1,
    UsingOnlyPositionDataInVertex = 2,
    SerializingTriangleFrames = 3,
    IncidentalMeshDistinction = 4,
    SerializingMeshBounds = 5,
    AddedInternalTransform = 6,
}

impl Version {
    pub const CURRENT: Version = Version::AddedInternalTransform;

    pub const fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Version::Initial,
            1 => Version::RevisedMeshTolerances,
            2 => Version::UsingOnlyPositionDataInVertex,
            3 => Version::SerializingTriangleFrames,
            4 => Version::IncidentalMeshDistinction,
            5 => Version::SerializingMeshBounds,
            6 => Version::AddedInternalTransform,
            _ => return None,
        })
    }
}

const NODE_LEAF: u32 = 0;
const NODE_BRANCH: u32 = 1;

struct Encoder<'a, W: Write> {
    out: &'a mut W,
}

impl<W: Write> Encoder<'_, W> {
    fn u32(&mut self, value: u32) -> Result<(), CsgError> {
        Ok(self.out.write_all(&value.to_le_bytes())?)
    }

    fn i32(&mut self, value: i32) -> Result<(), CsgError> {
        Ok(self.out.write_all(&value.to_le_bytes())?)
    }

    fn f32(&mut self, value: f32) -> Result<(), CsgError> {
        Ok(self.out.write_all(&value.to_le_bytes())?)
    }

    fn real(&mut self, value: Real) -> Result<(), CsgError> {
        Ok(self.out.write_all(&(value as f64).to_le_bytes())?)
    }

    fn bool(&mut self, value: bool) -> Result<(), CsgError> {
        Ok(self.out.write_all(&[value as u8])?)
    }

    fn vector3(&mut self, v: &Vector3<Real>) -> Result<(), CsgError> {
        v.iter().try_for_each(|&x| self.real(x))
    }

    fn point3(&mut self, p: &Point3<Real>) -> Result<(), CsgError> {
        self.vector3(&p.coords)
    }

    fn plane(&mut self, plane: &Plane) -> Result<(), CsgError> {
        self.vector3(&plane.normal)?;
        self.real(plane.d)
    }

    /// Column-major, like nalgebra's storage.
    fn matrix(&mut self, m: &Matrix4<Real>) -> Result<(), CsgError> {
        m.iter().try_for_each(|&x| self.real(x))
    }

    fn count(&mut self, len: usize) -> Result<(), CsgError> {
        let len = u32::try_from(len).map_err(|_| CsgError::CorruptStream(format!("{len} items do not fit a u32 count")))?;
        self.u32(len)
    }
}

struct Decoder<'a, R: Read> {
    input: &'a mut R,
}

impl<R: Read> Decoder<'_, R> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], CsgError> {
        let mut buffer = [0u8; N];
        self.input.read_exact(&mut buffer).map_err(|error| match error.kind() {
            ErrorKind::UnexpectedEof => CsgError::CorruptStream("stream ended early".into()),
            _ => CsgError::Io(error),
        })?;
        Ok(buffer)
    }

    fn u32(&mut self) -> Result<u32, CsgError> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    fn i32(&mut self) -> Result<i32, CsgError> {
        Ok(i32::from_le_bytes(self.bytes()?))
    }

    fn f32(&mut self) -> Result<f32, CsgError> {
        Ok(f32::from_le_bytes(self.bytes()?))
    }

    fn real(&mut self) -> Result<Real, CsgError> {
        Ok(f64::from_le_bytes(self.bytes()?) as Real)
    }

    fn bool(&mut self) -> Result<bool, CsgError> {
        let [byte] = self.bytes::<1>()?;
        Ok(byte != 0)
    }

    fn vector3(&mut self) -> Result<Vector3<Real>, CsgError> {
        Ok(Vector3::new(self.real()?, self.real()?, self.real()?))
    }

    fn point3(&mut self) -> Result<Point3<Real>, CsgError> {
        Ok(Point3::from(self.vector3()?))
    }

    fn plane(&mut self) -> Result<Plane, CsgError> {
        let normal = self.vector3()?;
        Ok(Plane::new(normal, self.real()?))
    }

    fn matrix(&mut self) -> Result<Matrix4<Real>, CsgError> {
        let mut m = Matrix4::zeros();
        for x in m.iter_mut() {
            *x = self.real()?;
        }
        Ok(m)
    }

    /// Item count, sanity-checked so a corrupt count cannot trigger a huge allocation.
    fn count(&mut self, what: &str) -> Result<usize, CsgError> {
        const LIMIT: u32 = 1 << 28;
        let count = self.u32()?;
        if count > LIMIT {
            return Err(CsgError::CorruptStream(format!("{what} count {count} is implausible")));
        }
        Ok(count as usize)
    }

    fn bounds(&mut self) -> Result<Aabb, CsgError> {
        let mins = self.point3()?;
        let maxs = self.point3()?;
        Ok(Aabb::new(mins, maxs))
    }

    fn vertex_data(&mut self) -> Result<VertexData, CsgError> {
        let mut data = VertexData {
            normal: self.vector3()?,
            tangent: self.vector3()?,
            binormal: self.vector3()?,
            ..VertexData::default()
        };
        for uv in &mut data.uv {
            *uv = Vector2::new(self.real()?, self.real()?);
        }
        data.color = Vector4::new(self.real()?, self.real()?, self.real()?, self.real()?);
        Ok(data)
    }

    fn triangle_tail(&mut self, triangle: &mut Triangle) -> Result<(), CsgError> {
        triangle.submesh_index = self.i32()?;
        triangle.smoothing_mask = self.u32()?;
        triangle.extra_data_index = self.u32()?;
        triangle.normal = self.vector3()?;
        triangle.area = self.real()?;
        Ok(())
    }

    fn triangle(&mut self) -> Result<Triangle, CsgError> {
        let mut triangle = Triangle::default();
        for vertex in &mut triangle.vertices {
            *vertex = self.point3()?;
        }
        self.triangle_tail(&mut triangle)?;
        Ok(triangle)
    }

    fn interpolator(&mut self) -> Result<Interpolator, CsgError> {
        let mut frame = Interpolator::default();
        for channel in 0..VertexData::CHANNEL_COUNT {
            frame.set_frame(channel, self.plane()?);
        }
        Ok(frame)
    }
}

impl Solid {
    /// Write the solid in the current format.
    #[instrument(skip_all, fields(nodes = self.cache.nodes.outstanding(), triangles = self.mesh.len()))]
    pub fn serialize<W: Write>(&self, out: &mut W) -> Result<(), CsgError> {
        let mut e = Encoder { out };
        e.u32(Version::CURRENT as u32)?;

        for id in self.cache.nodes.iter(self.root) {
            e.u32(1)?;
            match self.cache.nodes[id].kind {
                NodeKind::Leaf(region) => {
                    e.u32(NODE_LEAF)?;
                    e.u32(region.side)?;
                },
                NodeKind::Branch(surface) => {
                    e.u32(NODE_BRANCH)?;
                    e.u32(surface.plane_index)?;
                    e.u32(surface.triangle_start)?;
                    e.u32(surface.triangle_stop)?;
                    e.f32(surface.total_triangle_area)?;
                },
            }
        }

        e.count(self.mesh.len())?;
        for triangle in &self.mesh {
            for vertex in &triangle.vertices {
                e.point3(vertex)?;
            }
            e.i32(triangle.submesh_index)?;
            e.u32(triangle.smoothing_mask)?;
            e.u32(triangle.extra_data_index)?;
            e.vector3(&triangle.normal)?;
            e.real(triangle.area)?;
        }
        e.count(self.frames.len())?;
        for frame in &self.frames {
            for channel in 0..VertexData::CHANNEL_COUNT {
                e.plane(frame.frame(channel))?;
            }
        }

        e.real(self.mesh_size)?;
        e.bool(self.incidental_mesh)?;
        e.point3(&self.mesh_bounds.mins)?;
        e.point3(&self.mesh_bounds.maxs)?;
        e.matrix(&self.internal_transform)?;
        e.matrix(&self.internal_transform_inverse)?;

        e.count(self.planes.len())?;
        for plane in &self.planes {
            e.plane(plane)?;
        }

        e.bool(self.combined)?;
        e.real(self.combining_mesh_size)?;
        e.bool(self.combining_incidental_mesh)?;
        debug!("solid serialized");
        Ok(())
    }

    /// Read a solid written by [`Solid::serialize`] at any format revision up
    /// to the current one.
    #[instrument(skip_all)]
    pub fn deserialize<R: Read>(input: &mut R) -> Result<Solid, CsgError> {
        let mut d = Decoder { input };
        let found = d.u32()?;
        let Some(version) = Version::from_u32(found) else {
            warn!(found, "stream written by a newer format");
            return Err(CsgError::UnsupportedVersion {
                found,
                current: Version::CURRENT as u32,
            });
        };

        let mut solid = Solid::new();
        solid.read_tree(&mut d)?;

        if version < Version::RevisedMeshTolerances {
            // retired linear and angular tolerances
            d.real()?;
            d.real()?;
        }

        if version >= Version::SerializingTriangleFrames {
            let count = d.count("triangle")?;
            solid.mesh = (0..count).map(|_| d.triangle()).collect::<Result<_, _>>()?;
            let count = d.count("interpolator")?;
            solid.frames = (0..count).map(|_| d.interpolator()).collect::<Result<_, _>>()?;
        } else {
            // buffers grow with what is actually decoded, never with the stored count
            let count = d.count("triangle")?;
            for _ in 0..count {
                let mut triangle = Triangle::default();
                let mut data = [VertexData::default(); 3];
                for (vertex, data) in triangle.vertices.iter_mut().zip(data.iter_mut()) {
                    *vertex = d.point3()?;
                    if version < Version::UsingOnlyPositionDataInVertex {
                        *data = d.vertex_data()?;
                    }
                }
                d.triangle_tail(&mut triangle)?;
                if version >= Version::UsingOnlyPositionDataInVertex {
                    // only positions were kept: fall back to the face normal
                    for data in &mut data {
                        data.normal = triangle.normal;
                    }
                }
                solid.frames.push(Interpolator::from_triangle(&triangle, &data));
                solid.mesh.push(triangle);
            }
        }

        solid.mesh_size = d.real()?;
        if version >= Version::IncidentalMeshDistinction {
            solid.incidental_mesh = d.bool()?;
        }
        if version >= Version::SerializingMeshBounds {
            solid.mesh_bounds = d.bounds()?;
        } else {
            solid.update_mesh_bounds();
        }
        if version < Version::RevisedMeshTolerances {
            // retired distance tolerance
            d.real()?;
        }
        if version >= Version::AddedInternalTransform {
            solid.internal_transform = d.matrix()?;
            solid.internal_transform_inverse = d.matrix()?;
        } else {
            solid.internal_transform = Matrix4::identity();
            solid.internal_transform_inverse = inverse34(&solid.internal_transform);
        }

        let count = d.count("plane")?;
        solid.planes = (0..count).map(|_| d.plane()).collect::<Result<_, _>>()?;

        solid.combined = d.bool()?;
        solid.combining_mesh_size = d.real()?;
        if version >= Version::IncidentalMeshDistinction {
            solid.combining_incidental_mesh = d.bool()?;
        }

        solid.validate_references()?;
        debug!(?version, nodes = solid.cache.nodes.outstanding(), triangles = solid.mesh.len(), "solid deserialized");
        Ok(solid)
    }

    /// Replace the tree with the node stream. Branch children are read child 0
    /// first; after each leaf the most recent branch still missing child 1
    /// receives the next node. An empty stream leaves the trivial tree.
    fn read_tree<R: Read>(&mut self, d: &mut Decoder<'_, R>) -> Result<(), CsgError> {
        let mut pending: Vec<NodeId> = Vec::new();
        // (parent, slot) the next node attaches to
        let mut attach: Option<(NodeId, usize)> = None;
        let mut root: Option<NodeId> = None;

        loop {
            if d.u32()? == 0 {
                if root.is_none() {
                    break;
                }
                return Err(CsgError::CorruptStream("missing node inside the tree".into()));
            }
            let kind = match d.u32()? {
                NODE_LEAF => NodeKind::Leaf(Region { side: d.u32()? }),
                NODE_BRANCH => NodeKind::Branch(Surface {
                    plane_index: d.u32()?,
                    triangle_start: d.u32()?,
                    triangle_stop: d.u32()?,
                    total_triangle_area: d.f32()?,
                }),
                other => return Err(CsgError::CorruptStream(format!("unknown node type {other}"))),
            };
            let id = self.cache.nodes.borrow(Node { kind, ..Node::leaf(0) });
            match attach {
                Some((parent, slot)) => self.cache.nodes.set_child(parent, slot, id),
                None => root = Some(id),
            }

            if matches!(kind, NodeKind::Branch(_)) {
                pending.push(id);
                attach = Some((id, 0));
                continue;
            }
            match pending.pop() {
                Some(parent) => attach = Some((parent, 1)),
                None => break,
            }
        }

        if let Some(root) = root {
            let trivial = self.root;
            self.cache.nodes.release_subtree(trivial);
            self.root = root;
        }
        Ok(())
    }

    /// Every index a branch holds must land inside the buffers.
    fn validate_references(&self) -> Result<(), CsgError> {
        if self.frames.len() != self.mesh.len() {
            return Err(CsgError::CorruptStream(format!(
                "{} interpolators for {} triangles",
                self.frames.len(),
                self.mesh.len()
            )));
        }
        for id in self.cache.nodes.iter(self.root) {
            if let Some(surface) = self.cache.nodes[id].surface() {
                if surface.plane_index as usize >= self.planes.len()
                    || surface.triangle_start > surface.triangle_stop
                    || surface.triangle_stop as usize > self.mesh.len()
                {
                    return Err(CsgError::CorruptStream(format!("branch {:?} refers outside the buffers", id)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::solid::SolidType;
    use crate::operation::Operation;

    fn slab(lo: Real, hi: Real) -> Solid {
        Solid::from_convex_polyhedron(&[Plane::new(Vector3::x(), -hi), Plane::new(-Vector3::x(), lo)], None, &[])
    }

    #[test]
    fn tree_survives_a_round_trip() {
        let solid = slab(0.0, 1.0).boolean(&slab(2.0, 3.0), Operation::Union).unwrap();
        let mut bytes = Vec::new();
        solid.serialize(&mut bytes).unwrap();
        let copy = Solid::deserialize(&mut bytes.as_slice()).unwrap();

        assert_eq!(copy.get_type(), SolidType::Nontrivial);
        assert_eq!(copy.planes(), solid.planes());
        assert_eq!(copy.nodes().outstanding(), solid.nodes().outstanding());
        for x in [-0.5, 0.5, 1.5, 2.5, 3.5] {
            let p = Point3::new(x, 0.0, 0.0);
            assert_eq!(copy.point_inside(&p, None).unwrap(), solid.point_inside(&p, None).unwrap());
        }
    }

    #[test]
    fn trivial_solid_round_trips() {
        let mut bytes = Vec::new();
        Solid::from_trivial(true).serialize(&mut bytes).unwrap();
        assert_eq!(Solid::deserialize(&mut bytes.as_slice()).unwrap().get_type(), SolidType::AllSpace);
    }

    #[test]
    fn newer_versions_are_refused() {
        let mut bytes = Vec::new();
        Solid::new().serialize(&mut bytes).unwrap();
        bytes[..4].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            Solid::deserialize(&mut bytes.as_slice()),
            Err(CsgError::UnsupportedVersion { found: 7, current: 6 })
        ));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let mut bytes = Vec::new();
        slab(0.0, 1.0).serialize(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(Solid::deserialize(&mut bytes.as_slice()), Err(CsgError::CorruptStream(_))));
    }

    #[test]
    fn huge_triangle_count_is_corrupt_not_an_allocation() {
        // position-only format, no root, then a count at the sanity limit and nothing behind it
        let mut bytes = Vec::new();
        for word in [Version::UsingOnlyPositionDataInVertex as u32, 0, 1 << 28] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        assert_eq!(bytes.len(), 12);
        assert!(matches!(Solid::deserialize(&mut bytes.as_slice()), Err(CsgError::CorruptStream(_))));
    }

    #[test]
    fn absent_root_gives_the_empty_set() {
        // an initial-format stream: no root, retired tolerances, no triangles
        let mut bytes = Vec::new();
        let mut e = Encoder { out: &mut bytes };
        e.u32(Version::Initial as u32).unwrap();
        e.u32(0).unwrap();
        e.real(1e-4).unwrap();
        e.real(1e-3).unwrap();
        e.u32(0).unwrap();
        e.real(1.0).unwrap();
        e.real(1e-5).unwrap();
        e.u32(0).unwrap();
        e.bool(false).unwrap();
        e.real(1.0).unwrap();

        let solid = Solid::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(solid.get_type(), SolidType::EmptySet);
        assert_eq!(solid.internal_transform(), &Matrix4::identity());
    }
}
