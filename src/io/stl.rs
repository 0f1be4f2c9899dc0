use crate::bsp::{BuildContext, Solid};
use crate::config::BuildParameters;
use crate::float_types::Real;
use crate::io::IoError;
use crate::triangle::RenderTriangle;
use nalgebra::Point3;
use std::io::Cursor;
use stl_io;

/// Export to ASCII STL
///
/// Facet normals are the geometric normals of the triangles; per-vertex
/// normals are not representable in STL.
///
/// ```rust
/// # use bspcsg::RenderTriangle;
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let triangles: Vec<RenderTriangle> = Vec::new();
/// let text = bspcsg::io::stl::to_stl_ascii(&triangles, "nothing");
/// assert!(text.starts_with("solid nothing"));
/// # Ok(())
/// # }
/// ```
pub fn to_stl_ascii(triangles: &[RenderTriangle], name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("solid {name}\n"));

    for tri in triangles {
        let [a, b, c] = tri.positions();
        let n = (b - a).cross(&(c - a)).try_normalize(0.0).unwrap_or_default();
        out.push_str(&format!("  facet normal {:.6} {:.6} {:.6}\n", n.x, n.y, n.z));
        out.push_str("    outer loop\n");
        for p in [a, b, c] {
            out.push_str(&format!("      vertex {:.6} {:.6} {:.6}\n", p.x, p.y, p.z));
        }
        out.push_str("    endloop\n");
        out.push_str("  endfacet\n");
    }

    out.push_str(&format!("endsolid {name}\n"));
    out
}

/// Export to BINARY STL (returns `Vec<u8>`)
pub fn to_stl_binary(triangles: &[RenderTriangle]) -> std::io::Result<Vec<u8>> {
    use stl_io::{Normal, Triangle, Vertex, write_stl};

    let facets: Vec<Triangle> = triangles
        .iter()
        .map(|tri| {
            let [a, b, c] = tri.positions();
            let n = (b - a).cross(&(c - a)).try_normalize(0.0).unwrap_or_default();
            #[allow(clippy::unnecessary_cast)]
            Triangle {
                normal: Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [a, b, c].map(|p| Vertex::new([p.x as f32, p.y as f32, p.z as f32])),
            }
        })
        .collect();

    let mut cursor = Cursor::new(Vec::new());
    write_stl(&mut cursor, facets.iter())?;
    Ok(cursor.into_inner())
}

/// Read the triangles of an ASCII or binary STL file. Vertex normals are
/// set to the facet's geometric normal.
pub fn from_stl(bytes: &[u8]) -> Result<Vec<RenderTriangle>, IoError> {
    let mesh = stl_io::read_stl(&mut Cursor::new(bytes))?;
    let position = |index: usize| -> Result<Point3<Real>, IoError> {
        let v = mesh
            .vertices
            .get(index)
            .ok_or_else(|| IoError::MalformedInput(format!("vertex index {index} out of range")))?;
        Ok(Point3::new(v[0] as Real, v[1] as Real, v[2] as Real))
    };

    mesh.faces
        .iter()
        .map(|face| {
            Ok(RenderTriangle::from_positions([
                position(face.vertices[0])?,
                position(face.vertices[1])?,
                position(face.vertices[2])?,
            ]))
        })
        .collect()
}

impl Solid {
    /// Build a solid from a closed STL mesh.
    pub fn from_stl(bytes: &[u8], params: &BuildParameters) -> Result<Solid, IoError> {
        let triangles = from_stl(bytes)?;
        Ok(Solid::from_mesh(&triangles, params, BuildContext::default())?)
    }

    /// Reconstruct the boundary and encode it as binary STL.
    pub fn to_stl_binary(&self) -> Result<Vec<u8>, IoError> {
        Ok(to_stl_binary(&self.to_mesh()?)?)
    }

    pub fn to_stl_ascii(&self, name: &str) -> Result<String, IoError> {
        Ok(to_stl_ascii(&self.to_mesh()?, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_round_trip_keeps_positions() {
        let tri = RenderTriangle::from_positions([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        let bytes = to_stl_binary(&[tri]).unwrap();
        let back = from_stl(&bytes).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].positions(), tri.positions());
        assert!((back[0].vertices[0].data.normal.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ascii_lists_every_facet() {
        let tri = RenderTriangle::from_positions([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]);
        let text = to_stl_ascii(&[tri, tri], "pair");
        assert_eq!(text.matches("facet normal").count(), 2);
        assert!(text.contains("facet normal 1.000000 0.000000 0.000000"));
        assert!(text.ends_with("endsolid pair\n"));
    }
}
