//! Render vertices and their attribute frame

use crate::float_types::Real;
use nalgebra::{Point3, Vector2, Vector3, Vector4};

/// Number of UV channels carried per vertex.
pub const MAX_UV_COUNT: usize = 4;

/// Per-vertex attributes. Reconstructed, not copied, for vertices created by clipping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexData {
    pub normal: Vector3<Real>,
    pub tangent: Vector3<Real>,
    pub binormal: Vector3<Real>,
    pub uv: [Vector2<Real>; MAX_UV_COUNT],
    /// Red, green, blue, alpha in `[0, 1]`.
    pub color: Vector4<Real>,
}

impl Default for VertexData {
    fn default() -> Self {
        Self {
            normal: Vector3::zeros(),
            tangent: Vector3::zeros(),
            binormal: Vector3::zeros(),
            uv: [Vector2::zeros(); MAX_UV_COUNT],
            color: Vector4::zeros(),
        }
    }
}

impl VertexData {
    /// Number of scalar channels, in the order used by [`VertexData::channel`].
    pub const CHANNEL_COUNT: usize = 9 + 2 * MAX_UV_COUNT + 4;

    /// Scalar channel `index`: normal xyz, tangent xyz, binormal xyz, uv0..uv3, rgba.
    pub fn channel(&self, index: usize) -> Real {
        match index {
            0..=2 => self.normal[index],
            3..=5 => self.tangent[index - 3],
            6..=8 => self.binormal[index - 6],
            9..=16 => self.uv[(index - 9) / 2][(index - 9) % 2],
            17..=20 => self.color[index - 17],
            _ => 0.0,
        }
    }

    pub fn set_channel(&mut self, index: usize, value: Real) {
        match index {
            0..=2 => self.normal[index] = value,
            3..=5 => self.tangent[index - 3] = value,
            6..=8 => self.binormal[index - 6] = value,
            9..=16 => self.uv[(index - 9) / 2][(index - 9) % 2] = value,
            17..=20 => self.color[index - 17] = value,
            _ => {},
        }
    }

    /// Set the color from a packed `0xAARRGGBB` value.
    pub fn set_color_u32(&mut self, argb: u32) {
        let channel = |shift: u32| ((argb >> shift) & 0xFF) as Real / 255.0;
        self.color = Vector4::new(channel(16), channel(8), channel(0), channel(24));
    }

    /// Pack the color into `0xAARRGGBB`, clamping each channel to `[0, 1]`.
    pub fn color_u32(&self) -> u32 {
        let byte = |v: Real| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u32;
        (byte(self.color.w) << 24) | (byte(self.color.x) << 16) | (byte(self.color.y) << 8) | byte(self.color.z)
    }
}

/// A render vertex: a position plus its attribute frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<Real>,
    pub data: VertexData,
}

impl Vertex {
    pub fn new(position: Point3<Real>, normal: Vector3<Real>) -> Self {
        Self {
            position,
            data: VertexData {
                normal,
                ..VertexData::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_cover_every_attribute() {
        let mut data = VertexData::default();
        for i in 0..VertexData::CHANNEL_COUNT {
            data.set_channel(i, i as Real + 1.0);
        }
        assert_eq!(data.normal, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(data.uv[3], Vector2::new(16.0, 17.0));
        assert_eq!(data.color, Vector4::new(18.0, 19.0, 20.0, 21.0));
        for i in 0..VertexData::CHANNEL_COUNT {
            assert_eq!(data.channel(i), i as Real + 1.0);
        }
    }

    #[test]
    fn packed_color() {
        let mut data = VertexData::default();
        data.set_color_u32(0x80FF4000);
        assert_eq!(data.color_u32(), 0x80FF4000);
    }
}
