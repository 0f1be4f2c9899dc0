//! Affine attribute interpolation over a source triangle.
//!
//! Each vertex channel (normal x, tangent y, uv1 v, …) is stored as an affine
//! function of position, `value(p) = frame.normal · p + frame.d`, fitted once from
//! the three source vertices. Evaluating a clipped vertex is then one dot product
//! per channel, with no barycentric solve.

use crate::float_types::{EPSILON, Real};
use crate::plane::{Plane, inverse_transpose34, linear_part};
use crate::triangle::Triangle;
use crate::vertex::VertexData;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

const CHANNELS: usize = VertexData::CHANNEL_COUNT;
const NORMAL: usize = 0;
const TANGENT: usize = 3;
const BINORMAL: usize = 6;
const UV: usize = 9;
const COLOR: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolator {
    frames: [Plane; CHANNELS],
}

impl Default for Interpolator {
    fn default() -> Self {
        Self {
            frames: [Plane::zero(); CHANNELS],
        }
    }
}

impl Interpolator {
    /// Fit the frames so the interpolator reproduces `data[i]` at `tri.vertices[i]`.
    /// The gradient of every channel lies in the triangle's plane. Degenerate
    /// triangles produce all-zero frames.
    pub fn from_triangle(tri: &Triangle, data: &[VertexData; 3]) -> Self {
        let [p0, p1, p2] = tri.vertices;
        let n = (p1 - p0).cross(&(p2 - p0));
        let n2 = n.norm_squared();
        if n2 < EPSILON * EPSILON {
            return Self::default();
        }

        // gradients of the barycentric coordinates
        let gradients = [
            n.cross(&(p2 - p1)) / n2,
            n.cross(&(p0 - p2)) / n2,
            n.cross(&(p1 - p0)) / n2,
        ];

        let mut frames = [Plane::zero(); CHANNELS];
        for (channel, frame) in frames.iter_mut().enumerate() {
            let values = Vector3::new(data[0].channel(channel), data[1].channel(channel), data[2].channel(channel));
            let mut gradient = gradients[0] * values.x + gradients[1] * values.y + gradients[2] * values.z;
            if gradient.norm_squared() < 100.0 * EPSILON * EPSILON {
                gradient = Vector3::zeros();
            }
            let mut offset = values.x - gradient.dot(&p0.coords);
            if offset.abs() < 100.0 * EPSILON {
                offset = 0.0;
            }
            *frame = Plane::new(gradient, offset);
        }
        Self { frames }
    }

    pub fn frame(&self, channel: usize) -> &Plane {
        &self.frames[channel]
    }

    pub fn set_frame(&mut self, channel: usize, frame: Plane) {
        self.frames[channel] = frame;
    }

    /// Attribute values at `point`.
    pub fn interpolate(&self, point: &Point3<Real>) -> VertexData {
        let mut data = VertexData::default();
        for (channel, frame) in self.frames.iter().enumerate() {
            data.set_channel(channel, frame.distance(point));
        }
        data
    }

    /// The interpolator for geometry moved by `tm`: frames are pulled back through
    /// the inverse, normals are carried by the inverse transpose and tangents and
    /// binormals by the matrix itself. Singular transforms give zero frames.
    pub fn transformed(&self, tm: &Matrix4<Real>) -> Self {
        let Some(inv_transpose) = inverse_transpose34(tm) else {
            return Self::default();
        };
        let mut result = Self::default();
        for (dst, src) in result.frames.iter_mut().zip(self.frames.iter()) {
            *dst = src.transformed(&inv_transpose);
        }

        let normal_linear = linear_part(&inv_transpose);
        let tangent_linear = linear_part(tm);
        for coefficient in 0..4 {
            result.mix_triple(NORMAL, coefficient, &normal_linear);
            result.mix_triple(TANGENT, coefficient, &tangent_linear);
            result.mix_triple(BINORMAL, coefficient, &tangent_linear);
        }
        result
    }

    fn mix_triple(&mut self, first: usize, coefficient: usize, linear: &Matrix3<Real>) {
        let read = |frame: &Plane| if coefficient < 3 { frame.normal[coefficient] } else { frame.d };
        let v = Vector3::new(
            read(&self.frames[first]),
            read(&self.frames[first + 1]),
            read(&self.frames[first + 2]),
        );
        let mixed = linear * v;
        for k in 0..3 {
            let frame = &mut self.frames[first + k];
            if coefficient < 3 {
                frame.normal[coefficient] = mixed[k];
            } else {
                frame.d = mixed[k];
            }
        }
    }

    /// Compare two interpolators channel group by channel group. Frame gradients must
    /// agree in scale and direction; offsets must agree within the group's tolerance,
    /// relative to the offset magnitude once it exceeds 1.
    pub fn approx_eq(&self, other: &Interpolator, tolerances: &InterpolatorTolerances) -> bool {
        let groups = [
            (NORMAL..UV, tolerances.direction),
            (UV..COLOR, tolerances.uv),
            (COLOR..CHANNELS, tolerances.color),
        ];
        groups.into_iter().all(|(range, tolerance)| {
            range.into_iter().all(|i| frames_equal(&self.frames[i], &other.frames[i], tolerances, tolerance))
        })
    }
}

/// Tolerances for [`Interpolator::approx_eq`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolatorTolerances {
    pub frame_direction: Real,
    pub frame_scale: Real,
    pub direction: Real,
    pub uv: Real,
    pub color: Real,
}

impl Default for InterpolatorTolerances {
    fn default() -> Self {
        Self {
            frame_direction: 1e-3,
            frame_scale: 1e-3,
            direction: 1e-3,
            uv: 1e-3,
            color: 1e-3,
        }
    }
}

fn frames_equal(f0: &Plane, f1: &Plane, tolerances: &InterpolatorTolerances, offset_tolerance: Real) -> bool {
    let n02 = f0.normal.norm_squared();
    let n12 = f1.normal.norm_squared();
    let scale_diff = n02 - n12;
    if scale_diff * scale_diff > 2.0 * tolerances.frame_scale * tolerances.frame_scale * (n02 + n12) {
        return false;
    }
    if f0.normal.cross(&f1.normal).norm_squared() > n02 * n12 * tolerances.frame_direction * tolerances.frame_direction {
        return false;
    }
    let origin_diff = f0.d - f1.d;
    let origin_scale = (0.5 * (f0.d.abs() + f1.d.abs())).max(1.0);
    origin_diff * origin_diff <= offset_tolerance * offset_tolerance * origin_scale * origin_scale
}
