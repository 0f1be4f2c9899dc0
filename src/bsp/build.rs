//! Tree construction.
//!
//! [`Solid::from_mesh`] turns a triangle soup into a tree in three passes: the
//! triangles are shuffled and normalized into a unit frame, coplanar triangles
//! are gathered into [`Surface`]s, and the surface stack is split iteratively
//! until every leaf's stack is empty. Leaves then take the side whose ancestor
//! triangles face them with the larger clipped area, which tolerates small gaps
//! in the input.

use crate::bsp::node::{Node, NodeId, NodeKind, Surface};
use crate::bsp::solid::Solid;
use crate::clip::clip_triangle_to_halfspaces;
use crate::config::{BuildParameters, Tolerances};
use crate::errors::CsgError;
use crate::feasibility::{PlaneSet, test_feasibility};
use crate::float_types::Real;
use crate::interpolator::Interpolator;
use crate::plane::{Plane, determinant3, inverse34, linear_part};
use crate::progress::{CancellationToken, ProgressListener, QuantityProgress};
use crate::random::{UserRandom, default_random, shuffle};
use crate::triangle::{RenderTriangle, Triangle};
use crate::vertex::VertexData;
use nalgebra::{Matrix4, Point3, Vector3};
use std::ops::Range;
use tracing::{debug, instrument, warn};

/// Optional collaborators of a build. Everything defaults to absent: the
/// deterministic built-in random source, no progress, no cancellation.
#[derive(Default)]
pub struct BuildContext<'a> {
    pub random: Option<&'a mut dyn UserRandom>,
    pub progress: Option<&'a mut dyn ProgressListener>,
    pub cancel: Option<&'a CancellationToken>,
}

impl<'a> BuildContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_random(mut self, random: &'a mut dyn UserRandom) -> Self {
        self.random = Some(random);
        self
    }

    pub fn with_progress(mut self, progress: &'a mut dyn ProgressListener) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A pending subtree: the leaf to grow, its slice of the surface stack, and
/// the stack length to restore once it is finished.
#[derive(Debug, Clone)]
struct BuildFrame {
    node: NodeId,
    read: Range<usize>,
    input_stack_size: usize,
}

struct BuildConstants<'p> {
    params: &'p BuildParameters,
    recip_max_area: Real,
}

/// Largest column length of the linear part of `tm`.
pub(crate) fn max_axis_scale(tm: &Matrix4<Real>) -> Real {
    linear_part(tm).column_iter().map(|c| c.norm()).fold(0.0, Real::max)
}

/// Bit 0: some vertex on or above `plane`. Bit 1: some vertex on or below it.
fn triangle_flags(triangle: &Triangle, plane: &Plane, tolerance: Real) -> u8 {
    triangle.vertices.iter().fold(0, |flags, v| {
        let side = plane.classify(v, tolerance);
        flags | ((side <= 0) as u8) << 1 | (side >= 0) as u8
    })
}

impl Solid {
    /// Build a solid from a closed (or nearly closed) triangle mesh given in
    /// caller space.
    ///
    /// Fails with [`CsgError::EmptyMesh`] for an empty mesh and with
    /// [`CsgError::Cancelled`] if `context.cancel` fires during the build.
    #[instrument(skip_all, fields(triangles = mesh.len()))]
    pub fn from_mesh(mesh: &[RenderTriangle], params: &BuildParameters, context: BuildContext<'_>) -> Result<Solid, CsgError> {
        if mesh.is_empty() {
            warn!("cannot build a solid from an empty mesh");
            return Err(CsgError::EmptyMesh);
        }
        let BuildContext { random, progress, cancel } = context;

        let mut fallback_random;
        let random: &mut dyn UserRandom = match random {
            Some(random) => random,
            None => {
                fallback_random = default_random();
                &mut fallback_random
            },
        };
        let mut order: Vec<usize> = (0..mesh.len()).collect();
        shuffle(&mut order, random);

        let mut bounds = crate::float_types::parry3d::bounding_volume::Aabb::new_invalid();
        for triangle in mesh {
            for vertex in &triangle.vertices {
                bounds.take_point(vertex.position);
            }
        }
        let center = bounds.center();
        let half_extents = bounds.half_extents();
        let caller_mesh_size = half_extents.max();
        let fallback_scale = if caller_mesh_size > 0.0 { caller_mesh_size } else { 1.0 };
        let scale = half_extents.map(|e| if e > params.tolerances.linear * caller_mesh_size { e } else { fallback_scale });
        let recip_scale = scale.map(|e| 1.0 / e);
        let grid = params.snap_grid_size as Real;

        let mut solid = Solid::new();
        solid.tolerances = params.tolerances;
        solid.mesh.reserve(mesh.len());
        solid.frames.reserve(mesh.len());
        for &index in &order {
            let source = &mesh[index];
            let mut triangle = Triangle::from_render_triangle(source);
            let data: [VertexData; 3] = source.vertices.map(|v| v.data);
            solid.frames.push(Interpolator::from_triangle(&triangle, &data));
            for vertex in &mut triangle.vertices {
                let mut p = (*vertex - center).component_mul(&recip_scale);
                if params.snap_grid_size > 0 {
                    p = p.map(|x| (grid * x + 0.5).floor() / grid);
                }
                *vertex = Point3::from(p);
            }
            triangle.calculate_quantities();
            solid.mesh.push(triangle);
        }

        let (surfaces, total_area, max_area) = solid.coalesce_surfaces(&params.tolerances);
        debug!(surfaces = surfaces.len(), "coalesced coplanar triangles");

        let constants = BuildConstants {
            params,
            recip_max_area: if max_area > 0.0 { 1.0 / max_area } else { 0.0 },
        };
        let mut quantity = progress.map(|listener| QuantityProgress::new(listener, total_area));
        let root = solid.root;
        if let Err(err) = solid.build_tree(root, surfaces, &constants, quantity.as_mut(), cancel) {
            debug!("build stopped: {err}");
            return Err(err);
        }
        solid.cache.clear_temp();

        // unit frame back to caller space
        let unit_to_mesh = Matrix4::new_translation(&center.coords) * Matrix4::new_nonuniform_scaling(&scale);
        match params.internal_transform {
            Some(internal) => {
                solid.internal_transform = internal;
                solid.internal_transform_inverse = inverse34(&internal);
                solid.apply_transform(&(internal * unit_to_mesh), None);
                solid.mesh_size = caller_mesh_size * max_axis_scale(&internal);
            },
            None => {
                solid.internal_transform_inverse = unit_to_mesh;
                solid.internal_transform = inverse34(&unit_to_mesh);
                solid.mesh_size = 1.0;
            },
        }
        solid.combining_mesh_size = solid.mesh_size;
        solid.update_mesh_bounds();

        if !params.keep_triangles {
            solid.delete_triangles();
        }
        debug!(nodes = solid.cache.nodes.outstanding(), planes = solid.planes.len(), "tree built");
        Ok(solid)
    }

    /// Convex solid bounded by `planes`, each read as `plane(x) <= 0` in caller
    /// space. No planes gives all of space and an empty intersection gives the
    /// empty set. `incidental_mesh` triangles are carried for reconstruction
    /// only and never split the tree.
    pub fn from_convex_polyhedron(
        planes: &[Plane],
        internal_transform: Option<Matrix4<Real>>,
        incidental_mesh: &[RenderTriangle],
    ) -> Solid {
        let mut solid = Solid::from_trivial(true);
        solid.planes = planes.iter().map(|p| p.normalized()).collect();

        // chain: the positive side of each plane is an outside leaf
        let mut node = solid.root;
        for plane_index in 0..solid.planes.len() {
            solid.cache.nodes[node].kind = NodeKind::Branch(Surface {
                plane_index: plane_index as u32,
                triangle_start: 0,
                triangle_stop: 0,
                total_triangle_area: 0.0,
            });
            let outside = solid.cache.nodes.borrow(Node::leaf(0));
            let inside = solid.cache.nodes.borrow(Node::leaf(1));
            solid.cache.nodes.set_child(node, 0, outside);
            solid.cache.nodes.set_child(node, 1, inside);
            node = inside;
        }

        if test_feasibility(&[], &PlaneSet::new(&solid.planes)).is_empty() {
            debug!(planes = planes.len(), "convex plane set is empty");
            let tolerances = solid.tolerances;
            solid = Solid::new();
            solid.tolerances = tolerances;
            return solid;
        }

        if let Some(internal) = internal_transform {
            solid.internal_transform = internal;
            solid.internal_transform_inverse = inverse34(&internal);
            solid.apply_transform(&internal, None);
            solid.mesh_size = max_axis_scale(&internal);
            solid.combining_mesh_size = solid.mesh_size;
        }

        if !incidental_mesh.is_empty() {
            let mirrored = determinant3(&solid.internal_transform) < 0.0;
            for source in incidental_mesh {
                let mut triangle = Triangle::from_render_triangle(source);
                let data: [VertexData; 3] = source.vertices.map(|v| v.data);
                solid.frames.push(Interpolator::from_triangle(&triangle, &data));
                triangle.transform(&solid.internal_transform, mirrored);
                solid.mesh.push(triangle);
            }
            solid.incidental_mesh = true;
            solid.update_mesh_bounds();
        }
        solid
    }

    /// Sort the triangle buffer into runs lying on a common plane and create
    /// one plane and one [`Surface`] per run. Returns the surfaces with the
    /// total and the largest surface area.
    fn coalesce_surfaces(&mut self, tolerances: &Tolerances) -> (Vec<Surface>, Real, Real) {
        let count = self.mesh.len();
        let angular2 = tolerances.angular * tolerances.angular;
        let mut surfaces = Vec::new();
        let mut total_area: Real = 0.0;
        let mut max_area: Real = 0.0;

        let mut index = 0;
        while index < count {
            let start = index;
            let first = self.mesh[index];
            let mut plane = first.plane();
            plane.normalize();
            let mut area = first.area;
            index += 1;

            for test_index in index..count {
                let test = self.mesh[test_index];
                if test.normal.cross(&plane.normal).norm_squared() >= angular2 || test.normal.dot(&plane.normal) <= 0.0 {
                    continue;
                }
                if test.vertices.iter().any(|v| plane.classify(v, tolerances.linear) != 0) {
                    continue;
                }
                self.mesh.swap(index, test_index);
                self.frames.swap(index, test_index);

                let mut normal: Vector3<Real> = plane.normal * area + test.normal * test.area;
                if normal.norm() > 0.0 {
                    normal.normalize_mut();
                }
                area += test.area;
                index += 1;
                let projection: Real = self.mesh[start..index]
                    .iter()
                    .flat_map(|t| t.vertices.iter())
                    .map(|v| normal.dot(&v.coords))
                    .sum();
                plane = Plane::new(normal, -projection / (3 * (index - start)) as Real);
            }

            // lift the plane so every triangle of the run lies on or below it
            let max_projection = self.mesh[start..index]
                .iter()
                .flat_map(|t| t.vertices.iter())
                .map(|v| plane.normal.dot(&v.coords))
                .fold(Real::MIN, Real::max);
            plane.d = -max_projection;

            surfaces.push(Surface {
                plane_index: self.planes.len() as u32,
                triangle_start: start as u32,
                triangle_stop: index as u32,
                total_triangle_area: area as f32,
            });
            self.planes.push(plane);
            total_area += area;
            max_area = max_area.max(area);
        }
        (surfaces, total_area, max_area)
    }

    /// Grow the subtree at `root` from `stack`, depth first through an explicit
    /// frame stack. Child 1 is deferred while child 0 is built.
    fn build_tree(
        &mut self,
        root: NodeId,
        mut stack: Vec<Surface>,
        constants: &BuildConstants<'_>,
        mut progress: Option<&mut QuantityProgress<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), CsgError> {
        let mut pending: Vec<BuildFrame> = Vec::new();
        let mut frame = BuildFrame {
            node: root,
            read: 0..stack.len(),
            input_stack_size: stack.len(),
        };

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(CsgError::Cancelled);
            }

            frame.read.end = self.remove_redundant_surfaces(&mut stack, frame.read.clone(), frame.node);
            if frame.read.is_empty() {
                self.assign_leaf_side(frame.node, progress.as_deref_mut());
                match pending.pop() {
                    Some(next) => {
                        frame = next;
                        stack.truncate(frame.input_stack_size);
                    },
                    None => break,
                }
            } else {
                let [child0_range, child1_range] =
                    self.create_branch_surface_and_split_stack(frame.node, &mut stack, frame.read.clone(), constants);
                let child1 = self.cache.nodes.borrow(Node::leaf(0));
                self.cache.nodes.set_child(frame.node, 1, child1);
                pending.push(BuildFrame {
                    node: child1,
                    read: child1_range,
                    input_stack_size: stack.len(),
                });
                let child0 = self.cache.nodes.borrow(Node::leaf(0));
                self.cache.nodes.set_child(frame.node, 0, child0);
                frame = BuildFrame {
                    node: child0,
                    read: child0_range,
                    input_stack_size: stack.len(),
                };
            }
        }
        Ok(())
    }

    /// Drop from `stack[read]` every surface none of whose triangles reaches the
    /// region of `leaf`. Returns the new end of the range; order is not kept.
    fn remove_redundant_surfaces(&mut self, stack: &mut [Surface], read: Range<usize>, leaf: NodeId) -> usize {
        let halfspaces = self.leaf_halfspaces(leaf);
        let tolerance = self.tolerances.base;
        let origin = Point3::origin();
        let mut stop = read.end;
        for i in read.rev() {
            let surface = stack[i];
            let reaches_leaf = surface.triangles().any(|t| {
                clip_triangle_to_halfspaces(&mut self.cache.vertices, &self.mesh[t].vertices, 1, &halfspaces, None, tolerance, &origin, None)
                    .area
                    > 0.0
            });
            if !reaches_leaf {
                stop -= 1;
                stack[i] = stack[stop];
            }
        }
        stop
    }

    /// Set the side of `leaf` from the signed area of ancestor triangles clipped
    /// to it: triangles whose plane has the leaf below count positive. A zero
    /// sum leaves the leaf outside.
    fn assign_leaf_side(&mut self, leaf: NodeId, progress: Option<&mut QuantityProgress<'_>>) {
        let halfspaces = self.leaf_halfspaces(leaf);
        let ancestors: Vec<(Surface, u32)> = self.cache.nodes.surfaces(leaf).collect();
        let tolerance = self.tolerances.base;
        let origin = Point3::origin();

        let mut signed_area: Real = 0.0;
        for (surface, side) in ancestors {
            let sign = if side != 0 { 1.0 } else { -1.0 };
            for t in surface.triangles() {
                let measure = clip_triangle_to_halfspaces(
                    &mut self.cache.vertices,
                    &self.mesh[t].vertices,
                    side as usize,
                    &halfspaces,
                    Some(surface.plane_index),
                    tolerance,
                    &origin,
                    None,
                );
                signed_area += sign * measure.area;
            }
        }

        if signed_area != 0.0 {
            self.cache.nodes[leaf].set_side((signed_area > 0.0) as u32);
            if let Some(progress) = progress {
                progress.add(0.5 * signed_area.abs());
            }
        }
    }

    /// Turn `node` into a branch on one surface of `stack[read]` and append the
    /// surfaces for its two children to the stack, child 0 (above) first.
    /// Returns the two appended ranges.
    fn create_branch_surface_and_split_stack(
        &mut self,
        node: NodeId,
        stack: &mut Vec<Surface>,
        read: Range<usize>,
        constants: &BuildConstants<'_>,
    ) -> [Range<usize>; 2] {
        let params = constants.params;
        let tolerance = self.tolerances.base;
        let list = read.start;
        let list_size = read.len();

        let mut flags = std::mem::take(&mut self.cache.surface_flags);
        let mut test_flags = std::mem::take(&mut self.cache.surface_test_flags);
        flags.clear();
        flags.resize(list_size, 0);
        test_flags.clear();
        test_flags.resize(list_size, 0);

        let mut branch_index = 0;
        let mut flags_ready = false;

        if list_size > 1 {
            // is the largest surface an outlier of the log-area distribution?
            let mut max_log_area = Real::MIN;
            let mut mean_log_area: Real = 0.0;
            let mut sigma2_log_area: Real = 0.0;
            if params.log_area_sigma_threshold > 0.0 {
                let mut positive = 0usize;
                for i in 0..list_size {
                    let area = stack[list + i].total_triangle_area as Real;
                    if area > 0.0 {
                        let log_area = area.ln();
                        if log_area > max_log_area {
                            max_log_area = log_area;
                            branch_index = i;
                        }
                        mean_log_area += log_area;
                        positive += 1;
                    }
                }
                if positive > 0 {
                    mean_log_area /= positive as Real;
                    if positive > 1 {
                        for i in 0..list_size {
                            let area = stack[list + i].total_triangle_area as Real;
                            if area > 0.0 {
                                let deviation = area.ln() - mean_log_area;
                                sigma2_log_area += deviation * deviation;
                            }
                        }
                        sigma2_log_area /= (positive - 1) as Real;
                    }
                }
            }

            let threshold = params.log_area_sigma_threshold;
            let excess = max_log_area - mean_log_area;
            if max_log_area > mean_log_area && excess * excess < threshold * threshold * sigma2_log_area {
                let test_set_size = match params.test_set_size {
                    0 => list_size,
                    n => list_size.min(n as usize),
                };
                let mut min_score = Real::MAX;
                for i in 0..test_set_size {
                    let test_plane = self.planes[stack[list + i].plane_index as usize];
                    let mut counts = [0u32; 4];
                    let mut triangle_count = 0u32;
                    for j in 0..list_size {
                        test_flags[j] = 0;
                        if j == i {
                            continue;
                        }
                        let surface = stack[list + j];
                        for t in surface.triangles() {
                            let triangle_flags = triangle_flags(&self.mesh[t], &test_plane, tolerance);
                            counts[triangle_flags as usize] += 1;
                            test_flags[j] |= triangle_flags;
                        }
                        triangle_count += surface.triangle_count();
                    }
                    let score = stack[list + i].total_triangle_area as Real * constants.recip_max_area
                        + (params.split_weight * counts[3] as Real
                            + params.imbalance_weight * (counts[1] as Real - counts[2] as Real).abs())
                            / triangle_count.max(1) as Real;
                    if score < min_score {
                        min_score = score;
                        branch_index = i;
                        flags.copy_from_slice(&test_flags);
                    }
                }
                flags_ready = true;
            }
        }

        let branch_surface = stack[list + branch_index];
        if !flags_ready {
            let branch_plane = self.planes[branch_surface.plane_index as usize];
            for j in 0..list_size {
                flags[j] = 0;
                if j == branch_index {
                    continue;
                }
                for t in stack[list + j].triangles() {
                    flags[j] |= triangle_flags(&self.mesh[t], &branch_plane, tolerance);
                }
            }
        }

        let child0_start = stack.len();
        for j in 0..list_size {
            if j != branch_index && flags[j] & 1 != 0 {
                stack.push(stack[list + j]);
            }
        }
        let child1_start = stack.len();
        for j in 0..list_size {
            if j != branch_index && flags[j] & 2 != 0 {
                stack.push(stack[list + j]);
            }
        }

        self.cache.nodes[node].kind = NodeKind::Branch(branch_surface);
        self.cache.surface_flags = flags;
        self.cache.surface_test_flags = test_flags;
        [child0_start..child1_start, child1_start..stack.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::solid::SolidType;
    use crate::vertex::Vertex;

    fn quad(corners: [Point3<Real>; 4]) -> [RenderTriangle; 2] {
        let normal = (corners[1] - corners[0]).cross(&(corners[2] - corners[0])).normalize();
        let vertex = |p: Point3<Real>| Vertex::new(p, normal);
        [
            RenderTriangle::new([vertex(corners[0]), vertex(corners[1]), vertex(corners[2])]),
            RenderTriangle::new([vertex(corners[0]), vertex(corners[2]), vertex(corners[3])]),
        ]
    }

    fn box_mesh(min: Point3<Real>, max: Point3<Real>) -> Vec<RenderTriangle> {
        let p = |x: usize, y: usize, z: usize| {
            Point3::new([min.x, max.x][x], [min.y, max.y][y], [min.z, max.z][z])
        };
        let faces = [
            [p(0, 0, 0), p(0, 1, 0), p(1, 1, 0), p(1, 0, 0)],
            [p(0, 0, 1), p(1, 0, 1), p(1, 1, 1), p(0, 1, 1)],
            [p(0, 0, 0), p(1, 0, 0), p(1, 0, 1), p(0, 0, 1)],
            [p(0, 1, 0), p(0, 1, 1), p(1, 1, 1), p(1, 1, 0)],
            [p(0, 0, 0), p(0, 0, 1), p(0, 1, 1), p(0, 1, 0)],
            [p(1, 0, 0), p(1, 1, 0), p(1, 1, 1), p(1, 0, 1)],
        ];
        faces.into_iter().flat_map(quad).collect()
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let result = Solid::from_mesh(&[], &BuildParameters::default(), BuildContext::new());
        assert!(matches!(result, Err(CsgError::EmptyMesh)));
    }

    #[test]
    fn box_coalesces_into_six_planes() {
        let mesh = box_mesh(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let solid = Solid::from_mesh(&mesh, &BuildParameters::default(), BuildContext::new()).unwrap();
        assert_eq!(solid.get_type(), SolidType::Nontrivial);
        assert_eq!(solid.planes().len(), 6);
        assert!(solid.leaves().any(|leaf| solid.nodes()[leaf].side() == Some(1)));
    }

    #[test]
    fn cancelled_build_reports_cancellation() {
        let mesh = box_mesh(Point3::origin(), Point3::new(1.0, 2.0, 3.0));
        let token = CancellationToken::new();
        token.cancel();
        let result = Solid::from_mesh(&mesh, &BuildParameters::default(), BuildContext::new().with_cancel(&token));
        assert!(matches!(result, Err(CsgError::Cancelled)));
    }

    #[test]
    fn convex_polyhedron_without_planes_is_all_space() {
        let solid = Solid::from_convex_polyhedron(&[], None, &[]);
        assert_eq!(solid.get_type(), SolidType::AllSpace);
    }

    #[test]
    fn contradictory_planes_give_the_empty_set() {
        let planes = [Plane::new(Vector3::x(), 1.0), Plane::new(-Vector3::x(), 1.0)];
        let solid = Solid::from_convex_polyhedron(&planes, None, &[]);
        assert_eq!(solid.get_type(), SolidType::EmptySet);
    }

    #[test]
    fn triangle_flags_mark_straddlers() {
        let plane = Plane::new(Vector3::z(), 0.0);
        let straddle = Triangle::from_render_triangle(&RenderTriangle::from_positions([
            Point3::new(0.0, 0.0, -1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ]));
        let above = Triangle::from_render_triangle(&RenderTriangle::from_positions([
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ]));
        assert_eq!(triangle_flags(&straddle, &plane, 1e-9), 3);
        assert_eq!(triangle_flags(&above, &plane, 1e-9), 1);
    }
}
