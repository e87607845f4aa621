//! Per-node relaxation toward a reference shape.
//!
//! A [`MorphingKernel`] moves the nodes of a surface so its edge lengths and
//! ring angles approach those of a reference coordinate array over the same
//! topology. The driver only relies on the trait; [`ForceKernel`] is the
//! implementation it uses by default.

use std::sync::Arc;

use log::trace;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::algo::Progress;
use crate::error::{Result, SurfaceError};
use crate::geometry;
use crate::mesh::{sphere_point, Surface, TopologyHelper};

/// Settings for one kernel run.
#[derive(Debug, Clone)]
pub struct KernelParameters {
    /// Weight of the edge-length term (0.0 to 1.0).
    pub linear_force: f32,

    /// Weight of the ring-angle term (0.0 to 1.0).
    pub angular_force: f32,

    /// Fraction of the force applied per iteration.
    pub step_size: f32,

    /// Number of iterations.
    pub iterations: usize,

    /// Stop when tile crossovers grow by more than this factor in one
    /// iteration. `None` skips the crossover check.
    pub divergence_ratio: Option<f32>,

    /// Use parallel execution.
    pub parallel: bool,
}

impl Default for KernelParameters {
    fn default() -> Self {
        Self {
            linear_force: 0.5,
            angular_force: 0.5,
            step_size: 0.5,
            iterations: 1,
            divergence_ratio: None,
            parallel: true,
        }
    }
}

impl KernelParameters {
    /// Set the force weights and step size.
    pub fn with_forces(mut self, linear: f32, angular: f32, step: f32) -> Self {
        self.linear_force = linear;
        self.angular_force = angular;
        self.step_size = step;
        self
    }

    /// Set the iteration count.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the divergence ratio.
    pub fn with_divergence_ratio(mut self, ratio: Option<f32>) -> Self {
        self.divergence_ratio = ratio;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Use sequential execution.
    pub fn sequential(self) -> Self {
        self.with_parallel(false)
    }
}

/// What a kernel run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelReport {
    /// Iterations completed.
    pub iterations: usize,
    /// Tile crossovers before and after the iteration that tripped the
    /// divergence check.
    pub divergence: Option<(usize, usize)>,
}

/// An iterative relaxer used by the multiresolution driver.
///
/// Implementations must keep the node count and topology, must be
/// deterministic, and must leave `surface` holding a valid coordinate array
/// even when they return early.
pub trait MorphingKernel: Send + Sync {
    /// Relax `surface` toward `reference` (one position per node).
    fn morph(
        &self,
        surface: &mut Surface,
        reference: &[Point3<f32>],
        params: &KernelParameters,
        progress: &Progress,
    ) -> Result<KernelReport>;
}

/// Edge-length and ring-angle forces with a Jacobi update.
///
/// For each node with at least two neighbors:
///
/// - every neighbor contributes `(ref_len - cur_len)` along the edge
///   direction, doubled when the edge is compressed below half its
///   reference length
/// - every ring tile `(node, a, b)` contributes, at `a` and at `b`, the
///   distance to the node times `sin(ref_angle - cur_angle)` along the
///   in-plane perpendicular of the edge to the node
///
/// Both sums are divided by the neighbor count. On spherical surfaces the
/// force is restricted to the tangent plane and the node is pushed back to
/// the sphere after each step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceKernel;

/// Reference measurements around one node.
#[derive(Debug, Clone, Default)]
struct NodeReference {
    /// `(neighbor, reference length)`.
    edges: Vec<(usize, f32)>,
    /// `(a, b, reference angle at a, reference angle at b)` per ring tile.
    angles: Vec<(usize, usize, f32, f32)>,
}

fn node_references(helper: &TopologyHelper, reference: &[Point3<f32>]) -> Vec<NodeReference> {
    (0..helper.num_nodes())
        .map(|node| {
            if helper.num_neighbors(node) < 2 {
                return NodeReference::default();
            }
            let p = &reference[node];
            let edges = helper
                .neighbors(node)
                .iter()
                .map(|&n| (n, (reference[n] - p).norm()))
                .collect();
            let angles = helper
                .ring(node)
                .pairs
                .iter()
                .map(|&(a, b)| {
                    let (pa, pb) = (&reference[a], &reference[b]);
                    (a, b, geometry::angle_at(p, pa, pb), geometry::angle_at(pa, pb, p))
                })
                .collect();
            NodeReference { edges, angles }
        })
        .collect()
}

fn node_force(
    coords: &[Point3<f32>],
    node: usize,
    reference: &NodeReference,
    params: &KernelParameters,
) -> Vector3<f32> {
    let p = coords[node];
    let count = reference.edges.len() as f32;

    let mut linear = Vector3::zeros();
    if params.linear_force > 0.0 {
        for &(n, ref_len) in &reference.edges {
            let delta = p - coords[n];
            let cur_len = delta.norm();
            if cur_len <= 0.0 || ref_len <= 0.0 {
                continue;
            }
            let mut error = ref_len - cur_len;
            if cur_len / ref_len < 0.5 {
                error *= 2.0;
            }
            linear += delta * (error * params.linear_force / cur_len);
        }
    }

    let mut angular = Vector3::zeros();
    if params.angular_force > 0.0 {
        for &(a, b, ref_a, ref_b) in &reference.angles {
            let (pa, pb) = (coords[a], coords[b]);
            let Some(normal) = geometry::triangle_normal(&p, &pa, &pb) else {
                continue;
            };

            let to_a = pa - p;
            let angle_a = geometry::angle_at(&p, &pa, &pb);
            let dir_a = to_a.cross(&normal);
            if let Some(dir_a) = dir_a.try_normalize(f32::EPSILON) {
                angular += dir_a * (to_a.norm() * (ref_a - angle_a).sin());
            }

            let to_b = pb - p;
            let angle_b = geometry::angle_at(&pa, &pb, &p);
            let dir_b = normal.cross(&to_b);
            if let Some(dir_b) = dir_b.try_normalize(f32::EPSILON) {
                angular += dir_b * (to_b.norm() * (ref_b - angle_b).sin());
            }
        }
        angular *= params.angular_force;
    }

    (linear + angular) / count
}

impl MorphingKernel for ForceKernel {
    fn morph(
        &self,
        surface: &mut Surface,
        reference: &[Point3<f32>],
        params: &KernelParameters,
        progress: &Progress,
    ) -> Result<KernelReport> {
        let n = surface.num_nodes();
        if reference.len() != n {
            return Err(SurfaceError::NodeCountMismatch {
                coords: reference.len(),
                topology: n,
            });
        }
        if params.step_size <= 0.0 || !params.step_size.is_finite() {
            return Err(SurfaceError::invalid_param(
                "step_size",
                params.step_size,
                "must be positive",
            ));
        }
        let mut report = KernelReport::default();
        if params.iterations == 0 {
            return Ok(report);
        }

        let topology = Arc::clone(surface.topology());
        let helper = topology.helper();
        let references = node_references(helper, reference);
        let sphere_radius = surface
            .kind()
            .is_spherical()
            .then(|| surface.spherical_radius());
        let mut crossovers = params
            .divergence_ratio
            .map(|_| surface.crossovers().tile_crossovers);

        for iteration in 1..=params.iterations {
            progress.checkpoint()?;

            let current = surface.coords();
            let step = |i: usize| {
                let node_ref = &references[i];
                if node_ref.edges.len() < 2 {
                    return current[i];
                }
                let mut force = node_force(current, i, node_ref, params);
                if sphere_radius.is_some() {
                    if let Some(radial) = current[i].coords.try_normalize(f32::EPSILON) {
                        force -= radial * radial.dot(&force);
                    }
                }
                let moved = current[i] + force * params.step_size;
                match sphere_radius {
                    Some(radius) => sphere_point(&moved, radius),
                    None => moved,
                }
            };
            let next: Vec<Point3<f32>> = if params.parallel {
                (0..n).into_par_iter().map(&step).collect()
            } else {
                (0..n).map(&step).collect()
            };
            surface.coords_mut().copy_from_slice(&next);
            report.iterations = iteration;

            if let (Some(ratio), Some(before)) = (params.divergence_ratio, crossovers) {
                let after = surface.crossovers().tile_crossovers;
                if after as f32 > ratio * before.max(1) as f32 {
                    report.divergence = Some((before, after));
                    return Ok(report);
                }
                crossovers = Some(after);
            }
            progress.report(iteration, params.iterations, "Morphing");
        }

        trace!("kernel ran {} iterations on {n} nodes", report.iterations);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{grid_surface, icosphere};

    fn reference_of(surface: &Surface) -> Vec<Point3<f32>> {
        surface.coords().to_vec()
    }

    #[test]
    fn test_reference_shape_is_fixed_point() {
        let mut surface = grid_surface(4);
        let reference = reference_of(&surface);
        let params = KernelParameters::default().with_iterations(5);
        ForceKernel
            .morph(&mut surface, &reference, &params, &Progress::none())
            .unwrap();
        assert_eq!(surface.coords(), reference.as_slice());
    }

    #[test]
    fn test_displaced_node_returns() {
        let mut surface = grid_surface(4);
        let reference = reference_of(&surface);
        let home = surface.coord(12);
        surface.set_coord(12, home + Vector3::new(0.3, 0.2, 0.0));
        let before = (surface.coord(12) - home).norm();

        let params = KernelParameters::default().with_iterations(50);
        let report = ForceKernel
            .morph(&mut surface, &reference, &params, &Progress::none())
            .unwrap();
        assert_eq!(report.iterations, 50);
        assert!((surface.coord(12) - home).norm() < 0.5 * before);
    }

    #[test]
    fn test_mean_distance_approaches_reference() {
        let reference_surface = grid_surface(6);
        let reference = reference_of(&reference_surface);
        let target = reference_surface.mean_inter_neighbor_distance();
        let mut surface = reference_surface.clone();
        surface.scale(0.8);

        let params = KernelParameters::default()
            .with_forces(1.0, 0.0, 0.5)
            .with_iterations(1);
        let mut gap = target - surface.mean_inter_neighbor_distance();
        for _ in 0..5 {
            ForceKernel
                .morph(&mut surface, &reference, &params, &Progress::none())
                .unwrap();
            let next = target - surface.mean_inter_neighbor_distance();
            assert!(next <= gap);
            gap = next;
        }
        assert!(gap > 0.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut a = grid_surface(6);
        let reference = reference_of(&a);
        for i in 0..a.num_nodes() {
            let offset = Vector3::new((i as f32 * 0.7).sin() * 0.1, (i as f32 * 1.3).cos() * 0.1, 0.0);
            let p = a.coord(i);
            a.set_coord(i, p + offset);
        }
        let mut b = a.clone();

        let params = KernelParameters::default().with_iterations(10);
        ForceKernel
            .morph(&mut a, &reference, &params, &Progress::none())
            .unwrap();
        ForceKernel
            .morph(&mut b, &reference, &params.clone().sequential(), &Progress::none())
            .unwrap();
        assert_eq!(a.coords(), b.coords());
    }

    #[test]
    fn test_sphere_stays_on_sphere() {
        let mut surface = icosphere(2);
        surface.scale(50.0);
        let mut fiducial = surface.clone();
        for i in 0..fiducial.num_nodes() {
            let p = fiducial.coord(i);
            fiducial.set_coord(i, Point3::new(p.x * 1.3, p.y, p.z * 0.8));
        }

        let params = KernelParameters::default().with_iterations(20);
        ForceKernel
            .morph(&mut surface, fiducial.coords(), &params, &Progress::none())
            .unwrap();
        for p in surface.coords() {
            assert!((p.coords.norm() - 50.0).abs() < 1e-3 * 50.0);
        }
    }

    #[test]
    fn test_mismatched_reference() {
        let mut surface = grid_surface(2);
        let err = ForceKernel
            .morph(
                &mut surface,
                &[Point3::origin(); 4],
                &KernelParameters::default(),
                &Progress::none(),
            )
            .unwrap_err();
        assert!(matches!(err, SurfaceError::NodeCountMismatch { .. }));
    }
}
