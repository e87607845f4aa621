//! Surface smoothing.
//!
//! # Algorithms
//!
//! - [`areal_smoothing`]: moves each node toward the area-weighted mean of the
//!   centroids of its ring tiles
//! - [`linear_smoothing`]: moves each node toward the mean of its neighbors
//! - [`smooth_out_crossovers`]: repeated masked areal smoothing around folded
//!   tiles
//! - [`smooth_out_flat_overlap`]: untangles boundary nodes of a flat surface
//!   that landed on top of other tiles
//!
//! Every iteration is a Jacobi update: new positions are computed from the
//! previous iteration only, so the parallel and sequential paths agree.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sulcus::algo::smooth::{linear_smoothing, SmoothOptions};
//! use sulcus::mesh::{Surface, SurfaceKind, Topology};
//! use nalgebra::Point3;
//!
//! // A fan of four triangles around node 0
//! let coords = vec![
//!     Point3::new(0.3, 0.2, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(-1.0, 0.0, 0.0),
//!     Point3::new(0.0, -1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 1]];
//! let topology = Arc::new(Topology::new(5, faces).unwrap());
//! let mut surface = Surface::new(SurfaceKind::Flat, coords, topology).unwrap();
//!
//! linear_smoothing(&mut surface, &SmoothOptions::default(), None).unwrap();
//! assert!(surface.coord(0).coords.norm() < 1e-6);
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;
use nalgebra::Point3;
use rayon::prelude::*;

use crate::error::{Result, SurfaceError};
use crate::geometry;
use crate::mesh::{sphere_point, CrossoverMethod, Surface, TopologyHelper};

use super::projector::PointIndex;
use super::Progress;

/// Options for [`areal_smoothing`] and [`linear_smoothing`].
#[derive(Debug, Clone)]
pub struct SmoothOptions {
    /// Blend factor toward the smoothed position (0.0 to 1.0).
    pub strength: f32,

    /// Number of iterations.
    pub iterations: usize,

    /// Boundary nodes move only on iterations divisible by this. Zero keeps
    /// them fixed.
    pub smooth_edges_every: usize,

    /// Push nodes back onto the sphere on iterations divisible by this.
    /// Zero disables it. Ignored unless the surface is spherical.
    pub project_to_sphere_every: usize,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            strength: 1.0,
            iterations: 1,
            smooth_edges_every: 0,
            project_to_sphere_every: 0,
            parallel: true,
        }
    }
}

impl SmoothOptions {
    /// Set the strength.
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }

    /// Set the number of iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set how often boundary nodes are smoothed.
    pub fn with_smooth_edges_every(mut self, every: usize) -> Self {
        self.smooth_edges_every = every;
        self
    }

    /// Set how often nodes are pushed back onto the sphere.
    pub fn with_project_to_sphere_every(mut self, every: usize) -> Self {
        self.project_to_sphere_every = every;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Options for [`smooth_out_crossovers`].
#[derive(Debug, Clone)]
pub struct CrossoverSmoothOptions {
    /// Areal smoothing applied in each cycle.
    pub smoothing: SmoothOptions,

    /// Maximum number of detect-and-smooth cycles.
    pub cycles: usize,

    /// Rings of neighbors around each crossover node that are smoothed too.
    pub neighbor_depth: usize,
}

impl Default for CrossoverSmoothOptions {
    fn default() -> Self {
        Self {
            smoothing: SmoothOptions::default()
                .with_iterations(50)
                .with_smooth_edges_every(10),
            cycles: 10,
            neighbor_depth: 5,
        }
    }
}

impl CrossoverSmoothOptions {
    /// Build from the six-number schedule used by the morphing driver:
    /// strength, cycles, iterations, edge interval, sphere interval, depth.
    pub fn from_schedule(
        strength: f32,
        cycles: usize,
        iterations: usize,
        smooth_edges_every: usize,
        project_to_sphere_every: usize,
        neighbor_depth: usize,
    ) -> Self {
        Self {
            smoothing: SmoothOptions::default()
                .with_strength(strength)
                .with_iterations(iterations)
                .with_smooth_edges_every(smooth_edges_every)
                .with_project_to_sphere_every(project_to_sphere_every),
            cycles,
            neighbor_depth,
        }
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.smoothing.parallel = parallel;
        self
    }
}

/// Options for [`smooth_out_flat_overlap`].
#[derive(Debug, Clone)]
pub struct OverlapSmoothOptions {
    /// Linear smoothing applied in each cycle.
    pub smoothing: SmoothOptions,

    /// Maximum number of detect-and-smooth cycles.
    pub cycles: usize,

    /// Rings of neighbors around each overlapping node that are smoothed too.
    pub neighbor_depth: usize,
}

impl Default for OverlapSmoothOptions {
    fn default() -> Self {
        Self {
            smoothing: SmoothOptions::default()
                .with_strength(0.5)
                .with_iterations(50)
                .with_smooth_edges_every(10),
            cycles: 5,
            neighbor_depth: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    Areal,
    Linear,
}

/// Areal smoothing, optionally limited to nodes whose `mask` entry is true.
pub fn areal_smoothing(
    surface: &mut Surface,
    options: &SmoothOptions,
    mask: Option<&[bool]>,
) -> Result<()> {
    smooth_impl(surface, options, mask, Rule::Areal, &Progress::none())
}

/// [`areal_smoothing`] with progress reporting and cancellation.
pub fn areal_smoothing_with_progress(
    surface: &mut Surface,
    options: &SmoothOptions,
    mask: Option<&[bool]>,
    progress: &Progress,
) -> Result<()> {
    smooth_impl(surface, options, mask, Rule::Areal, progress)
}

/// Linear smoothing, optionally limited to nodes whose `mask` entry is true.
pub fn linear_smoothing(
    surface: &mut Surface,
    options: &SmoothOptions,
    mask: Option<&[bool]>,
) -> Result<()> {
    smooth_impl(surface, options, mask, Rule::Linear, &Progress::none())
}

/// [`linear_smoothing`] with progress reporting and cancellation.
pub fn linear_smoothing_with_progress(
    surface: &mut Surface,
    options: &SmoothOptions,
    mask: Option<&[bool]>,
    progress: &Progress,
) -> Result<()> {
    smooth_impl(surface, options, mask, Rule::Linear, progress)
}

fn smooth_impl(
    surface: &mut Surface,
    options: &SmoothOptions,
    mask: Option<&[bool]>,
    rule: Rule,
    progress: &Progress,
) -> Result<()> {
    let n = surface.num_nodes();
    if let Some(mask) = mask {
        if mask.len() != n {
            return Err(SurfaceError::NodeCountMismatch {
                coords: mask.len(),
                topology: n,
            });
        }
    }
    if options.iterations == 0 || options.strength == 0.0 {
        return Ok(());
    }

    let topology = Arc::clone(surface.topology());
    let helper = topology.helper();
    let sphere_radius = (options.project_to_sphere_every > 0 && surface.kind().is_spherical())
        .then(|| surface.spherical_radius());
    let strength = options.strength;
    let label = match rule {
        Rule::Areal => "Areal smoothing",
        Rule::Linear => "Linear smoothing",
    };

    let mut coords = surface.coords().to_vec();
    // Counted from 1 so the interval checks skip the first iteration
    for k in 1..=options.iterations {
        progress.checkpoint()?;
        let smooth_edges = options.smooth_edges_every > 0 && k % options.smooth_edges_every == 0;

        let current = &coords;
        let step = |i: usize| {
            let movable = (smooth_edges || !helper.is_boundary_node(i))
                && mask.map_or(true, |m| m[i]);
            if !movable {
                return current[i];
            }
            let target = match rule {
                Rule::Areal => areal_target(current, helper, i),
                Rule::Linear => linear_target(current, helper, i),
            };
            match target {
                Some(t) => current[i] + (t - current[i]) * strength,
                None => current[i],
            }
        };
        let mut next: Vec<Point3<f32>> = if options.parallel {
            (0..n).into_par_iter().map(&step).collect()
        } else {
            (0..n).map(&step).collect()
        };

        if let Some(radius) = sphere_radius {
            if k % options.project_to_sphere_every == 0 {
                for p in &mut next {
                    *p = sphere_point(p, radius);
                }
            }
        }

        coords = next;
        progress.report(k, options.iterations, label);
    }

    surface.coords_mut().copy_from_slice(&coords);
    Ok(())
}

/// Area-weighted mean of the centroids of the tiles around `node`.
fn areal_target(coords: &[Point3<f32>], helper: &TopologyHelper, node: usize) -> Option<Point3<f32>> {
    if helper.num_neighbors(node) < 2 {
        return None;
    }
    let p = coords[node];
    let mut total = 0.0f32;
    let mut weighted = nalgebra::Vector3::<f32>::zeros();
    for &(a, b) in &helper.ring(node).pairs {
        let area = geometry::triangle_area(&p, &coords[a], &coords[b]);
        if area > 0.0 {
            total += area;
            weighted += geometry::triangle_centroid(&p, &coords[a], &coords[b]).coords * area;
        }
    }
    if total > 0.0 {
        Some(Point3::from(weighted / total))
    } else {
        None
    }
}

/// Mean position of the neighbors of `node`.
fn linear_target(coords: &[Point3<f32>], helper: &TopologyHelper, node: usize) -> Option<Point3<f32>> {
    let neighbors = helper.neighbors(node);
    if neighbors.is_empty() {
        return None;
    }
    let sum = neighbors
        .iter()
        .fold(nalgebra::Vector3::<f32>::zeros(), |acc, &m| acc + coords[m].coords);
    Some(Point3::from(sum / neighbors.len() as f32))
}

/// Grow `flags` by `depth` rings of neighbors.
pub fn mark_neighbors_to_depth(helper: &TopologyHelper, flags: &mut [bool], depth: usize) {
    for _ in 0..depth {
        let grown: Vec<usize> = (0..flags.len())
            .filter(|&i| !flags[i] && helper.neighbors(i).iter().any(|&m| flags[m]))
            .collect();
        if grown.is_empty() {
            break;
        }
        for i in grown {
            flags[i] = true;
        }
    }
}

/// Smooth the neighborhoods of folded tiles until none remain or the cycle
/// budget runs out. Returns the number of crossover nodes left.
pub fn smooth_out_crossovers(
    surface: &mut Surface,
    options: &CrossoverSmoothOptions,
    method: CrossoverMethod,
) -> Result<usize> {
    smooth_out_crossovers_with_progress(surface, options, method, &Progress::none())
}

/// [`smooth_out_crossovers`] with progress reporting and cancellation.
pub fn smooth_out_crossovers_with_progress(
    surface: &mut Surface,
    options: &CrossoverSmoothOptions,
    method: CrossoverMethod,
    progress: &Progress,
) -> Result<usize> {
    let topology = Arc::clone(surface.topology());
    for cycle in 0..options.cycles {
        let report = surface.crossover_check(method);
        if report.node_crossovers == 0 {
            return Ok(0);
        }
        let mut flags = report.node_flags;
        mark_neighbors_to_depth(topology.helper(), &mut flags, options.neighbor_depth);
        debug!(
            "crossover smoothing cycle {cycle}: {} crossover nodes, smoothing {}",
            report.node_crossovers,
            flags.iter().filter(|&&f| f).count()
        );
        areal_smoothing_with_progress(surface, &options.smoothing, Some(flags.as_slice()), progress)?;
        progress.report(cycle + 1, options.cycles, "Crossover smoothing");
    }
    Ok(surface.crossover_check(method).node_crossovers)
}

/// Find boundary nodes of a flat surface that lie inside a tile they do not
/// belong to, and smooth them out with their neighborhood.
///
/// Returns whether any smoothing was done.
pub fn smooth_out_flat_overlap(surface: &mut Surface, options: &OverlapSmoothOptions) -> Result<bool> {
    if !surface.kind().is_flat() {
        return Err(SurfaceError::InvalidArgument(format!(
            "overlap smoothing needs a flat surface, got {}",
            surface.kind()
        )));
    }
    let topology = Arc::clone(surface.topology());
    let helper = topology.helper();
    if topology.num_triangles() == 0 {
        return Ok(false);
    }
    let search_radius = surface.mean_inter_neighbor_distance() * 3.0;

    let mut smoothed = false;
    for cycle in 0..options.cycles {
        let mut flags = overlapping_boundary_nodes(surface, helper, search_radius);
        let found = flags.iter().filter(|&&f| f).count();
        if found == 0 {
            break;
        }
        mark_neighbors_to_depth(helper, &mut flags, options.neighbor_depth);
        debug!("overlap smoothing cycle {cycle}: {found} overlapping boundary nodes");
        linear_smoothing(surface, &options.smoothing, Some(flags.as_slice()))?;
        smoothed = true;
    }
    Ok(smoothed)
}

fn overlapping_boundary_nodes(
    surface: &Surface,
    helper: &TopologyHelper,
    search_radius: f32,
) -> Vec<bool> {
    let coords = surface.coords();
    let triangles = surface.topology().triangles();
    let index = PointIndex::new(coords.iter().copied().enumerate());

    let mut flags = vec![false; coords.len()];
    for node in 0..coords.len() {
        if !helper.is_boundary_node(node) {
            continue;
        }
        let p = coords[node];
        let tiles: BTreeSet<usize> = index
            .within_radius(&p, search_radius)
            .into_iter()
            .filter(|&m| m != node)
            .flat_map(|m| helper.node_tiles(m).iter().copied())
            .collect();
        flags[node] = tiles.into_iter().any(|t| {
            let [a, b, c] = triangles[t];
            if a == node || b == node || c == node {
                return false;
            }
            geometry::signed_triangle_area_2d(&coords[a], &coords[b], &p) > 0.0
                && geometry::signed_triangle_area_2d(&coords[b], &coords[c], &p) > 0.0
                && geometry::signed_triangle_area_2d(&coords[c], &coords[a], &p) > 0.0
        });
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{grid_surface, icosphere};
    use crate::mesh::SurfaceKind;

    #[test]
    fn test_linear_smoothing_centers_node() {
        let mut surface = grid_surface(2);
        surface.set_coord(4, Point3::new(1.3, 1.2, 0.5));
        linear_smoothing(&mut surface, &SmoothOptions::default(), None).unwrap();
        assert!((surface.coord(4) - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-6);
        // Boundary nodes stay put
        assert_eq!(surface.coord(0), Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_areal_smoothing_pulls_toward_plane() {
        let mut surface = grid_surface(2);
        surface.set_coord(4, Point3::new(1.0, 1.0, 0.6));
        areal_smoothing(&mut surface, &SmoothOptions::default().sequential(), None).unwrap();

        let p = surface.coord(4);
        assert!((p.x - 1.0).abs() < 1e-5);
        assert!((p.y - 1.0).abs() < 1e-5);
        assert!((p.z - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut a = grid_surface(5);
        for (i, p) in a.coords_mut().iter_mut().enumerate() {
            p.z = ((i * 7) % 5) as f32 * 0.1;
        }
        let mut b = a.clone();
        let opts = SmoothOptions::default()
            .with_strength(0.7)
            .with_iterations(5)
            .with_smooth_edges_every(2);
        areal_smoothing(&mut a, &opts, None).unwrap();
        areal_smoothing(&mut b, &opts.clone().sequential(), None).unwrap();
        assert_eq!(a.coords(), b.coords());
    }

    #[test]
    fn test_mask_limits_smoothing() {
        let mut surface = grid_surface(3);
        surface.set_coord(5, Point3::new(1.0, 1.0, 1.0));
        surface.set_coord(10, Point3::new(2.0, 2.0, 1.0));
        let mut mask = vec![false; 16];
        mask[5] = true;
        linear_smoothing(&mut surface, &SmoothOptions::default(), Some(mask.as_slice())).unwrap();
        assert!(surface.coord(5).z < 1.0);
        assert_eq!(surface.coord(10).z, 1.0);

        assert!(linear_smoothing(&mut surface, &SmoothOptions::default(), Some(&[true][..])).is_err());
    }

    #[test]
    fn test_sphere_projection_keeps_radius() {
        let mut sphere = icosphere(2);
        let opts = SmoothOptions::default()
            .with_iterations(4)
            .with_project_to_sphere_every(2);
        areal_smoothing(&mut sphere, &opts, None).unwrap();
        for p in sphere.coords() {
            assert!((p.coords.norm() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_mark_neighbors_to_depth() {
        let surface = grid_surface(4);
        let mut flags = vec![false; 25];
        flags[0] = true;
        mark_neighbors_to_depth(surface.helper(), &mut flags, 1);
        let marked: Vec<usize> = (0..25).filter(|&i| flags[i]).collect();
        assert_eq!(marked, vec![0, 1, 5, 6]);
    }

    #[test]
    fn test_smooth_out_crossovers() {
        let mut surface = grid_surface(6);
        surface.set_coord(24, Point3::new(4.6, 3.4, 0.0));
        assert!(surface.crossovers().node_crossovers > 0);

        let opts = CrossoverSmoothOptions::from_schedule(1.0, 10, 50, 0, 0, 3);
        let left = smooth_out_crossovers(&mut surface, &opts, CrossoverMethod::Flat).unwrap();
        assert_eq!(left, 0);
        assert_eq!(surface.crossovers().tile_crossovers, 0);
    }

    #[test]
    fn test_flat_overlap() {
        let mut clean = grid_surface(4);
        assert!(!smooth_out_flat_overlap(&mut clean, &OverlapSmoothOptions::default()).unwrap());

        let mut surface = grid_surface(4);
        let before = Point3::new(2.2, 1.3, 0.0);
        surface.set_coord(2, before);
        assert!(smooth_out_flat_overlap(&mut surface, &OverlapSmoothOptions::default()).unwrap());
        assert_ne!(surface.coord(2), before);

        let mut fiducial = grid_surface(2);
        fiducial.set_kind(SurfaceKind::Fiducial);
        assert!(smooth_out_flat_overlap(&mut fiducial, &OverlapSmoothOptions::default()).is_err());
    }
}
