//! The spherical level stack.
//!
//! Spherical morphing resamples the input sphere with a hierarchy of
//! standard spheres. Each standard sphere is laid over the input sphere and
//! inherits fiducial positions by barycentric lookup; tables between adjacent
//! levels carry morphed positions from coarse to fine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use nalgebra::Point3;
use rayon::prelude::*;

use crate::algo::projector::{BarycentricProjection, PointProjector, ProjectionHint, ProjectorOptions};
use crate::algo::smooth::{linear_smoothing, SmoothOptions};
use crate::error::{Result, SurfaceError};
use crate::geometry;
use crate::mesh::{sphere_point, Surface, SurfaceKind, Topology, TopologyType};

/// Degrees of rotation per template level, about each axis.
const TEMPLATE_ROTATION: f32 = 0.25;
/// Linear smoothing iterations applied to template nodes that missed the
/// input sphere.
const UNPROJECTED_SMOOTHING: usize = 300;

/// Vertices on the unit sphere and outward-wound faces of an icosahedron
/// subdivided `subdivisions` times.
pub fn subdivided_icosahedron(subdivisions: usize) -> (Vec<Point3<f32>>, Vec<[usize; 3]>) {
    let t = (1.0 + 5.0f32.sqrt()) / 2.0;
    let mut coords: Vec<Point3<f32>> = [
        (-1.0, t, 0.0),
        (1.0, t, 0.0),
        (-1.0, -t, 0.0),
        (1.0, -t, 0.0),
        (0.0, -1.0, t),
        (0.0, 1.0, t),
        (0.0, -1.0, -t),
        (0.0, 1.0, -t),
        (t, 0.0, -1.0),
        (t, 0.0, 1.0),
        (-t, 0.0, -1.0),
        (-t, 0.0, 1.0),
    ]
    .iter()
    .map(|&(x, y, z)| sphere_point(&Point3::new(x, y, z), 1.0))
    .collect();
    let mut faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut next = Vec::with_capacity(faces.len() * 4);
        for &[a, b, c] in &faces {
            let mut mid = |u: usize, v: usize| -> usize {
                let key = if u < v { (u, v) } else { (v, u) };
                *midpoints.entry(key).or_insert_with(|| {
                    let m = nalgebra::center(&coords[u], &coords[v]);
                    coords.push(sphere_point(&m, 1.0));
                    coords.len() - 1
                })
            };
            let ab = mid(a, b);
            let bc = mid(b, c);
            let ca = mid(c, a);
            next.push([a, ab, ca]);
            next.push([b, bc, ab]);
            next.push([c, ca, bc]);
            next.push([ab, bc, ca]);
        }
        faces = next;
    }
    (coords, faces)
}

/// One standard sphere of the hierarchy.
#[derive(Debug, Clone)]
pub struct StandardSphere {
    /// Resolution level; higher is finer.
    pub level: usize,
    /// Node positions.
    pub coords: Vec<Point3<f32>>,
    /// Triangulation.
    pub topology: Arc<Topology>,
}

/// Standard spheres indexed by level, loaded once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct StandardSphereHierarchy {
    spheres: Vec<StandardSphere>,
}

impl StandardSphereHierarchy {
    /// Subdivided icosahedra for levels `1..=max_level`; level `l` is
    /// subdivided `l` times.
    pub fn generate(max_level: usize) -> Self {
        let spheres = (1..=max_level)
            .map(|level| {
                let (coords, faces) = subdivided_icosahedron(level);
                let topology = Topology::new(coords.len(), faces)
                    .map(|t| Arc::new(t.with_type(TopologyType::Closed)));
                (level, coords, topology)
            })
            .filter_map(|(level, coords, topology)| {
                topology.ok().map(|topology| StandardSphere {
                    level,
                    coords,
                    topology,
                })
            })
            .collect();
        Self { spheres }
    }

    /// Read `sphere.<level>.coord` and `sphere.<level>.topo` from `dir` for
    /// levels `1..=max_level`.
    pub fn load(dir: impl AsRef<Path>, max_level: usize) -> Result<Self> {
        let dir = dir.as_ref();
        let mut spheres = Vec::with_capacity(max_level);
        for level in 1..=max_level {
            let topology = Arc::new(crate::io::topo::load(dir.join(format!("sphere.{level}.topo")))?);
            let surface = crate::io::coord::load_surface(
                dir.join(format!("sphere.{level}.coord")),
                Arc::clone(&topology),
                SurfaceKind::Spherical,
            )?;
            spheres.push(StandardSphere {
                level,
                coords: surface.into_coords(),
                topology,
            });
        }
        debug!("loaded {} standard spheres from {}", spheres.len(), dir.display());
        Ok(Self { spheres })
    }

    /// The sphere of a level.
    pub fn sphere(&self, level: usize) -> Option<&StandardSphere> {
        self.spheres.iter().find(|s| s.level == level)
    }

    /// Highest level available.
    pub fn max_level(&self) -> usize {
        self.spheres.iter().map(|s| s.level).max().unwrap_or(0)
    }
}

/// A standard sphere prepared for one morphing cycle.
#[derive(Debug, Clone)]
pub struct SphereLevel {
    /// Standard-sphere level in use.
    pub template: usize,
    /// Fiducial positions synthesized from the input's reference.
    pub reference: Surface,
    /// Spherical positions being morphed.
    pub surface: Surface,
    /// Nodes that missed the input sphere.
    pub unprojected: usize,
}

/// Location of each node of one level on the next coarser level.
pub type DownTable = Vec<Option<BarycentricProjection>>;

/// All standard-sphere levels of a cycle, finest first.
#[derive(Debug, Clone)]
pub struct SphereStack {
    /// `levels[k]` is morphing level `k + 1`.
    pub levels: Vec<SphereLevel>,
    /// `down[0]` maps the input sphere onto `levels[0]`; `down[k]` maps
    /// `levels[k - 1]` onto `levels[k]`.
    pub down: Vec<DownTable>,
}

/// Lay standard spheres over `morphing` (a sphere) for morphing levels
/// `1..num_levels`.
///
/// Level `k` uses template `num_levels - k`, so the coarsest level uses
/// template 1. `reference` supplies fiducial positions.
pub fn build_sphere_stack(
    morphing: &Surface,
    reference: &Surface,
    hierarchy: &StandardSphereHierarchy,
    num_levels: usize,
    parallel: bool,
) -> Result<SphereStack> {
    let radius = morphing.spherical_radius();
    let center = reference.center_of_mass();
    let projector = PointProjector::new(morphing, ProjectionHint::Sphere, ProjectorOptions::default());

    let mut levels = Vec::with_capacity(num_levels.saturating_sub(1));
    for depth in 1..num_levels {
        let template = num_levels - depth;
        let sphere = hierarchy.sphere(template).ok_or_else(|| SurfaceError::SubsampleFailed {
            level: depth,
            reason: format!("no standard sphere at level {template}"),
        })?;
        if sphere.coords.len() < 3 {
            return Err(SurfaceError::SubsampleFailed {
                level: depth,
                reason: format!("standard sphere {template} has {} nodes", sphere.coords.len()),
            });
        }

        let mut surface = Surface::new(
            SurfaceKind::Spherical,
            sphere.coords.clone(),
            Arc::clone(&sphere.topology),
        )?
        .with_structure(morphing.structure());
        surface.convert_to_sphere_with_radius(radius);
        surface.apply_rotation(&geometry::rotation_xyz_degrees(TEMPLATE_ROTATION * template as f32));

        let project = |p: &Point3<f32>| projector.project_barycentric(p, true);
        let hits: Vec<BarycentricProjection> = if parallel {
            surface.coords().par_iter().map(project).collect::<Result<_>>()?
        } else {
            surface.coords().iter().map(project).collect::<Result<_>>()?
        };

        let missed: Vec<bool> = hits.iter().map(|h| !h.is_projected()).collect();
        let unprojected = missed.iter().filter(|&&m| m).count();
        let fiducial_coords = hits
            .iter()
            .map(|h| {
                if h.is_projected() {
                    h.unproject(reference.coords())
                } else {
                    center
                }
            })
            .collect();
        let mut fiducial = Surface::new(
            SurfaceKind::Fiducial,
            fiducial_coords,
            Arc::clone(&sphere.topology),
        )?;
        if unprojected > 0 {
            warn!("standard sphere {template}: {unprojected} nodes missed the input sphere");
            let opts = SmoothOptions::default()
                .with_iterations(UNPROJECTED_SMOOTHING)
                .with_parallel(parallel);
            linear_smoothing(&mut fiducial, &opts, Some(missed.as_slice()))?;
        }

        debug!(
            "sphere level {depth}: template {template}, {} nodes",
            surface.num_nodes()
        );
        levels.push(SphereLevel {
            template,
            reference: fiducial,
            surface,
            unprojected,
        });
    }

    let mut down = Vec::with_capacity(levels.len());
    for k in 0..levels.len() {
        let finer = if k == 0 { morphing } else { &levels[k - 1].surface };
        down.push(down_table(finer, &levels[k].surface, parallel));
    }
    Ok(SphereStack { levels, down })
}

/// Locate each connected node of `finer` on `coarser`.
fn down_table(finer: &Surface, coarser: &Surface, parallel: bool) -> DownTable {
    let projector = PointProjector::new(coarser, ProjectionHint::Sphere, ProjectorOptions::default());
    let helper = finer.helper();
    let locate = |(i, p): (usize, &Point3<f32>)| {
        if helper.has_neighbors(i) {
            projector.project_barycentric(p, true).ok()
        } else {
            None
        }
    };
    if parallel {
        finer.coords().par_iter().enumerate().map(locate).collect()
    } else {
        finer.coords().iter().enumerate().map(locate).collect()
    }
}

/// Move `finer` to the positions its down table points at on the morphed
/// `coarser` sphere, then push it back onto its own sphere.
///
/// `coarser` is first rescaled to `finer`'s radius. Nodes without a table
/// entry keep their position.
pub fn spherical_upsample(coarser: &mut Surface, finer: &mut Surface, table: &DownTable) -> Result<()> {
    if table.len() != finer.num_nodes() {
        return Err(SurfaceError::NodeCountMismatch {
            coords: table.len(),
            topology: finer.num_nodes(),
        });
    }
    let radius = finer.spherical_radius();
    coarser.convert_to_sphere_with_radius(radius);
    let coords = finer
        .coords()
        .iter()
        .zip(table)
        .map(|(p, entry)| entry.map_or(*p, |hit| hit.unproject(coarser.coords())))
        .collect();
    finer.set_coords(coords)?;
    finer.convert_to_sphere_with_radius(radius);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::icosphere;

    #[test]
    fn test_icosahedron_counts() {
        let (coords, faces) = subdivided_icosahedron(2);
        assert_eq!(coords.len(), 162);
        assert_eq!(faces.len(), 320);
        for p in &coords {
            assert!((p.coords.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_generated_hierarchy() {
        let hierarchy = StandardSphereHierarchy::generate(3);
        assert_eq!(hierarchy.max_level(), 3);
        assert_eq!(hierarchy.sphere(1).unwrap().coords.len(), 42);
        assert_eq!(hierarchy.sphere(3).unwrap().coords.len(), 642);
        assert!(hierarchy.sphere(4).is_none());
    }

    #[test]
    fn test_stack_synthesizes_fiducials() {
        let mut morphing = icosphere(3);
        morphing.scale(10.0);
        // Reference is the same sphere stretched along x
        let mut reference = morphing.clone();
        reference.set_kind(SurfaceKind::Fiducial);
        for p in reference.coords_mut() {
            p.x *= 2.0;
        }

        let hierarchy = StandardSphereHierarchy::generate(2);
        let stack = build_sphere_stack(&morphing, &reference, &hierarchy, 3, true).unwrap();
        assert_eq!(stack.levels.len(), 2);
        assert_eq!(stack.levels[0].template, 2);
        assert_eq!(stack.levels[1].template, 1);
        assert_eq!(stack.down.len(), 2);
        assert_eq!(stack.down[0].len(), morphing.num_nodes());
        assert_eq!(stack.down[1].len(), 162);

        for level in &stack.levels {
            assert_eq!(level.unprojected, 0);
            for (s, f) in level.surface.coords().iter().zip(level.reference.coords()) {
                assert!((s.coords.norm() - 10.0).abs() < 1e-3);
                // The stretched fiducial sits near twice the sphere's x
                assert!((f.x - 2.0 * s.x).abs() < 0.5);
            }
        }
    }

    #[test]
    fn test_missing_template() {
        let morphing = icosphere(1);
        let hierarchy = StandardSphereHierarchy::generate(1);
        let err = build_sphere_stack(&morphing, &morphing, &hierarchy, 3, false).unwrap_err();
        assert!(matches!(err, SurfaceError::SubsampleFailed { level: 1, .. }));
    }

    #[test]
    fn test_upsample_identity() {
        let mut fine = icosphere(2);
        let coarse_template = icosphere(1);
        let table = down_table(&fine, &coarse_template, false);
        assert!(table.iter().all(Option::is_some));

        let before = fine.coords().to_vec();
        let mut coarse = coarse_template.clone();
        spherical_upsample(&mut coarse, &mut fine, &table).unwrap();
        // Points come back on the chords of the coarse tiles, then onto the sphere
        for (p, q) in fine.coords().iter().zip(&before) {
            assert!((p - q).norm() < 1e-3);
        }
    }
}
