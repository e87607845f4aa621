//! Hexagonal resampling of a flat surface.
//!
//! A parallelogram of equilateral triangles is laid over the flat map. Grid
//! triangles touching the map are kept, and each kept grid node gets a
//! fiducial position by barycentric lookup in the input flat surface.

use std::sync::Arc;

use log::debug;
use nalgebra::Point3;
use rayon::prelude::*;

use crate::algo::projector::{BarycentricProjection, PointProjector, ProjectionHint, ProjectorOptions};
use crate::error::{Result, SurfaceError};
use crate::mesh::{Surface, SurfaceKind, Topology};

const SQRT_3: f32 = 1.732_050_8;

/// Extra grid columns on each side of the bounding box.
const COLUMN_MARGIN: f32 = 20.0;
/// Extra grid rows above and below the bounding box.
const ROW_MARGIN: f32 = 2.0;

/// Lattice position of a grid node: the node sits at
/// `((col + row / 2) * s, row * s * √3 / 2)` for spacing `s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridIndex {
    /// Lattice row.
    pub row: i32,
    /// Lattice column.
    pub col: i32,
}

/// Options for [`hex_subsample`].
#[derive(Debug, Clone)]
pub struct HexSubsampleOptions {
    /// Desired number of grid triangles. `None` uses 30% of the input's
    /// triangle count.
    pub target_tiles: Option<usize>,
    /// Projector settings for both lookups.
    pub projector: ProjectorOptions,
    /// Use parallel execution.
    pub parallel: bool,
}

impl Default for HexSubsampleOptions {
    fn default() -> Self {
        Self {
            target_tiles: None,
            projector: ProjectorOptions::default(),
            parallel: true,
        }
    }
}

impl HexSubsampleOptions {
    /// Set the target triangle count.
    pub fn with_target_tiles(mut self, tiles: usize) -> Self {
        self.target_tiles = Some(tiles);
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Output of [`hex_subsample`].
#[derive(Debug, Clone)]
pub struct HexSubsample {
    /// Grid node positions in the plane.
    pub flat: Surface,
    /// Grid node positions carried onto the fiducial surface.
    pub fiducial: Surface,
    /// Lattice position of every grid node.
    pub grid: Vec<GridIndex>,
    /// For every input node, its location in the grid triangulation.
    pub upsample: Vec<BarycentricProjection>,
    /// Grid spacing used.
    pub spacing: f32,
    /// Grid nodes that fell back to the nearest input node.
    pub fallbacks: usize,
}

/// Resample `flat` with an equilateral grid.
///
/// `fiducial` and `flat` must share a node count. The target triangle count
/// is clamped to the input's, and halved until the grid has no more nodes
/// than the input.
///
/// # Errors
///
/// [`SurfaceError::SubsampleFailed`] when the grid does not touch the
/// surface or the input has no area.
pub fn hex_subsample(
    fiducial: &Surface,
    flat: &Surface,
    options: &HexSubsampleOptions,
) -> Result<HexSubsample> {
    if fiducial.num_nodes() != flat.num_nodes() {
        return Err(SurfaceError::NodeCountMismatch {
            coords: fiducial.num_nodes(),
            topology: flat.num_nodes(),
        });
    }
    let input_tiles = flat.topology().num_triangles();
    let mut target = options
        .target_tiles
        .unwrap_or((input_tiles as f32 * 0.3) as usize)
        .min(input_tiles);
    if target == 0 {
        return Err(SurfaceError::SubsampleFailed {
            level: 1,
            reason: "target triangle count is zero".into(),
        });
    }

    let projector = PointProjector::new(flat, ProjectionHint::Flat, options.projector.clone());
    loop {
        let sample = build_grid(fiducial, flat, &projector, target, options)?;
        if sample.flat.num_nodes() <= flat.num_nodes() || target <= 2 {
            debug!(
                "hex subsample: {} nodes, {} tiles, spacing {:.3}, {} fallbacks",
                sample.flat.num_nodes(),
                sample.flat.topology().num_triangles(),
                sample.spacing,
                sample.fallbacks
            );
            return Ok(sample);
        }
        target /= 2;
    }
}

fn build_grid(
    fiducial: &Surface,
    flat: &Surface,
    projector: &PointProjector,
    target: usize,
    options: &HexSubsampleOptions,
) -> Result<HexSubsample> {
    let area = flat.surface_area();
    if area <= 0.0 || !area.is_finite() {
        return Err(SurfaceError::SubsampleFailed {
            level: 1,
            reason: format!("flat surface has area {area}"),
        });
    }
    let spacing = (4.0 * area / (SQRT_3 * target as f32)).sqrt();
    let bounds = flat.bounds();
    let row_min = ((bounds.min.y * (2.0 / SQRT_3)) / spacing - ROW_MARGIN).floor() as i32;
    let row_max = ((bounds.max.y * (2.0 / SQRT_3)) / spacing + ROW_MARGIN).ceil() as i32;
    // Row r is shifted right by r / 2 columns, so the column range must
    // reach the box from both the lowest and the highest row.
    let col_min = (bounds.min.x / spacing - row_max as f32 / 2.0 - COLUMN_MARGIN).floor() as i32;
    let col_max = (bounds.max.x / spacing - row_min as f32 / 2.0 + COLUMN_MARGIN).ceil() as i32;
    let stride = (col_max - col_min) as usize;
    let rows = (row_max - row_min) as usize;

    let mut grid = Vec::with_capacity(stride * rows);
    for row in row_min..row_max {
        for col in col_min..col_max {
            grid.push(GridIndex { row, col });
        }
    }
    let position = |g: &GridIndex| {
        Point3::new(
            (g.col as f32 + g.row as f32 / 2.0) * spacing,
            g.row as f32 * spacing * SQRT_3 / 2.0,
            0.0,
        )
    };

    let project = |g: &GridIndex| projector.project_barycentric(&position(g), true);
    let hits: Vec<BarycentricProjection> = if options.parallel {
        grid.par_iter().map(project).collect::<Result<_>>()?
    } else {
        grid.iter().map(project).collect::<Result<_>>()?
    };

    let inside = |i: usize| hits[i].is_projected();
    let mut used = vec![false; grid.len()];
    let mut triangles = Vec::new();
    for j in 0..rows.saturating_sub(1) {
        for i in 0..stride {
            let node = j * stride + i;
            let above = node + stride;
            if i > 0 {
                let tri = [node, above, above - 1];
                if tri.iter().any(|&n| inside(n)) {
                    triangles.push(tri);
                }
            }
            if i + 1 < stride {
                let tri = [node, node + 1, above];
                if tri.iter().any(|&n| inside(n)) {
                    triangles.push(tri);
                }
            }
        }
    }
    for tri in &triangles {
        for &n in tri {
            used[n] = true;
        }
    }

    let mut remap = vec![usize::MAX; grid.len()];
    let mut kept_grid = Vec::new();
    let mut flat_coords = Vec::new();
    let mut fiducial_coords = Vec::new();
    let mut fallbacks = 0;
    for (i, g) in grid.iter().enumerate() {
        if !used[i] {
            continue;
        }
        remap[i] = kept_grid.len();
        let p = position(g);
        let hit = if hits[i].is_projected() {
            hits[i]
        } else {
            projector.project_barycentric_best_tile_2d(&p)?
        };
        if !hit.is_projected() {
            fallbacks += 1;
        }
        kept_grid.push(*g);
        flat_coords.push(p);
        fiducial_coords.push(hit.unproject(fiducial.coords()));
    }

    if triangles.is_empty() || kept_grid.len() < 3 {
        return Err(SurfaceError::SubsampleFailed {
            level: 1,
            reason: format!(
                "grid with spacing {spacing} retained {} nodes and {} tiles",
                kept_grid.len(),
                triangles.len()
            ),
        });
    }
    for tri in &mut triangles {
        *tri = tri.map(|n| remap[n]);
    }

    let topology = Arc::new(
        Topology::new(kept_grid.len(), triangles)?.with_type(flat.topology().topology_type()),
    );
    let flat_grid = Surface::new(SurfaceKind::Flat, flat_coords, Arc::clone(&topology))?
        .with_structure(flat.structure());
    let fiducial_grid = Surface::new(SurfaceKind::Fiducial, fiducial_coords, topology)?
        .with_structure(fiducial.structure());

    let grid_projector =
        PointProjector::new(&flat_grid, ProjectionHint::Flat, options.projector.clone());
    let upsample: Vec<BarycentricProjection> = flat
        .coords()
        .iter()
        .map(|p| grid_projector.project_barycentric_best_tile_2d(p))
        .collect::<Result<_>>()?;

    Ok(HexSubsample {
        flat: flat_grid,
        fiducial: fiducial_grid,
        grid: kept_grid,
        upsample,
        spacing,
        fallbacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;
    use crate::mesh::fixtures::grid_surface;
    use nalgebra::Vector3;

    fn bumpy_pair(n: usize) -> (Surface, Surface) {
        let flat = grid_surface(n);
        let mut fiducial = flat.clone();
        fiducial.set_kind(SurfaceKind::Fiducial);
        for i in 0..fiducial.num_nodes() {
            let p = fiducial.coord(i);
            fiducial.set_coord(i, Point3::new(p.x, p.y, 0.1 * p.x * p.y));
        }
        (fiducial, flat)
    }

    #[test]
    fn test_grid_covers_surface() {
        let (fiducial, flat) = bumpy_pair(10);
        let sample = hex_subsample(&fiducial, &flat, &HexSubsampleOptions::default()).unwrap();

        let n = sample.flat.num_nodes();
        assert!(n >= 3 && n <= flat.num_nodes());
        assert_eq!(sample.grid.len(), n);
        assert_eq!(sample.fallbacks, 0);

        // Lattice rows and columns reproduce the positions
        for (g, p) in sample.grid.iter().zip(sample.flat.coords()) {
            let x = (g.col as f32 + g.row as f32 / 2.0) * sample.spacing;
            assert!((p.x - x).abs() < 1e-3);
        }

        let coords = sample.flat.coords();
        for &[a, b, c] in sample.flat.topology().triangles() {
            assert!(geometry::signed_triangle_area_2d(&coords[a], &coords[b], &coords[c]) > 0.0);
        }

        // The fiducial of a planar map keeps x and y
        for (f, p) in sample.fiducial.coords().iter().zip(sample.flat.coords()) {
            assert!((f.x - p.x).abs() < 1e-3 && (f.y - p.y).abs() < 1e-3);
        }

        // Every input node can be recovered from the grid
        for (hit, p) in sample.upsample.iter().zip(flat.coords()) {
            assert!(hit.is_projected());
            let q = hit.unproject(sample.flat.coords());
            assert!((q - p).norm() < 1e-3);
        }
    }

    #[test]
    fn test_grid_follows_off_center_map() {
        let (mut fiducial, mut flat) = bumpy_pair(10);
        let offset = Vector3::new(-40.0, 100.0, 0.0);
        flat.translate(&offset);
        fiducial.translate(&offset);
        let sample = hex_subsample(&fiducial, &flat, &HexSubsampleOptions::default()).unwrap();

        assert!(sample.flat.num_nodes() >= 3);
        assert_eq!(sample.fallbacks, 0);
        for (hit, p) in sample.upsample.iter().zip(flat.coords()) {
            assert!(hit.is_projected());
            let q = hit.unproject(sample.flat.coords());
            assert!((q - p).norm() < 1e-3);
        }
    }

    #[test]
    fn test_never_upsamples() {
        let (fiducial, flat) = bumpy_pair(10);
        let opts = HexSubsampleOptions::default().with_target_tiles(10_000);
        let sample = hex_subsample(&fiducial, &flat, &opts).unwrap();
        assert!(sample.flat.num_nodes() <= flat.num_nodes());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (fiducial, flat) = bumpy_pair(8);
        let a = hex_subsample(&fiducial, &flat, &HexSubsampleOptions::default()).unwrap();
        let b = hex_subsample(
            &fiducial,
            &flat,
            &HexSubsampleOptions::default().with_parallel(false),
        )
        .unwrap();
        assert_eq!(a.flat.coords(), b.flat.coords());
        assert_eq!(a.fiducial.coords(), b.fiducial.coords());
        assert_eq!(a.flat.topology().triangles(), b.flat.topology().triangles());
    }

    #[test]
    fn test_mismatched_inputs() {
        let (fiducial, _) = bumpy_pair(4);
        let flat = grid_surface(3);
        assert!(hex_subsample(&fiducial, &flat, &HexSubsampleOptions::default()).is_err());
    }
}
