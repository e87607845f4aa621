//! The flat level stack.
//!
//! Level 1 is a hexagonal resampling of the input. Each further level keeps
//! the grid nodes of the previous one whose row and column are both even,
//! which doubles the spacing and keeps the grid equilateral.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use nalgebra::Point3;

use crate::algo::projector::{BarycentricProjection, PointProjector, ProjectionHint, ProjectorOptions};
use crate::error::{Result, SurfaceError};
use crate::mesh::{Surface, SurfaceKind, Topology};

use super::hex::{GridIndex, HexSubsample};

/// One resampled level of a flat morph.
#[derive(Debug, Clone)]
pub struct FlatLevel {
    /// Fiducial positions of the level's nodes.
    pub reference: Surface,
    /// Flat positions before this cycle's morphing.
    pub original: Vec<Point3<f32>>,
    /// Flat positions being morphed.
    pub surface: Surface,
    /// Lattice position of each node.
    pub grid: Vec<GridIndex>,
    /// Index in the next finer level each node was taken from. Empty for the
    /// hexagonal level.
    pub source: Vec<usize>,
}

impl FlatLevel {
    /// Level built directly from a hexagonal resampling.
    pub fn from_hex(sample: &HexSubsample) -> Self {
        Self {
            reference: sample.fiducial.clone(),
            original: sample.flat.coords().to_vec(),
            surface: sample.flat.clone(),
            grid: sample.grid.clone(),
            source: Vec::new(),
        }
    }

    /// Number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.surface.num_nodes()
    }

    /// Keep every other row and column.
    ///
    /// `level` is only used in error messages.
    pub fn downsample(&self, level: usize) -> Result<FlatLevel> {
        let mut source = Vec::new();
        let mut grid = Vec::new();
        for (i, g) in self.grid.iter().enumerate() {
            if g.row.rem_euclid(2) == 0 && g.col.rem_euclid(2) == 0 {
                source.push(i);
                grid.push(GridIndex {
                    row: g.row / 2,
                    col: g.col / 2,
                });
            }
        }
        if grid.len() < 3 {
            return Err(SurfaceError::SubsampleFailed {
                level,
                reason: format!("only {} grid nodes survive downsampling", grid.len()),
            });
        }

        let triangles = equilateral_triangles(&grid);
        if triangles.is_empty() {
            return Err(SurfaceError::SubsampleFailed {
                level,
                reason: "downsampled grid has no tiles".into(),
            });
        }
        let topology = Arc::new(
            Topology::new(grid.len(), triangles)?
                .with_type(self.surface.topology().topology_type()),
        );

        let original: Vec<Point3<f32>> = source.iter().map(|&i| self.original[i]).collect();
        let reference_coords = source.iter().map(|&i| self.reference.coord(i)).collect();
        let reference = Surface::new(SurfaceKind::Fiducial, reference_coords, Arc::clone(&topology))?
            .with_structure(self.reference.structure());
        let surface = Surface::new(SurfaceKind::Flat, original.clone(), topology)?
            .with_structure(self.surface.structure());

        debug!(
            "level {level}: {} nodes, {} tiles",
            surface.num_nodes(),
            surface.topology().num_triangles()
        );
        Ok(FlatLevel {
            reference,
            original,
            surface,
            grid,
            source,
        })
    }

    /// Carry this level's morphed positions into the next finer level.
    ///
    /// Nodes this level was taken from get their morphed position back.
    /// Every other finer node is located in this level's unmorphed flat
    /// triangulation and moved to the same spot in the morphed one. Returns
    /// the number of nodes placed by projection.
    pub fn upsample_into(&self, finer: &mut FlatLevel) -> Result<usize> {
        let helper = self.surface.helper();
        let mut placed = vec![false; finer.num_nodes()];
        let mut coords = finer.surface.coords().to_vec();
        for (i, &src) in self.source.iter().enumerate() {
            if helper.has_neighbors(i) {
                coords[src] = self.surface.coord(i);
                placed[src] = true;
            }
        }

        let projector = self.unmorphed_projector();
        let mut projected = 0;
        for (j, p) in finer.original.iter().enumerate() {
            if placed[j] {
                continue;
            }
            let hit = projector.project_barycentric_best_tile_2d(p)?;
            coords[j] = hit.unproject(self.surface.coords());
            projected += 1;
        }
        finer.surface.set_coords(coords)?;
        Ok(projected)
    }

    /// Move every node of `target` through its entry in `table`, evaluated on
    /// this level's morphed positions.
    pub fn backsample(&self, table: &[BarycentricProjection], target: &mut Surface) -> Result<()> {
        if table.len() != target.num_nodes() {
            return Err(SurfaceError::NodeCountMismatch {
                coords: table.len(),
                topology: target.num_nodes(),
            });
        }
        let coords = table
            .iter()
            .map(|hit| hit.unproject(self.surface.coords()))
            .collect();
        target.set_coords(coords)
    }

    fn unmorphed_projector(&self) -> PointProjector {
        PointProjector::from_parts(
            self.original.clone(),
            Arc::clone(self.surface.topology()),
            ProjectionHint::Flat,
            ProjectorOptions::default(),
        )
    }
}

/// Triangles of an equilateral lattice: for each node, the tiles toward its
/// right and upper-right neighbors and toward its upper-right and upper-left
/// neighbors, wherever all three nodes exist.
pub fn equilateral_triangles(grid: &[GridIndex]) -> Vec<[usize; 3]> {
    let index: HashMap<(i32, i32), usize> = grid
        .iter()
        .enumerate()
        .map(|(i, g)| ((g.row, g.col), i))
        .collect();
    let at = |row: i32, col: i32| index.get(&(row, col)).copied();

    let mut triangles = Vec::new();
    for (i, g) in grid.iter().enumerate() {
        let right = at(g.row, g.col + 1);
        let up_right = at(g.row + 1, g.col);
        let up_left = at(g.row + 1, g.col - 1);
        if let (Some(r), Some(u)) = (right, up_right) {
            triangles.push([i, r, u]);
        }
        if let (Some(u), Some(l)) = (up_right, up_left) {
            triangles.push([i, u, l]);
        }
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::morph::hex::{hex_subsample, HexSubsampleOptions};
    use crate::geometry;
    use crate::mesh::fixtures::grid_surface;
    use nalgebra::Vector3;

    fn hex_level(n: usize) -> (Surface, HexSubsample) {
        let flat = grid_surface(n);
        let mut fiducial = flat.clone();
        fiducial.set_kind(SurfaceKind::Fiducial);
        let opts = HexSubsampleOptions::default().with_target_tiles(n * n);
        let sample = hex_subsample(&fiducial, &flat, &opts).unwrap();
        (flat, sample)
    }

    #[test]
    fn test_equilateral_triangles() {
        let grid: Vec<GridIndex> = (0..2)
            .flat_map(|row| (0..3).map(move |col| GridIndex { row, col }))
            .collect();
        // Two rows of three: four tiles between them
        let tris = equilateral_triangles(&grid);
        assert_eq!(tris.len(), 4);
        assert!(tris.contains(&[0, 1, 3]));
        assert!(tris.contains(&[1, 4, 3]));
    }

    #[test]
    fn test_downsample() {
        let (_, sample) = hex_level(16);
        let fine = FlatLevel::from_hex(&sample);
        let coarse = fine.downsample(2).unwrap();

        assert!(coarse.num_nodes() < fine.num_nodes());
        assert_eq!(coarse.source.len(), coarse.num_nodes());
        for (i, &src) in coarse.source.iter().enumerate() {
            assert_eq!(coarse.original[i], fine.original[src]);
            assert_eq!(coarse.reference.coord(i), fine.reference.coord(src));
        }
        let coords = coarse.surface.coords();
        for &[a, b, c] in coarse.surface.topology().triangles() {
            assert!(geometry::signed_triangle_area_2d(&coords[a], &coords[b], &coords[c]) > 0.0);
        }
    }

    #[test]
    fn test_upsample_carries_translation() {
        let (_, sample) = hex_level(16);
        let mut fine = FlatLevel::from_hex(&sample);
        let mut coarse = fine.downsample(2).unwrap();

        let offset = Vector3::new(0.5, -0.25, 0.0);
        coarse.surface.translate(&offset);
        let projected = coarse.upsample_into(&mut fine).unwrap();
        assert!(projected > 0);
        for (p, q) in fine.surface.coords().iter().zip(&fine.original) {
            assert!((p - (q + offset)).norm() < 1e-3);
        }
    }

    #[test]
    fn test_backsample_identity() {
        let (flat, sample) = hex_level(10);
        let level = FlatLevel::from_hex(&sample);
        let mut target = flat.clone();
        target.scale(3.0);
        level.backsample(&sample.upsample, &mut target).unwrap();
        for (p, q) in target.coords().iter().zip(flat.coords()) {
            assert!((p - q).norm() < 1e-3);
        }

        let mut wrong = grid_surface(2);
        assert!(level.backsample(&sample.upsample, &mut wrong).is_err());
    }
}
