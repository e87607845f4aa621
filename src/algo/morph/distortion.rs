//! Distortion of a morphed surface relative to its reference.

use std::fmt;
use std::time::Duration;

use crate::error::{Result, SurfaceError};
use crate::geometry;
use crate::mesh::Surface;

/// Summary statistics of a set of values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DescriptiveStatistics {
    /// Number of values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f32,
    /// Sample standard deviation (`n - 1` denominator).
    pub std_dev: f32,
    /// Median; the mean of the two middle values for even counts.
    pub median: f32,
    /// Smallest value.
    pub min: f32,
    /// Largest value.
    pub max: f32,
    /// `max - min`.
    pub range: f32,
}

impl DescriptiveStatistics {
    /// Statistics of the finite entries of `values`.
    pub fn from_values(values: &[f32]) -> Self {
        let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(f32::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().map(|&v| f64::from(v)).sum::<f64>() / count as f64;
        let std_dev = if count > 1 {
            let ss: f64 = sorted.iter().map(|&v| (f64::from(v) - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        } else {
            0.0
        };
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };
        let (min, max) = (sorted[0], sorted[count - 1]);

        Self {
            count,
            mean: mean as f32,
            std_dev: std_dev as f32,
            median,
            min,
            max,
            range: max - min,
        }
    }
}

fn check_reference(surface: &Surface, reference: &Surface) -> Result<()> {
    if reference.num_nodes() != surface.num_nodes() {
        return Err(SurfaceError::NodeCountMismatch {
            coords: reference.num_nodes(),
            topology: surface.num_nodes(),
        });
    }
    Ok(())
}

/// Per-node areal distortion: the mean over incident tiles of
/// `log2(area / reference_area)`.
///
/// Tiles with zero area on either surface are skipped; nodes without a usable
/// tile get `0.0`. Only `surface`'s topology is used.
pub fn areal_distortion(surface: &Surface, reference: &Surface) -> Result<Vec<f32>> {
    check_reference(surface, reference)?;
    let (coords, ref_coords) = (surface.coords(), reference.coords());
    let tile_log: Vec<Option<f32>> = surface
        .topology()
        .triangles()
        .iter()
        .map(|&[a, b, c]| {
            let area = geometry::triangle_area(&coords[a], &coords[b], &coords[c]);
            let ref_area = geometry::triangle_area(&ref_coords[a], &ref_coords[b], &ref_coords[c]);
            (area > 0.0 && ref_area > 0.0).then(|| (area / ref_area).log2())
        })
        .collect();

    let helper = surface.helper();
    Ok((0..surface.num_nodes())
        .map(|node| {
            let logs: Vec<f32> = helper
                .node_tiles(node)
                .iter()
                .filter_map(|&t| tile_log[t])
                .collect();
            if logs.is_empty() {
                0.0
            } else {
                logs.iter().sum::<f32>() / logs.len() as f32
            }
        })
        .collect())
}

/// Per-node linear distortion: the mean incident edge length divided by the
/// mean reference length of the same edges. Nodes without edges get `1.0`.
pub fn linear_distortion(surface: &Surface, reference: &Surface) -> Result<Vec<f32>> {
    check_reference(surface, reference)?;
    let helper = surface.helper();
    let (coords, ref_coords) = (surface.coords(), reference.coords());
    Ok((0..surface.num_nodes())
        .map(|node| {
            let neighbors = helper.neighbors(node);
            if neighbors.is_empty() {
                return 1.0;
            }
            let (mut cur, mut orig) = (0.0f64, 0.0f64);
            for &n in neighbors {
                cur += f64::from((coords[n] - coords[node]).norm());
                orig += f64::from((ref_coords[n] - ref_coords[node]).norm());
            }
            if orig > 0.0 {
                (cur / orig) as f32
            } else {
                1.0
            }
        })
        .collect())
}

/// Distortion and crossover snapshot taken by the morphing driver.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphingMeasurement {
    /// `"Before Morphing"`, `"Cycle N"`, `"Overlap Smoothed"` or `"Aligned"`.
    pub name: String,
    /// Areal distortion over connected nodes.
    pub areal: DescriptiveStatistics,
    /// Linear distortion over connected nodes.
    pub linear: DescriptiveStatistics,
    /// Nodes touching a folded tile.
    pub node_crossovers: usize,
    /// Folded tiles.
    pub tile_crossovers: usize,
    /// Wall time spent since the previous measurement.
    pub elapsed: Duration,
}

impl MorphingMeasurement {
    /// Measure `surface` against `reference`.
    pub fn measure(
        name: impl Into<String>,
        surface: &Surface,
        reference: &Surface,
        elapsed: Duration,
    ) -> Result<Self> {
        let helper = surface.helper();
        let connected = |values: Vec<f32>| -> Vec<f32> {
            values
                .into_iter()
                .enumerate()
                .filter(|(i, _)| helper.has_neighbors(*i))
                .map(|(_, v)| v)
                .collect()
        };
        let areal = connected(areal_distortion(surface, reference)?);
        let linear = connected(linear_distortion(surface, reference)?);
        let crossovers = surface.crossovers();
        Ok(Self {
            name: name.into(),
            areal: DescriptiveStatistics::from_values(&areal),
            linear: DescriptiveStatistics::from_values(&linear),
            node_crossovers: crossovers.node_crossovers,
            tile_crossovers: crossovers.tile_crossovers,
            elapsed,
        })
    }
}

impl fmt::Display for MorphingMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<18} areal {:>8.4} ± {:<7.4} linear {:>7.4} ± {:<7.4} crossovers {:>5} nodes {:>5} tiles  {:>7.2}s",
            self.name,
            self.areal.mean,
            self.areal.std_dev,
            self.linear.mean,
            self.linear.std_dev,
            self.node_crossovers,
            self.tile_crossovers,
            self.elapsed.as_secs_f32()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::grid_surface;
    use approx::assert_relative_eq;

    #[test]
    fn test_statistics() {
        let stats = DescriptiveStatistics::from_values(&[4.0, 1.0, 3.0, 2.0, f32::NAN]);
        assert_eq!(stats.count, 4);
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.median, 2.5);
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.range, 3.0);
        // Sample variance of 1..4 is 5/3
        assert_relative_eq!(stats.std_dev, (5.0f32 / 3.0).sqrt(), epsilon = 1e-6);

        let single = DescriptiveStatistics::from_values(&[7.0]);
        assert_eq!(single.std_dev, 0.0);
        assert_eq!(single.median, 7.0);
        assert_eq!(DescriptiveStatistics::from_values(&[]).count, 0);
    }

    #[test]
    fn test_identity_has_no_distortion() {
        let surface = grid_surface(3);
        let areal = areal_distortion(&surface, &surface).unwrap();
        let linear = linear_distortion(&surface, &surface).unwrap();
        assert!(areal.iter().all(|&v| v == 0.0));
        assert!(linear.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_uniform_scale() {
        let reference = grid_surface(3);
        let mut surface = reference.clone();
        surface.scale(2.0);
        for v in areal_distortion(&surface, &reference).unwrap() {
            assert_relative_eq!(v, 2.0, epsilon = 1e-5);
        }
        for v in linear_distortion(&surface, &reference).unwrap() {
            assert_relative_eq!(v, 2.0, epsilon = 1e-5);
        }

        let m = MorphingMeasurement::measure("Cycle 1", &surface, &reference, Duration::ZERO)
            .unwrap();
        assert_eq!(m.areal.count, 16);
        assert_relative_eq!(m.areal.mean, 2.0, epsilon = 1e-5);
        assert_eq!(m.tile_crossovers, 0);
        assert!(m.to_string().starts_with("Cycle 1"));
    }

    #[test]
    fn test_node_count_mismatch() {
        let err = areal_distortion(&grid_surface(2), &grid_surface(3)).unwrap_err();
        assert!(matches!(err, SurfaceError::NodeCountMismatch { .. }));
    }
}
