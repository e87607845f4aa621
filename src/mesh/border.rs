//! Border polylines and their barycentric projections.

use nalgebra::Point3;

use crate::algo::projector::PointProjector;
use crate::error::{Result, SurfaceError};
use crate::geometry;

/// One vertex of a border polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderLink {
    /// Position in space.
    pub position: Point3<f32>,
    /// Section number.
    pub section: i32,
    /// Link radius.
    pub radius: f32,
}

impl BorderLink {
    /// A link at `position` in section 0 with zero radius.
    pub fn new(position: Point3<f32>) -> Self {
        Self {
            position,
            section: 0,
            radius: 0.0,
        }
    }
}

/// A named, ordered polyline.
#[derive(Debug, Clone, PartialEq)]
pub struct Border {
    /// Border name.
    pub name: String,
    /// Sampling density used when the border was drawn.
    pub sampling_density: f32,
    /// Variance.
    pub variance: f32,
    /// Topography value.
    pub topography: f32,
    /// Arealization uncertainty.
    pub uncertainty: f32,
    links: Vec<BorderLink>,
}

impl Border {
    /// An empty border.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sampling_density: 25.0,
            variance: 1.0,
            topography: 0.0,
            uncertainty: 1.0,
            links: Vec::new(),
        }
    }

    /// A border through `positions`, in order.
    pub fn from_positions<I>(name: impl Into<String>, positions: I) -> Self
    where
        I: IntoIterator<Item = Point3<f32>>,
    {
        let mut border = Self::new(name);
        border.links = positions.into_iter().map(BorderLink::new).collect();
        border
    }

    /// Append a link.
    pub fn push(&mut self, link: BorderLink) {
        self.links.push(link);
    }

    /// All links.
    #[inline]
    pub fn links(&self) -> &[BorderLink] {
        &self.links
    }

    /// Mutable links.
    #[inline]
    pub fn links_mut(&mut self) -> &mut Vec<BorderLink> {
        &mut self.links
    }

    /// Number of links.
    #[inline]
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// True if the border has no links.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Positions of all links.
    pub fn positions(&self) -> Vec<Point3<f32>> {
        self.links.iter().map(|l| l.position).collect()
    }

    /// Mean link position.
    pub fn center(&self) -> Point3<f32> {
        if self.links.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .links
            .iter()
            .fold(nalgebra::Vector3::<f64>::zeros(), |acc, l| {
                acc + l.position.coords.cast::<f64>()
            });
        Point3::from((sum / self.links.len() as f64).cast::<f32>())
    }

    /// Total polyline length.
    pub fn length(&self) -> f32 {
        self.links
            .windows(2)
            .map(|w| f64::from((w[1].position - w[0].position).norm()))
            .sum::<f64>() as f32
    }

    /// Reverse the link order.
    pub fn reverse(&mut self) {
        self.links.reverse();
    }

    /// Index of the link closest to `p`.
    pub fn nearest_link(&self, p: &Point3<f32>) -> Option<usize> {
        self.links
            .iter()
            .enumerate()
            .map(|(i, l)| (i, (l.position - p).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Resample so consecutive links are about `density` apart.
    ///
    /// Produces `floor(length / density) + 1` links, raised to `min_links`
    /// (and never fewer than two), placed at uniform arc length with both
    /// endpoints kept.
    pub fn resample_to_density(&mut self, density: f32, min_links: usize) -> Result<()> {
        if density <= 0.0 || !density.is_finite() {
            return Err(SurfaceError::invalid_param(
                "density",
                density,
                "must be positive",
            ));
        }
        let length = self.length();
        let count = ((length / density).floor() as usize + 1).max(min_links).max(2);
        self.resample_to_links(count)
    }

    /// Resample to exactly `count` links at uniform arc length.
    pub fn resample_to_links(&mut self, count: usize) -> Result<()> {
        if count < 2 {
            return Err(SurfaceError::invalid_param(
                "count",
                count,
                "a border needs at least two links",
            ));
        }
        if self.links.len() < 2 {
            return Err(SurfaceError::InvalidArgument(format!(
                "border '{}' has {} link(s), cannot resample",
                self.name,
                self.links.len()
            )));
        }

        let mut arc = Vec::with_capacity(self.links.len());
        let mut total = 0.0f64;
        arc.push(0.0);
        for w in self.links.windows(2) {
            total += f64::from((w[1].position - w[0].position).norm());
            arc.push(total);
        }
        if total <= 0.0 {
            return Err(SurfaceError::DegenerateGeometry(format!(
                "border '{}' has zero length",
                self.name
            )));
        }

        let step = total / (count - 1) as f64;
        let mut resampled = Vec::with_capacity(count);
        let mut segment = 0;
        for k in 0..count {
            let target = if k + 1 == count { total } else { k as f64 * step };
            while segment + 2 < arc.len() && arc[segment + 1] < target {
                segment += 1;
            }
            let (s0, s1) = (arc[segment], arc[segment + 1]);
            let t = if s1 > s0 { ((target - s0) / (s1 - s0)).clamp(0.0, 1.0) } else { 0.0 };
            let a = &self.links[segment];
            let b = &self.links[segment + 1];
            let position = a.position + (b.position - a.position) * t as f32;
            let nearest = if t < 0.5 { a } else { b };
            resampled.push(BorderLink {
                position,
                section: nearest.section,
                radius: nearest.radius,
            });
        }
        if let (Some(first), Some(last)) = (self.links.first(), self.links.last()) {
            resampled[0].position = first.position;
            resampled[count - 1].position = last.position;
        }
        self.links = resampled;
        Ok(())
    }
}

/// One border link expressed against a triangle of a topology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedLink {
    /// Tile containing the link, or `None` for a raw link.
    pub tile: Option<usize>,
    /// Nodes of the tile.
    pub nodes: [usize; 3],
    /// Barycentric weights against `nodes`.
    pub weights: [f32; 3],
    /// Position used for raw links.
    pub position: Point3<f32>,
    /// Section number.
    pub section: i32,
    /// Link radius.
    pub radius: f32,
}

/// A border held as per-link barycentric coordinates, re-evaluable against any
/// surface sharing the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct BorderProjection {
    /// Border name.
    pub name: String,
    /// Sampling density.
    pub sampling_density: f32,
    /// Variance.
    pub variance: f32,
    /// Topography value.
    pub topography: f32,
    /// Arealization uncertainty.
    pub uncertainty: f32,
    /// Projected links.
    pub links: Vec<ProjectedLink>,
}

impl BorderProjection {
    /// Project every link of `border` onto the projector's surface. Links
    /// that fall in no tile are kept raw.
    pub fn project(border: &Border, projector: &PointProjector) -> Self {
        let links = border
            .links()
            .iter()
            .map(|link| {
                let projection = projector.project_barycentric(&link.position, true).ok();
                match projection.and_then(|p| p.tile.map(|t| (t, p))) {
                    Some((tile, p)) => ProjectedLink {
                        tile: Some(tile),
                        nodes: p.nodes,
                        weights: p.weights,
                        position: link.position,
                        section: link.section,
                        radius: link.radius,
                    },
                    None => ProjectedLink {
                        tile: None,
                        nodes: [0; 3],
                        weights: [0.0; 3],
                        position: link.position,
                        section: link.section,
                        radius: link.radius,
                    },
                }
            })
            .collect();
        Self {
            name: border.name.clone(),
            sampling_density: border.sampling_density,
            variance: border.variance,
            topography: border.topography,
            uncertainty: border.uncertainty,
            links,
        }
    }

    /// Number of links without a tile.
    pub fn num_raw_links(&self) -> usize {
        self.links.iter().filter(|l| l.tile.is_none()).count()
    }

    /// Evaluate the projection against `coords`.
    pub fn unproject(&self, coords: &[Point3<f32>]) -> Result<Border> {
        let mut border = Border::new(self.name.clone());
        border.sampling_density = self.sampling_density;
        border.variance = self.variance;
        border.topography = self.topography;
        border.uncertainty = self.uncertainty;
        for link in &self.links {
            let position = match link.tile {
                Some(_) => {
                    if let Some(&bad) = link.nodes.iter().find(|&&n| n >= coords.len()) {
                        return Err(SurfaceError::NodeOutOfRange {
                            node: bad,
                            num_nodes: coords.len(),
                        });
                    }
                    geometry::unproject(link.nodes, link.weights, coords)
                }
                None => link.position,
            };
            border.push(BorderLink {
                position,
                section: link.section,
                radius: link.radius,
            });
        }
        Ok(border)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::projector::{ProjectionHint, ProjectorOptions};
    use crate::mesh::surface::fixtures::grid_surface;

    fn line(n: usize) -> Border {
        Border::from_positions("line", (0..n).map(|i| Point3::new(i as f32, 0.0, 0.0)))
    }

    #[test]
    fn test_length_and_reverse() {
        let mut border = line(5);
        assert!((border.length() - 4.0).abs() < 1e-6);
        border.reverse();
        assert_eq!(border.links()[0].position, Point3::new(4.0, 0.0, 0.0));
        assert_eq!(border.nearest_link(&Point3::new(3.9, 1.0, 0.0)), Some(0));
    }

    #[test]
    fn test_resample_to_density() {
        let mut border = line(3);
        border.resample_to_density(0.5, 2).unwrap();
        assert_eq!(border.num_links(), 5);
        let xs: Vec<f32> = border.links().iter().map(|l| l.position.x).collect();
        for (x, expected) in xs.iter().zip([0.0, 0.5, 1.0, 1.5, 2.0]) {
            assert!((x - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_resample_keeps_endpoints_and_minimum() {
        let mut border = Border::from_positions(
            "bent",
            [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(3.0, 0.0, 0.0),
                Point3::new(3.0, 4.0, 0.0),
            ],
        );
        border.resample_to_density(100.0, 2).unwrap();
        assert_eq!(border.num_links(), 2);
        assert_eq!(border.links()[0].position, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(border.links()[1].position, Point3::new(3.0, 4.0, 0.0));

        assert!(line(1).resample_to_links(4).is_err());
        assert!(line(3).resample_to_density(0.0, 2).is_err());
    }

    #[test]
    fn test_projection_roundtrip() {
        let surface = grid_surface(4);
        let projector = PointProjector::new(&surface, ProjectionHint::Flat, ProjectorOptions::default());
        let border = Border::from_positions(
            "diag",
            [
                Point3::new(0.3, 0.6, 0.0),
                Point3::new(2.2, 2.7, 0.0),
                Point3::new(9.0, 9.0, 0.0),
            ],
        );
        let projection = BorderProjection::project(&border, &projector);
        assert_eq!(projection.num_raw_links(), 1);

        let back = projection.unproject(surface.coords()).unwrap();
        for (a, b) in back.links().iter().zip(border.links()) {
            assert!((a.position - b.position).norm() < 1e-5);
        }

        let mut scaled: Vec<Point3<f32>> = surface.coords().to_vec();
        for p in &mut scaled {
            *p = Point3::from(p.coords * 2.0);
        }
        let moved = projection.unproject(&scaled).unwrap();
        assert!((moved.links()[1].position - Point3::new(4.4, 5.4, 0.0)).norm() < 1e-4);
        // Raw links stay where they were
        assert_eq!(moved.links()[2].position, Point3::new(9.0, 9.0, 0.0));
    }
}
