//! Projection of 3-D points onto a triangulated surface.
//!
//! A [`PointProjector`] snapshots a surface's coordinates and indexes its
//! connected nodes and triangle centroids. Queries return either the nearest
//! node or the containing triangle with barycentric weights.
//!
//! Once built, a projector is read-only and can be shared across threads. The
//! only state touched by queries is an atomic counter of degenerate triangles
//! met along the way.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sulcus::algo::projector::{PointProjector, ProjectionHint, ProjectorOptions};
//! use sulcus::mesh::{Surface, SurfaceKind, Topology};
//! use nalgebra::Point3;
//!
//! let topology = Arc::new(Topology::new(3, vec![[0, 1, 2]]).unwrap());
//! let coords = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let surface = Surface::new(SurfaceKind::Flat, coords, topology).unwrap();
//! let projector = PointProjector::new(&surface, ProjectionHint::Flat, ProjectorOptions::default());
//!
//! let hit = projector.project_barycentric(&Point3::new(0.25, 0.25, 0.0), true).unwrap();
//! assert_eq!(hit.tile, Some(0));
//! assert!((hit.weights[0] - 0.5).abs() < 1e-6);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point3, Rotation3, Vector3};

use crate::error::{Result, SurfaceError};
use crate::geometry::{self, Location, PolygonLocation, DEFAULT_TOLERANCE};
use crate::mesh::{Surface, SurfaceKind, Topology};

/// Kd-tree over `(id, point)` pairs for nearest and radius queries.
///
/// Keys are rotated off the coordinate axes so lattice-aligned and planar
/// point sets do not pile up on one split value. Hits are re-ranked against
/// the stored points, so results match an exact search.
pub(crate) struct PointIndex {
    tree: KdTree<f32, 3>,
    points: Vec<(usize, Point3<f32>)>,
    rotation: Rotation3<f32>,
}

impl PointIndex {
    /// Index `(id, point)` pairs.
    pub(crate) fn new<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (usize, Point3<f32>)>,
    {
        let points: Vec<(usize, Point3<f32>)> = points.into_iter().collect();
        let rotation = Rotation3::from_euler_angles(0.61, 0.37, 0.83);
        let mut tree: KdTree<f32, 3> = KdTree::new();
        for (slot, (_, p)) in points.iter().enumerate() {
            tree.add(&key(&rotation, p), slot as u64);
        }
        Self {
            tree,
            points,
            rotation,
        }
    }

    /// Number of indexed points.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.points.len()
    }

    /// The closest point to `p` as `(id, distance)`. Ties go to the lower id.
    pub(crate) fn nearest(&self, p: &Point3<f32>) -> Option<(usize, f32)> {
        if self.points.is_empty() {
            return None;
        }
        let q = key(&self.rotation, p);
        let hit = self.tree.nearest_one::<SquaredEuclidean>(&q);
        let seed = hit.item as usize;
        let d2 = (self.points[seed].1 - p).norm_squared();

        // Gather everything tied with the hit, allowing for rounding in the keys
        let slack = hit.distance * 1e-4 + f32::EPSILON;
        let (best_d2, best_id) = self
            .tree
            .within_unsorted::<SquaredEuclidean>(&q, hit.distance + slack)
            .into_iter()
            .map(|n| {
                let (id, point) = self.points[n.item as usize];
                ((point - p).norm_squared(), id)
            })
            .fold((d2, self.points[seed].0), |best, cand| {
                if cand.0 < best.0 || (cand.0 == best.0 && cand.1 < best.1) {
                    cand
                } else {
                    best
                }
            });
        Some((best_id, best_d2.sqrt()))
    }

    /// Ids of all points within `radius` of `p`, sorted ascending.
    pub(crate) fn within_radius(&self, p: &Point3<f32>, radius: f32) -> Vec<usize> {
        if self.points.is_empty() || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let r2 = radius * radius;
        let slack = r2 * 1e-4 + f32::EPSILON;
        let mut found: Vec<usize> = self
            .tree
            .within_unsorted::<SquaredEuclidean>(&key(&self.rotation, p), r2 + slack)
            .into_iter()
            .map(|n| self.points[n.item as usize])
            .filter(|(_, q)| (q - p).norm_squared() <= r2)
            .map(|(id, _)| id)
            .collect();
        found.sort_unstable();
        found
    }
}

impl fmt::Debug for PointIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointIndex").field("len", &self.len()).finish()
    }
}

#[inline]
fn key(rotation: &Rotation3<f32>, p: &Point3<f32>) -> [f32; 3] {
    let r = rotation * p;
    [r.x, r.y, r.z]
}

/// Which search strategy suits the surface being projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionHint {
    /// Surface lies in the XY plane.
    Flat,
    /// Surface lies on a sphere centred at the origin; points are projected
    /// radially.
    Sphere,
    /// Any other surface; points are projected orthogonally onto each
    /// candidate triangle's plane.
    Other,
}

impl From<SurfaceKind> for ProjectionHint {
    fn from(kind: SurfaceKind) -> Self {
        if kind.is_flat() {
            ProjectionHint::Flat
        } else if kind.is_spherical() {
            ProjectionHint::Sphere
        } else {
            ProjectionHint::Other
        }
    }
}

/// Options for [`PointProjector`].
#[derive(Debug, Clone)]
pub struct ProjectorOptions {
    /// How many rings of neighbors around the nearest node to search.
    pub neighbor_depth: usize,
    /// Barycentric tolerance, as a fraction of the triangle area.
    pub tolerance: f32,
    /// A point this close to its nearest node is assigned to one of the
    /// node's tiles even when no tile contains it.
    pub snap_distance: f32,
}

impl Default for ProjectorOptions {
    fn default() -> Self {
        Self {
            neighbor_depth: 2,
            tolerance: DEFAULT_TOLERANCE,
            snap_distance: 0.01,
        }
    }
}

impl ProjectorOptions {
    /// Set the neighbor search depth.
    pub fn with_neighbor_depth(mut self, depth: usize) -> Self {
        self.neighbor_depth = depth;
        self
    }

    /// Set the barycentric tolerance.
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the snap distance.
    pub fn with_snap_distance(mut self, distance: f32) -> Self {
        self.snap_distance = distance;
        self
    }
}

/// Result of a barycentric projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarycentricProjection {
    /// Nearest connected node to the query point.
    pub nearest_node: usize,
    /// Tile the point was assigned to, or `None`.
    pub tile: Option<usize>,
    /// Nodes of the tile, rotated so the nearest node comes first when it
    /// belongs to the tile.
    pub nodes: [usize; 3],
    /// Weights against `nodes`, summing to one.
    pub weights: [f32; 3],
    /// How the point relates to the tile.
    pub location: Location,
}

impl BarycentricProjection {
    fn unassigned(nearest_node: usize) -> Self {
        Self {
            nearest_node,
            tile: None,
            nodes: [nearest_node; 3],
            weights: [1.0, 0.0, 0.0],
            location: Location::Outside,
        }
    }

    /// True if a tile was assigned.
    #[inline]
    pub fn is_projected(&self) -> bool {
        self.tile.is_some()
    }

    /// Evaluate the projection against another coordinate array sharing the
    /// topology. Unassigned projections return the nearest node's position.
    pub fn unproject(&self, coords: &[Point3<f32>]) -> Point3<f32> {
        match self.tile {
            Some(_) => geometry::unproject(self.nodes, self.weights, coords),
            None => coords[self.nearest_node],
        }
    }
}

/// A tile that passed the containment test.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    tile: usize,
    weights: [f32; 3],
    location: Location,
}

impl Candidate {
    fn min_weight(&self) -> f32 {
        self.weights[0].min(self.weights[1]).min(self.weights[2])
    }

    /// Strictly inside beats on-edge, then the larger minimum weight, then
    /// the lower tile index.
    fn beats(&self, other: &Candidate) -> bool {
        let rank = |c: &Candidate| u8::from(c.location == Location::Inside);
        match rank(self).cmp(&rank(other)) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => {
                let (a, b) = (self.min_weight(), other.min_weight());
                a > b || (a == b && self.tile < other.tile)
            }
        }
    }
}

/// Projects points onto a fixed snapshot of a surface.
#[derive(Debug)]
pub struct PointProjector {
    hint: ProjectionHint,
    options: ProjectorOptions,
    coords: Vec<Point3<f32>>,
    topology: Arc<Topology>,
    nodes: PointIndex,
    centroids: PointIndex,
    max_tile_radius: f32,
    degenerate: AtomicUsize,
}

impl PointProjector {
    /// Build a projector over the current coordinates of `surface`.
    pub fn new(surface: &Surface, hint: ProjectionHint, options: ProjectorOptions) -> Self {
        Self::from_parts(
            surface.coords().to_vec(),
            Arc::clone(surface.topology()),
            hint,
            options,
        )
    }

    /// Build a projector from raw coordinates and a topology.
    ///
    /// `coords` must have one entry per topology node.
    pub fn from_parts(
        coords: Vec<Point3<f32>>,
        topology: Arc<Topology>,
        hint: ProjectionHint,
        options: ProjectorOptions,
    ) -> Self {
        let helper = topology.helper();
        let nodes = PointIndex::new(
            coords
                .iter()
                .enumerate()
                .filter(|(i, _)| helper.has_neighbors(*i))
                .map(|(i, p)| (i, *p)),
        );

        let mut max_tile_radius = 0.0f32;
        let centroid_points: Vec<(usize, Point3<f32>)> = topology
            .triangles()
            .iter()
            .enumerate()
            .map(|(t, &[a, b, c])| {
                let centroid = geometry::triangle_centroid(&coords[a], &coords[b], &coords[c]);
                for n in [a, b, c] {
                    max_tile_radius = max_tile_radius.max((coords[n] - centroid).norm());
                }
                (t, centroid)
            })
            .collect();
        let centroids = PointIndex::new(centroid_points);

        Self {
            hint,
            options,
            coords,
            topology,
            nodes,
            centroids,
            max_tile_radius,
            degenerate: AtomicUsize::new(0),
        }
    }

    /// Search hint in use.
    #[inline]
    pub fn hint(&self) -> ProjectionHint {
        self.hint
    }

    /// Coordinates the projector was built from.
    #[inline]
    pub fn coords(&self) -> &[Point3<f32>] {
        &self.coords
    }

    /// Topology the projector was built from.
    #[inline]
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Number of degenerate triangles skipped by queries so far.
    pub fn degenerate_count(&self) -> usize {
        self.degenerate.load(Ordering::Relaxed)
    }

    /// Nearest connected node, or `None` when the surface has no connected
    /// node.
    pub fn project_nearest_node(&self, p: &Point3<f32>) -> Option<usize> {
        self.nodes.nearest(p).map(|(node, _)| node)
    }

    /// Find the tile containing `p`.
    ///
    /// Tiles around the nearest connected node are tried first, then (when
    /// `check_neighbors` is set) tiles around its neighbors out to the
    /// configured depth, then every tile whose centroid is close enough to
    /// contain `p`. A point that lands in no tile but sits within the snap
    /// distance of its nearest node is assigned to that node's first tile.
    ///
    /// Fails with [`SurfaceError::DegenerateGeometry`] when the surface has
    /// no connected node.
    pub fn project_barycentric(
        &self,
        p: &Point3<f32>,
        check_neighbors: bool,
    ) -> Result<BarycentricProjection> {
        let (nearest, nearest_dist) = self.nodes.nearest(p).ok_or_else(|| {
            SurfaceError::DegenerateGeometry("surface has no connected node to project onto".into())
        })?;
        let helper = self.topology.helper();

        let mut checked: HashSet<usize> = HashSet::new();
        let mut best: Option<Candidate> = None;
        self.scan_tiles(p, helper.node_tiles(nearest), &mut checked, &mut best);

        if best.is_none() && check_neighbors {
            let mut visited: HashSet<usize> = HashSet::from([nearest]);
            let mut frontier = vec![nearest];
            for _ in 0..self.options.neighbor_depth {
                let mut next = Vec::new();
                for &node in &frontier {
                    for &n in helper.neighbors(node) {
                        if visited.insert(n) {
                            next.push(n);
                        }
                    }
                }
                next.sort_unstable();
                for &n in &next {
                    self.scan_tiles(p, helper.node_tiles(n), &mut checked, &mut best);
                }
                if best.is_some() || next.is_empty() {
                    break;
                }
                frontier = next;
            }
        }

        if best.is_none() {
            let radius = self.max_tile_radius * 1.5 + nearest_dist * 0.1;
            let nearby = self.centroids.within_radius(p, radius);
            self.scan_tiles(p, &nearby, &mut checked, &mut best);
        }

        if let Some(candidate) = best {
            return Ok(self.finish(nearest, candidate));
        }

        if nearest_dist <= self.options.snap_distance {
            if let Some(&tile) = helper.node_tiles(nearest).first() {
                let tri = self.topology.triangle(tile);
                let weights = tri.map(|n| if n == nearest { 1.0 } else { 0.0 });
                return Ok(self.finish(
                    nearest,
                    Candidate {
                        tile,
                        weights,
                        location: Location::OnEdge,
                    },
                ));
            }
        }

        Ok(BarycentricProjection::unassigned(nearest))
    }

    /// Flat-surface projection that ignores `z`.
    ///
    /// Candidates are tested with a planar point-in-polygon check, so folded
    /// (clockwise) tiles are found too. When no candidate contains the point,
    /// the candidate whose extrapolated weights are least negative is
    /// returned with [`Location::Outside`].
    pub fn project_barycentric_best_tile_2d(
        &self,
        p: &Point3<f32>,
    ) -> Result<BarycentricProjection> {
        let flat = Point3::new(p.x, p.y, 0.0);
        let nearest = self
            .nearest_node_2d(&flat)
            .ok_or_else(|| {
                SurfaceError::DegenerateGeometry(
                    "surface has no connected node to project onto".into(),
                )
            })?;
        let helper = self.topology.helper();

        let mut tiles: Vec<usize> = helper.node_tiles(nearest).to_vec();
        let mut visited: HashSet<usize> = HashSet::from([nearest]);
        let mut frontier = vec![nearest];
        for _ in 0..self.options.neighbor_depth.max(1) {
            let mut next = Vec::new();
            for &node in &frontier {
                for &n in helper.neighbors(node) {
                    if visited.insert(n) {
                        next.push(n);
                        tiles.extend_from_slice(helper.node_tiles(n));
                    }
                }
            }
            frontier = next;
        }
        tiles.sort_unstable();
        tiles.dedup();

        let mut inside: Option<Candidate> = None;
        let mut closest: Option<Candidate> = None;
        for &tile in &tiles {
            let [a, b, c] = self.topology.triangle(tile);
            let corners = [flatten(&self.coords[a]), flatten(&self.coords[b]), flatten(&self.coords[c])];
            let signed = geometry::signed_triangle_area_2d(&corners[0], &corners[1], &corners[2]);
            let normal = if signed < 0.0 { -Vector3::z() } else { Vector3::z() };

            let Ok(bary) = geometry::barycentric(
                &flat,
                &corners[0],
                &corners[1],
                &corners[2],
                &normal,
                self.options.tolerance,
            ) else {
                self.degenerate.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            let Some(weights) = bary.normalized() else {
                self.degenerate.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let location = match geometry::point_in_polygon_2d(&flat, &corners, None, &Vector3::z()) {
                PolygonLocation::Inside => Location::Inside,
                PolygonLocation::Outside => bary.location,
                PolygonLocation::Degenerate => {
                    self.degenerate.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            let candidate = Candidate {
                tile,
                weights,
                location,
            };
            if location.contains() {
                if inside.map_or(true, |b| candidate.beats(&b)) {
                    inside = Some(candidate);
                }
            } else if closest.map_or(true, |b| {
                let (cm, bm) = (candidate.min_weight(), b.min_weight());
                cm > bm || (cm == bm && candidate.tile < b.tile)
            }) {
                closest = Some(candidate);
            }
        }

        match inside.or(closest) {
            Some(candidate) => Ok(self.finish(nearest, candidate)),
            None => Ok(BarycentricProjection::unassigned(nearest)),
        }
    }

    fn nearest_node_2d(&self, flat: &Point3<f32>) -> Option<usize> {
        // The node index is 3-D; for flat surfaces every node has z near 0
        match self.hint {
            ProjectionHint::Flat => self.nodes.nearest(flat).map(|(n, _)| n),
            _ => {
                let helper = self.topology.helper();
                self.coords
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| helper.has_neighbors(*i))
                    .map(|(i, q)| (i, (flatten(q) - flat).norm_squared()))
                    .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
                    .map(|(i, _)| i)
            }
        }
    }

    /// Test each unchecked tile and keep the best containing candidate.
    fn scan_tiles(
        &self,
        p: &Point3<f32>,
        tiles: &[usize],
        checked: &mut HashSet<usize>,
        best: &mut Option<Candidate>,
    ) {
        for &tile in tiles {
            if !checked.insert(tile) {
                continue;
            }
            if let Some(candidate) = self.test_tile(p, tile) {
                if best.map_or(true, |b| candidate.beats(&b)) {
                    *best = Some(candidate);
                }
            }
        }
    }

    /// Containment test of `p` against one tile, in that tile's plane.
    fn test_tile(&self, p: &Point3<f32>, tile: usize) -> Option<Candidate> {
        let [a, b, c] = self.topology.triangle(tile);
        let (p1, p2, p3) = (&self.coords[a], &self.coords[b], &self.coords[c]);
        let Some(normal) = geometry::triangle_normal(p1, p2, p3) else {
            self.degenerate.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let q = match self.hint {
            ProjectionHint::Sphere => {
                geometry::ray_plane_intersection(&Point3::origin(), &p.coords, p1, &normal)?
            }
            ProjectionHint::Flat | ProjectionHint::Other => geometry::project_to_plane(p, p1, &normal),
        };

        let bary = match geometry::barycentric(&q, p1, p2, p3, &normal, self.options.tolerance) {
            Ok(bary) => bary,
            Err(_) => {
                self.degenerate.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if !bary.location.contains() {
            return None;
        }
        let weights = bary.normalized()?;
        Some(Candidate {
            tile,
            weights,
            location: bary.location,
        })
    }

    fn finish(&self, nearest: usize, candidate: Candidate) -> BarycentricProjection {
        let mut nodes = self.topology.triangle(candidate.tile);
        let mut weights = candidate.weights;
        if let Some(k) = nodes.iter().position(|&n| n == nearest) {
            nodes.rotate_left(k);
            weights.rotate_left(k);
        }
        BarycentricProjection {
            nearest_node: nearest,
            tile: Some(candidate.tile),
            nodes,
            weights,
            location: candidate.location,
        }
    }
}

#[inline]
fn flatten(p: &Point3<f32>) -> Point3<f32> {
    Point3::new(p.x, p.y, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{grid_surface, icosphere};

    fn single_triangle() -> Surface {
        let topo = Arc::new(Topology::new(3, vec![[0, 1, 2]]).unwrap());
        let coords = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        Surface::new(SurfaceKind::Flat, coords, topo).unwrap()
    }

    #[test]
    fn test_point_inside_single_triangle() {
        let surface = single_triangle();
        let projector = PointProjector::new(&surface, ProjectionHint::Flat, ProjectorOptions::default());
        let p = Point3::new(0.25, 0.25, 0.0);
        let hit = projector.project_barycentric(&p, true).unwrap();

        assert_eq!(hit.tile, Some(0));
        assert_eq!(hit.nodes, [0, 1, 2]);
        assert_eq!(hit.location, Location::Inside);
        assert!((hit.weights[0] - 0.5).abs() < 1e-6);
        assert!((hit.weights[1] - 0.25).abs() < 1e-6);
        assert!((hit.weights[2] - 0.25).abs() < 1e-6);
        assert!((hit.unproject(surface.coords()) - p).norm() < 1e-6);
    }

    #[test]
    fn test_point_at_vertex() {
        let surface = grid_surface(3);
        let projector = PointProjector::new(&surface, ProjectionHint::Flat, ProjectorOptions::default());
        // Node 5 sits at (1, 1)
        let hit = projector.project_barycentric(&Point3::new(1.0, 1.0, 0.0), true).unwrap();
        assert_eq!(hit.nearest_node, 5);
        assert_eq!(hit.nodes[0], 5);
        assert_eq!(hit.weights, [1.0, 0.0, 0.0]);
        // Lowest-index incident tile wins the tie
        assert_eq!(hit.tile, Some(*surface.helper().node_tiles(5).iter().min().unwrap()));
    }

    #[test]
    fn test_roundtrip_inside_every_tile() {
        let surface = grid_surface(4);
        let projector = PointProjector::new(&surface, ProjectionHint::Other, ProjectorOptions::default());
        for t in 0..surface.topology().num_triangles() {
            let [a, b, c] = surface.triangle_points(t);
            let p = Point3::from(a.coords * 0.2 + b.coords * 0.3 + c.coords * 0.5);
            let hit = projector.project_barycentric(&p, true).unwrap();
            assert_eq!(hit.tile, Some(t));
            assert!((hit.unproject(surface.coords()) - p).norm() < 1e-5);
        }
    }

    #[test]
    fn test_outside_point_is_unassigned() {
        let surface = grid_surface(2);
        let projector = PointProjector::new(&surface, ProjectionHint::Flat, ProjectorOptions::default());
        let hit = projector.project_barycentric(&Point3::new(5.0, 5.0, 0.0), true).unwrap();
        assert_eq!(hit.tile, None);
        assert_eq!(hit.nearest_node, 8);
        assert_eq!(projector.project_nearest_node(&Point3::new(-3.0, 0.2, 0.0)), Some(0));

        // Within snap distance of a corner
        let hit = projector
            .project_barycentric(&Point3::new(2.005, 2.0, 0.0), true)
            .unwrap();
        assert!(hit.is_projected());
        assert_eq!(hit.weights[0], 1.0);
    }

    #[test]
    fn test_best_tile_2d_extrapolates() {
        let surface = grid_surface(2);
        let projector = PointProjector::new(&surface, ProjectionHint::Flat, ProjectorOptions::default());

        let hit = projector
            .project_barycentric_best_tile_2d(&Point3::new(0.7, 0.2, 9.0))
            .unwrap();
        assert!(hit.location.contains());
        let p = hit.unproject(surface.coords());
        assert!((p.x - 0.7).abs() < 1e-5 && (p.y - 0.2).abs() < 1e-5);

        let hit = projector
            .project_barycentric_best_tile_2d(&Point3::new(2.3, 1.0, 0.0))
            .unwrap();
        assert_eq!(hit.location, Location::Outside);
        assert!(hit.tile.is_some());
        let p = hit.unproject(surface.coords());
        assert!((p.x - 2.3).abs() < 1e-4 && (p.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_sphere_projection() {
        let surface = icosphere(2);
        let projector =
            PointProjector::new(&surface, ProjectionHint::Sphere, ProjectorOptions::default());
        let direction = nalgebra::Vector3::new(0.3f32, -0.5, 0.8).normalize();
        let hit = projector
            .project_barycentric(&Point3::from(direction * 1.0), true)
            .unwrap();
        assert!(hit.is_projected());
        let back = hit.unproject(surface.coords());
        // Same direction, on the chordal tile
        assert!(back.coords.normalize().dot(&direction) > 0.9999);
        assert_eq!(projector.degenerate_count(), 0);
    }

    fn lattice(n: usize) -> Vec<(usize, Point3<f32>)> {
        let mut points = Vec::new();
        for j in 0..n {
            for i in 0..n {
                points.push((j * n + i, Point3::new(i as f32, j as f32, 0.0)));
            }
        }
        points
    }

    fn brute_nearest(points: &[(usize, Point3<f32>)], p: &Point3<f32>) -> usize {
        points
            .iter()
            .min_by(|a, b| {
                (a.1 - p)
                    .norm_squared()
                    .total_cmp(&(b.1 - p).norm_squared())
                    .then(a.0.cmp(&b.0))
            })
            .unwrap()
            .0
    }

    #[test]
    fn test_index_nearest_matches_brute_force() {
        // Planar lattice with 60 points on every row and column
        let points = lattice(60);
        let index = PointIndex::new(points.clone());
        assert_eq!(index.len(), 3600);
        for q in [
            Point3::new(3.2, 4.9, 0.0),
            Point3::new(-5.0, -5.0, 2.0),
            Point3::new(80.0, 3.3, 0.0),
            Point3::new(48.6, 20.1, -1.0),
            Point3::new(12.5, 30.5, 0.0),
        ] {
            let (id, d) = index.nearest(&q).unwrap();
            let expected = brute_nearest(&points, &q);
            assert_eq!(id, expected);
            assert!((d - (points[expected].1 - q).norm()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_index_tie_prefers_lower_id() {
        let index = PointIndex::new(vec![
            (7, Point3::new(1.0, 0.0, 0.0)),
            (3, Point3::new(-1.0, 0.0, 0.0)),
            (5, Point3::new(0.0, 1.0, 0.0)),
        ]);
        assert_eq!(index.nearest(&Point3::origin()).unwrap().0, 3);
    }

    #[test]
    fn test_index_within_radius() {
        let index = PointIndex::new(lattice(10));
        let found = index.within_radius(&Point3::new(5.0, 5.0, 0.0), 1.0);
        assert_eq!(found, vec![45, 54, 55, 56, 65]);
        assert!(index.within_radius(&Point3::new(50.0, 0.0, 0.0), 1.0).is_empty());
        assert!(index.within_radius(&Point3::origin(), f32::NAN).is_empty());
    }

    #[test]
    fn test_index_empty() {
        let index = PointIndex::new(Vec::new());
        assert!(index.nearest(&Point3::origin()).is_none());
        assert!(index.within_radius(&Point3::origin(), 10.0).is_empty());
    }

    #[test]
    fn test_no_connected_nodes() {
        let topo = Arc::new(Topology::new(2, Vec::new()).unwrap());
        let surface = Surface::new(SurfaceKind::Flat, vec![Point3::origin(); 2], topo).unwrap();
        let projector = PointProjector::new(&surface, ProjectionHint::Flat, ProjectorOptions::default());
        assert!(projector.project_nearest_node(&Point3::origin()).is_none());
        assert!(matches!(
            projector.project_barycentric(&Point3::origin(), true),
            Err(SurfaceError::DegenerateGeometry(_))
        ));
    }
}
