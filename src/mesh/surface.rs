//! Surfaces: one coordinate array over a shared topology.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nalgebra::{Point3, Rotation3, Vector3};

use crate::error::{Result, SurfaceError};
use crate::geometry::{self, Bounds};

use super::helper::TopologyHelper;
use super::topology::Topology;

/// The configuration a coordinate array represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceKind {
    /// Anatomical (folded) surface.
    Fiducial,
    /// Flattened surface in the XY plane.
    Flat,
    /// Surface on a sphere centred at the origin.
    Spherical,
    /// Inflated surface.
    Inflated,
    /// Very inflated surface.
    VeryInflated,
    /// Ellipsoid.
    Ellipsoidal,
    /// Convex hull.
    Hull,
    /// Inflated surface with a compressed medial wall.
    CompressedMedialWall,
    /// Flat surface of a single lobe.
    FlatLobar,
    /// Raw reconstruction.
    Raw,
    /// Not recorded.
    #[default]
    Unknown,
}

/// How crossovers are detected for a surface kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossoverMethod {
    /// Signed area in the XY plane.
    Flat,
    /// Face normal against the outward radial direction.
    Sphere,
    /// Normals of tiles sharing an edge.
    Other,
}

impl SurfaceKind {
    /// All kinds, in file order.
    pub const ALL: [SurfaceKind; 11] = [
        SurfaceKind::Fiducial,
        SurfaceKind::Flat,
        SurfaceKind::Spherical,
        SurfaceKind::Inflated,
        SurfaceKind::VeryInflated,
        SurfaceKind::Ellipsoidal,
        SurfaceKind::Hull,
        SurfaceKind::CompressedMedialWall,
        SurfaceKind::FlatLobar,
        SurfaceKind::Raw,
        SurfaceKind::Unknown,
    ];

    /// Canonical name used in files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceKind::Fiducial => "FIDUCIAL",
            SurfaceKind::Flat => "FLAT",
            SurfaceKind::Spherical => "SPHERICAL",
            SurfaceKind::Inflated => "INFLATED",
            SurfaceKind::VeryInflated => "VERY_INFLATED",
            SurfaceKind::Ellipsoidal => "ELLIPSOIDAL",
            SurfaceKind::Hull => "HULL",
            SurfaceKind::CompressedMedialWall => "COMPRESSED_MEDIAL_WALL",
            SurfaceKind::FlatLobar => "FLAT_LOBAR",
            SurfaceKind::Raw => "RAW",
            SurfaceKind::Unknown => "UNKNOWN",
        }
    }

    /// True for flat and lobar flat surfaces.
    #[inline]
    pub fn is_flat(self) -> bool {
        matches!(self, SurfaceKind::Flat | SurfaceKind::FlatLobar)
    }

    /// True for spherical surfaces.
    #[inline]
    pub fn is_spherical(self) -> bool {
        self == SurfaceKind::Spherical
    }

    /// Crossover detection method suited to this kind.
    pub fn crossover_method(self) -> CrossoverMethod {
        if self.is_flat() {
            CrossoverMethod::Flat
        } else if self.is_spherical() {
            CrossoverMethod::Sphere
        } else {
            CrossoverMethod::Other
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SurfaceKind {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase().replace('-', "_");
        SurfaceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == upper)
            .ok_or_else(|| SurfaceError::InvalidArgument(format!("unknown surface kind '{s}'")))
    }
}

/// Anatomical structure a surface belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Structure {
    /// Left cortex.
    Left,
    /// Right cortex.
    Right,
    /// Both hemispheres.
    Both,
    /// Cerebellum.
    Cerebellum,
    /// Not recorded.
    #[default]
    Unknown,
}

impl Structure {
    /// Canonical name used in file headers.
    pub fn as_str(self) -> &'static str {
        match self {
            Structure::Left => "left",
            Structure::Right => "right",
            Structure::Both => "both",
            Structure::Cerebellum => "cerebellum",
            Structure::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Structure {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "cortex_left" => Ok(Structure::Left),
            "right" | "cortex_right" => Ok(Structure::Right),
            "both" => Ok(Structure::Both),
            "cerebellum" => Ok(Structure::Cerebellum),
            "unknown" | "" => Ok(Structure::Unknown),
            other => Err(SurfaceError::InvalidArgument(format!(
                "unknown structure '{other}'"
            ))),
        }
    }
}

/// Outcome of a crossover check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossoverReport {
    /// Number of folded tiles.
    pub tile_crossovers: usize,
    /// Number of nodes touching a folded tile.
    pub node_crossovers: usize,
    /// Per-node crossover flag.
    pub node_flags: Vec<bool>,
}

/// A coordinate array over a shared topology.
#[derive(Debug, Clone)]
pub struct Surface {
    kind: SurfaceKind,
    structure: Structure,
    coords: Vec<Point3<f32>>,
    topology: Arc<Topology>,
}

impl Surface {
    /// Create a surface, checking that the coordinates match the topology.
    pub fn new(kind: SurfaceKind, coords: Vec<Point3<f32>>, topology: Arc<Topology>) -> Result<Self> {
        if coords.is_empty() {
            return Err(SurfaceError::EmptySurface("no coordinates".to_string()));
        }
        if coords.len() != topology.num_nodes() {
            return Err(SurfaceError::NodeCountMismatch {
                coords: coords.len(),
                topology: topology.num_nodes(),
            });
        }
        Ok(Self {
            kind,
            structure: Structure::Unknown,
            coords,
            topology,
        })
    }

    /// Set the anatomical structure.
    pub fn with_structure(mut self, structure: Structure) -> Self {
        self.structure = structure;
        self
    }

    /// Surface kind.
    #[inline]
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    /// Change the surface kind.
    #[inline]
    pub fn set_kind(&mut self, kind: SurfaceKind) {
        self.kind = kind;
    }

    /// Anatomical structure.
    #[inline]
    pub fn structure(&self) -> Structure {
        self.structure
    }

    /// Number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.coords.len()
    }

    /// All coordinates.
    #[inline]
    pub fn coords(&self) -> &[Point3<f32>] {
        &self.coords
    }

    /// Mutable access to all coordinates.
    #[inline]
    pub fn coords_mut(&mut self) -> &mut [Point3<f32>] {
        &mut self.coords
    }

    /// One coordinate.
    #[inline]
    pub fn coord(&self, node: usize) -> Point3<f32> {
        self.coords[node]
    }

    /// Overwrite one coordinate.
    #[inline]
    pub fn set_coord(&mut self, node: usize, p: Point3<f32>) {
        self.coords[node] = p;
    }

    /// Replace every coordinate.
    pub fn set_coords(&mut self, coords: Vec<Point3<f32>>) -> Result<()> {
        if coords.len() != self.coords.len() {
            return Err(SurfaceError::NodeCountMismatch {
                coords: coords.len(),
                topology: self.coords.len(),
            });
        }
        self.coords = coords;
        Ok(())
    }

    /// Take the coordinate array out of the surface.
    pub fn into_coords(self) -> Vec<Point3<f32>> {
        self.coords
    }

    /// Shared topology.
    #[inline]
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Neighborhood cache of the topology.
    #[inline]
    pub fn helper(&self) -> &TopologyHelper {
        self.topology.helper()
    }

    /// Check that a node index is in range.
    pub fn check_node(&self, node: usize) -> Result<()> {
        if node >= self.coords.len() {
            return Err(SurfaceError::NodeOutOfRange {
                node,
                num_nodes: self.coords.len(),
            });
        }
        Ok(())
    }

    /// The three corners of a triangle.
    #[inline]
    pub fn triangle_points(&self, tile: usize) -> [Point3<f32>; 3] {
        let [a, b, c] = self.topology.triangle(tile);
        [self.coords[a], self.coords[b], self.coords[c]]
    }

    /// Area of one triangle.
    #[inline]
    pub fn triangle_area(&self, tile: usize) -> f32 {
        let [a, b, c] = self.triangle_points(tile);
        geometry::triangle_area(&a, &b, &c)
    }

    /// Total area of all triangles.
    pub fn surface_area(&self) -> f32 {
        (0..self.topology.num_triangles())
            .map(|t| f64::from(self.triangle_area(t)))
            .sum::<f64>() as f32
    }

    /// Per-node area: one third of the area of every incident triangle.
    pub fn node_areas(&self) -> Vec<f32> {
        let mut areas = vec![0.0f64; self.coords.len()];
        for (t, tri) in self.topology.triangles().iter().enumerate() {
            let third = f64::from(self.triangle_area(t)) / 3.0;
            for &n in tri {
                areas[n] += third;
            }
        }
        areas.into_iter().map(|a| a as f32).collect()
    }

    /// Mean length of the edges joining neighboring nodes.
    ///
    /// Each unordered neighbor pair is counted once.
    pub fn mean_inter_neighbor_distance(&self) -> f32 {
        let helper = self.helper();
        let mut total = 0.0f64;
        let mut count = 0usize;
        for node in 0..self.coords.len() {
            for &n in helper.neighbors(node) {
                if node < n {
                    total += f64::from((self.coords[node] - self.coords[n]).norm());
                    count += 1;
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            (total / count as f64) as f32
        }
    }

    /// Mean distance from the origin of the connected nodes.
    pub fn spherical_radius(&self) -> f32 {
        let helper = self.helper();
        let mut total = 0.0f64;
        let mut count = 0usize;
        for (node, p) in self.coords.iter().enumerate() {
            if helper.has_neighbors(node) {
                total += f64::from(p.coords.norm());
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            (total / count as f64) as f32
        }
    }

    /// Mean position of the connected nodes.
    pub fn center_of_mass(&self) -> Point3<f32> {
        let helper = self.helper();
        let mut sum = Vector3::<f64>::zeros();
        let mut count = 0usize;
        for (node, p) in self.coords.iter().enumerate() {
            if helper.has_neighbors(node) {
                sum += p.coords.cast::<f64>();
                count += 1;
            }
        }
        if count == 0 {
            return Point3::origin();
        }
        Point3::from((sum / count as f64).cast::<f32>())
    }

    /// Bounding box of all nodes.
    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.coords.iter()).unwrap_or(Bounds {
            min: Point3::origin(),
            max: Point3::origin(),
        })
    }

    /// Move every node by `offset`.
    pub fn translate(&mut self, offset: &Vector3<f32>) {
        for p in &mut self.coords {
            *p += offset;
        }
    }

    /// Translate so the center of mass lies at the origin.
    pub fn translate_center_of_mass_to_origin(&mut self) {
        let com = self.center_of_mass();
        self.translate(&-com.coords);
    }

    /// Rotate every node about the origin.
    pub fn apply_rotation(&mut self, rotation: &Rotation3<f32>) {
        for p in &mut self.coords {
            *p = rotation * *p;
        }
    }

    /// Scale every node about the origin.
    pub fn scale(&mut self, factor: f32) {
        for p in &mut self.coords {
            *p = Point3::from(p.coords * factor);
        }
    }

    /// Scale about the origin so the total triangle area equals `area`.
    pub fn scale_to_area(&mut self, area: f32) -> Result<()> {
        let current = self.surface_area();
        if current <= 0.0 || area <= 0.0 {
            return Err(SurfaceError::DegenerateGeometry(format!(
                "cannot scale surface of area {current} to area {area}"
            )));
        }
        self.scale((area / current).sqrt());
        Ok(())
    }

    /// Place each connected node exactly `radius` from the origin, keeping its
    /// direction.
    pub fn project_to_sphere_of_radius(&mut self, radius: f32) {
        let topology = Arc::clone(&self.topology);
        let helper = topology.helper();
        for (node, p) in self.coords.iter_mut().enumerate() {
            if helper.has_neighbors(node) {
                *p = sphere_point(p, radius);
            }
        }
    }

    /// Center the surface, push it onto a sphere and scale it so its
    /// triangle area equals `area`. Returns the resulting radius.
    pub fn convert_to_sphere_with_area(&mut self, area: f32) -> Result<f32> {
        self.translate_center_of_mass_to_origin();
        self.project_to_sphere_of_radius(1.0);
        self.scale_to_area(area)?;
        self.kind = SurfaceKind::Spherical;
        Ok(self.spherical_radius())
    }

    /// Center the surface and push it onto a sphere of the given radius.
    pub fn convert_to_sphere_with_radius(&mut self, radius: f32) {
        self.translate_center_of_mass_to_origin();
        self.project_to_sphere_of_radius(radius);
        self.kind = SurfaceKind::Spherical;
    }

    /// Detect folded tiles.
    ///
    /// Flat surfaces flag tiles with a negative signed area in the XY plane.
    /// Spherical surfaces flag tiles whose normal points toward the origin.
    /// Other surfaces flag pairs of edge-sharing tiles with opposed normals,
    /// and both tiles of any edge shorter than `1e-5`.
    pub fn crossover_check(&self, method: CrossoverMethod) -> CrossoverReport {
        let triangles = self.topology.triangles();
        let mut tile_flags = vec![false; triangles.len()];

        match method {
            CrossoverMethod::Flat => {
                for (t, &[a, b, c]) in triangles.iter().enumerate() {
                    let area = geometry::signed_triangle_area_2d(
                        &self.coords[a],
                        &self.coords[b],
                        &self.coords[c],
                    );
                    tile_flags[t] = area < 0.0;
                }
            }
            CrossoverMethod::Sphere => {
                for (t, &[a, b, c]) in triangles.iter().enumerate() {
                    let (pa, pb, pc) = (&self.coords[a], &self.coords[b], &self.coords[c]);
                    let normal = (pb - pa).cross(&(pc - pa));
                    let radial = geometry::triangle_centroid(pa, pb, pc).coords;
                    tile_flags[t] = normal.dot(&radial) < 0.0;
                }
            }
            CrossoverMethod::Other => {
                let helper = self.helper();
                let normals: Vec<Option<Vector3<f32>>> = triangles
                    .iter()
                    .map(|&[a, b, c]| {
                        geometry::triangle_normal(&self.coords[a], &self.coords[b], &self.coords[c])
                    })
                    .collect();
                for &(a, b) in helper.edges() {
                    let Some(tiles) = helper.edge_tiles(a, b) else {
                        continue;
                    };
                    if (self.coords[a] - self.coords[b]).norm() < 1e-5 {
                        for &t in tiles {
                            tile_flags[t] = true;
                        }
                        continue;
                    }
                    if tiles.len() == 2 {
                        if let (Some(n0), Some(n1)) = (normals[tiles[0]], normals[tiles[1]]) {
                            if n0.dot(&n1) < 0.0 {
                                tile_flags[tiles[0]] = true;
                                tile_flags[tiles[1]] = true;
                            }
                        }
                    }
                }
            }
        }

        let mut node_flags = vec![false; self.coords.len()];
        let mut tile_crossovers = 0;
        for (t, &flagged) in tile_flags.iter().enumerate() {
            if flagged {
                tile_crossovers += 1;
                for &n in &triangles[t] {
                    node_flags[n] = true;
                }
            }
        }
        let node_crossovers = node_flags.iter().filter(|&&f| f).count();

        CrossoverReport {
            tile_crossovers,
            node_crossovers,
            node_flags,
        }
    }

    /// Crossover check using the method matching the surface kind.
    pub fn crossovers(&self) -> CrossoverReport {
        self.crossover_check(self.kind.crossover_method())
    }

    /// Reverse the winding of every tile whose normal points toward the
    /// origin. Returns the number of tiles flipped.
    pub fn orient_tiles_outward(&mut self) -> usize {
        let flip: Vec<bool> = self
            .topology
            .triangles()
            .iter()
            .map(|&[a, b, c]| {
                let (pa, pb, pc) = (&self.coords[a], &self.coords[b], &self.coords[c]);
                let normal = (pb - pa).cross(&(pc - pa));
                normal.dot(&geometry::triangle_centroid(pa, pb, pc).coords) < 0.0
            })
            .collect();
        let count = flip.iter().filter(|&&f| f).count();
        if count > 0 {
            self.topology = Arc::new(self.topology.with_flipped(&flip));
        }
        count
    }
}

/// `p` pushed along its direction to distance `radius` from the origin.
#[inline]
pub fn sphere_point(p: &Point3<f32>, radius: f32) -> Point3<f32> {
    let len = p.coords.norm();
    if len > 0.0 {
        Point3::from(p.coords * (radius / len))
    } else {
        *p
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Surfaces shared by tests across the crate.

    use super::*;

    /// Flat `(n+1) x (n+1)` grid of unit squares split into triangles.
    pub fn grid_surface(n: usize) -> Surface {
        let mut coords = Vec::new();
        let mut faces = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                coords.push(Point3::new(i as f32, j as f32, 0.0));
            }
        }
        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                let v10 = v00 + 1;
                let v01 = v00 + (n + 1);
                let v11 = v01 + 1;
                faces.push([v00, v10, v11]);
                faces.push([v00, v11, v01]);
            }
        }
        let topo = Topology::new(coords.len(), faces).unwrap();
        Surface::new(SurfaceKind::Flat, coords, Arc::new(topo)).unwrap()
    }

    /// Regular tetrahedron with outward winding.
    pub fn tetrahedron() -> Surface {
        let coords = vec![
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ];
        let faces = vec![[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]];
        let topo = Topology::new(4, faces).unwrap();
        Surface::new(SurfaceKind::Fiducial, coords, Arc::new(topo)).unwrap()
    }

    /// Subdivided icosahedron on the unit sphere.
    pub fn icosphere(subdivisions: usize) -> Surface {
        let (coords, faces) = icosphere_mesh(subdivisions);
        let topo = Topology::new(coords.len(), faces).unwrap();
        Surface::new(SurfaceKind::Spherical, coords, Arc::new(topo)).unwrap()
    }

    /// Vertices and outward-wound faces of a subdivided icosahedron.
    pub fn icosphere_mesh(subdivisions: usize) -> (Vec<Point3<f32>>, Vec<[usize; 3]>) {
        crate::algo::morph::subdivided_icosahedron(subdivisions)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_mismatched_coords() {
        let topo = Arc::new(Topology::new(3, vec![[0, 1, 2]]).unwrap());
        let result = Surface::new(SurfaceKind::Flat, vec![Point3::origin(); 2], topo);
        assert!(matches!(
            result,
            Err(SurfaceError::NodeCountMismatch { coords: 2, topology: 3 })
        ));
    }

    #[test]
    fn test_area_and_mean_distance() {
        let surface = grid_surface(2);
        assert!((surface.surface_area() - 4.0).abs() < 1e-5);

        // 12 unit edges and 4 diagonals, each counted once
        let expected = (12.0 + 4.0 * 2.0f32.sqrt()) / 16.0;
        assert!((surface.mean_inter_neighbor_distance() - expected).abs() < 1e-5);

        let areas = surface.node_areas();
        let total: f32 = areas.iter().sum();
        assert!((total - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_project_to_sphere() {
        let mut surface = icosphere(2);
        surface.scale(3.0);
        for p in surface.coords_mut() {
            p.x *= 1.3;
        }
        surface.project_to_sphere_of_radius(50.0);
        for p in surface.coords() {
            assert!((p.coords.norm() - 50.0).abs() < 1e-4 * 50.0);
        }
        assert!((surface.spherical_radius() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_scale_to_area_and_center() {
        let mut surface = grid_surface(4);
        surface.translate_center_of_mass_to_origin();
        assert!(surface.center_of_mass().coords.norm() < 1e-5);
        surface.scale_to_area(64.0).unwrap();
        assert!((surface.surface_area() - 64.0).abs() < 1e-3);
    }

    #[test]
    fn test_convert_to_sphere_with_area() {
        let mut surface = icosphere(2);
        let area = surface.surface_area() * 4.0;
        let radius = surface.convert_to_sphere_with_area(area).unwrap();
        assert!((radius - 2.0).abs() < 1e-3);
        assert!((surface.surface_area() - area).abs() < 1e-2);
    }

    #[test]
    fn test_flat_crossovers() {
        let mut surface = grid_surface(3);
        assert_eq!(surface.crossovers().tile_crossovers, 0);

        // Push an interior node across its neighbors
        surface.set_coord(5, Point3::new(3.5, 2.5, 0.0));
        let report = surface.crossovers();
        assert!(report.tile_crossovers > 0);
        assert!(report.node_crossovers <= 3 * report.tile_crossovers);
        assert!(report.node_flags[5]);
    }

    #[test]
    fn test_sphere_crossovers_and_orientation() {
        let mut surface = icosphere(1);
        assert_eq!(surface.crossovers().tile_crossovers, 0);

        let flipped = surface.topology().with_flipped(&[true, true]);
        let mut inverted =
            Surface::new(SurfaceKind::Spherical, surface.coords().to_vec(), Arc::new(flipped))
                .unwrap();
        let report = inverted.crossovers();
        assert_eq!(report.tile_crossovers, 2);
        assert!(report.node_crossovers <= 6);

        assert_eq!(inverted.orient_tiles_outward(), 2);
        assert_eq!(inverted.crossovers().tile_crossovers, 0);
        assert_eq!(surface.orient_tiles_outward(), 0);
    }

    #[test]
    fn test_other_crossovers() {
        let surface = tetrahedron();
        let report = surface.crossover_check(CrossoverMethod::Other);
        assert_eq!(report.tile_crossovers, 0);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("flat".parse::<SurfaceKind>().unwrap(), SurfaceKind::Flat);
        assert_eq!(
            "very-inflated".parse::<SurfaceKind>().unwrap(),
            SurfaceKind::VeryInflated
        );
        assert!(SurfaceKind::FlatLobar.is_flat());
        assert_eq!(
            SurfaceKind::Spherical.crossover_method(),
            CrossoverMethod::Sphere
        );
        assert_eq!("Left".parse::<Structure>().unwrap(), Structure::Left);
    }
}
