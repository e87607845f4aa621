//! Geometry primitives.
//!
//! Pure functions on points and triangles used throughout the crate: triangle
//! areas (plain and signed), barycentric coordinates with a configurable
//! tolerance, planar point-in-polygon tests, and unprojection of barycentric
//! weights against a coordinate array.
//!
//! # Example
//!
//! ```
//! use sulcus::geometry::{barycentric, Location, DEFAULT_TOLERANCE};
//! use nalgebra::{Point3, Vector3};
//!
//! let p1 = Point3::new(0.0, 0.0, 0.0);
//! let p2 = Point3::new(1.0, 0.0, 0.0);
//! let p3 = Point3::new(0.0, 1.0, 0.0);
//! let p = Point3::new(0.25, 0.25, 0.0);
//!
//! let bary = barycentric(&p, &p1, &p2, &p3, &Vector3::z(), DEFAULT_TOLERANCE).unwrap();
//! assert_eq!(bary.location, Location::Inside);
//! let w = bary.normalized().unwrap();
//! assert!((w[0] - 0.5).abs() < 1e-6);
//! ```

use nalgebra::{Point3, Rotation3, Vector3};

use crate::error::{Result, SurfaceError};

/// Default barycentric tolerance, as a fraction of the triangle's area.
pub const DEFAULT_TOLERANCE: f32 = 1e-6;

/// Area of the triangle `(p1, p2, p3)`: half the magnitude of the cross product.
#[inline]
pub fn triangle_area(p1: &Point3<f32>, p2: &Point3<f32>, p3: &Point3<f32>) -> f32 {
    0.5 * (p2 - p1).cross(&(p3 - p1)).norm()
}

/// Signed area of a triangle in the XY plane. Counter-clockwise is positive.
#[inline]
pub fn signed_triangle_area_2d(p1: &Point3<f32>, p2: &Point3<f32>, p3: &Point3<f32>) -> f32 {
    0.5 * ((p2.x - p1.x) * (p3.y - p1.y) - (p3.x - p1.x) * (p2.y - p1.y))
}

/// Signed area of a triangle in 3-D.
///
/// The magnitude is the triangle's area; the sign is negative when the
/// triangle's face normal points away from `normal`.
#[inline]
pub fn signed_triangle_area_3d(
    normal: &Vector3<f32>,
    p1: &Point3<f32>,
    p2: &Point3<f32>,
    p3: &Point3<f32>,
) -> f32 {
    let cross = (p2 - p1).cross(&(p3 - p1));
    let area = 0.5 * cross.norm();
    if cross.dot(normal) < 0.0 {
        -area
    } else {
        area
    }
}

/// Unit normal of the triangle `(p1, p2, p3)` following its winding, or `None`
/// when the triangle has no area.
#[inline]
pub fn triangle_normal(
    p1: &Point3<f32>,
    p2: &Point3<f32>,
    p3: &Point3<f32>,
) -> Option<Vector3<f32>> {
    (p2 - p1).cross(&(p3 - p1)).try_normalize(f32::MIN_POSITIVE)
}

/// Centroid of a triangle.
#[inline]
pub fn triangle_centroid(p1: &Point3<f32>, p2: &Point3<f32>, p3: &Point3<f32>) -> Point3<f32> {
    Point3::from((p1.coords + p2.coords + p3.coords) / 3.0)
}

/// Interior angle at `b` of the triangle `(a, b, c)`, in radians.
#[inline]
pub fn angle_at(a: &Point3<f32>, b: &Point3<f32>, c: &Point3<f32>) -> f32 {
    let ba = a - b;
    let bc = c - b;
    let denom = ba.norm() * bc.norm();
    if denom <= f32::MIN_POSITIVE {
        return 0.0;
    }
    (ba.dot(&bc) / denom).clamp(-1.0, 1.0).acos()
}

/// Where a point lies relative to a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// All three sub-areas are positive.
    Inside,
    /// One or two sub-areas are zero and none is negative.
    OnEdge,
    /// At least one sub-area is negative.
    Outside,
}

impl Location {
    /// True for [`Location::Inside`] and [`Location::OnEdge`].
    #[inline]
    pub fn contains(self) -> bool {
        !matches!(self, Location::Outside)
    }
}

/// Signed sub-triangle areas of a point against a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Barycentric {
    /// `areas[i]` is the signed area of the sub-triangle opposite vertex `i`.
    pub areas: [f32; 3],
    /// Classification under the tolerance used to compute it.
    pub location: Location,
}

impl Barycentric {
    /// Sum of the signed sub-areas.
    #[inline]
    pub fn total(&self) -> f32 {
        self.areas[0] + self.areas[1] + self.areas[2]
    }

    /// Weights scaled to sum to one, or `None` when the areas cancel out.
    pub fn normalized(&self) -> Option<[f32; 3]> {
        let total = self.total();
        if total.abs() <= f32::MIN_POSITIVE {
            return None;
        }
        Some([
            self.areas[0] / total,
            self.areas[1] / total,
            self.areas[2] / total,
        ])
    }
}

/// Barycentric coordinates of `p` in the triangle `(p1, p2, p3)`.
///
/// `areas[i]` is the area of the sub-triangle opposite vertex `i`, signed by
/// comparing that sub-triangle's face normal against `normal`. A sub-area is
/// treated as zero when its magnitude is within `tolerance` times the
/// triangle's area.
///
/// Returns [`SurfaceError::DegenerateGeometry`] when the triangle has
/// collapsed to a segment or point.
pub fn barycentric(
    p: &Point3<f32>,
    p1: &Point3<f32>,
    p2: &Point3<f32>,
    p3: &Point3<f32>,
    normal: &Vector3<f32>,
    tolerance: f32,
) -> Result<Barycentric> {
    let area = triangle_area(p1, p2, p3);
    let longest = (p2 - p1)
        .norm_squared()
        .max((p3 - p2).norm_squared())
        .max((p1 - p3).norm_squared());
    if !area.is_finite() || area <= longest * 1e-9 || area <= 0.0 {
        return Err(SurfaceError::DegenerateGeometry(format!(
            "triangle with area {area} has collapsed"
        )));
    }

    let areas = [
        signed_triangle_area_3d(normal, p, p2, p3),
        signed_triangle_area_3d(normal, p1, p, p3),
        signed_triangle_area_3d(normal, p1, p2, p),
    ];

    let tol = tolerance * area;
    let mut negative = false;
    let mut zero = false;
    for &a in &areas {
        if a < -tol {
            negative = true;
        } else if a <= tol {
            zero = true;
        }
    }

    let location = if negative {
        Location::Outside
    } else if zero {
        Location::OnEdge
    } else {
        Location::Inside
    };

    Ok(Barycentric { areas, location })
}

/// Evaluate barycentric weights against a coordinate array.
///
/// Returns `(w1·v1 + w2·v2 + w3·v3) / (w1 + w2 + w3)` when the weight sum is
/// positive and `coords[nodes[0]]` otherwise.
pub fn unproject(nodes: [usize; 3], weights: [f32; 3], coords: &[Point3<f32>]) -> Point3<f32> {
    let total = weights[0] + weights[1] + weights[2];
    if total > 0.0 {
        let sum = coords[nodes[0]].coords * weights[0]
            + coords[nodes[1]].coords * weights[1]
            + coords[nodes[2]].coords * weights[2];
        Point3::from(sum / total)
    } else {
        coords[nodes[0]]
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum corner.
    pub min: Point3<f32>,
    /// Maximum corner.
    pub max: Point3<f32>,
}

impl Bounds {
    /// Bounds of a set of points, or `None` for an empty set.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3<f32>>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for p in iter {
            bounds.include(p);
        }
        Some(bounds)
    }

    /// Grow the bounds to contain `p`.
    pub fn include(&mut self, p: &Point3<f32>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// True if `p` lies inside or on the box.
    pub fn contains(&self, p: &Point3<f32>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Size along each axis.
    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Length of the box diagonal.
    pub fn diagonal(&self) -> f32 {
        self.extent().norm()
    }

    /// Center of the box.
    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }
}

/// Result of a planar point-in-polygon test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonLocation {
    /// The point is inside the polygon.
    Inside,
    /// The point is outside the polygon.
    Outside,
    /// The polygon has fewer than three distinct vertices or consecutive
    /// vertices collapse onto each other.
    Degenerate,
}

/// Test whether `p` lies inside a roughly planar closed polygon.
///
/// The polygon and point are flattened by dropping the coordinate axis most
/// aligned with `normal`, then tested with the even-odd crossing rule. When
/// `bounds` is given, points outside it are rejected early. A trailing vertex
/// that repeats the first one is treated as the closing vertex.
pub fn point_in_polygon_2d(
    p: &Point3<f32>,
    polygon: &[Point3<f32>],
    bounds: Option<&Bounds>,
    normal: &Vector3<f32>,
) -> PolygonLocation {
    let mut vertices = polygon;
    if vertices.len() > 3 && vertices.first() == vertices.last() {
        vertices = &vertices[..vertices.len() - 1];
    }
    if vertices.len() < 3 {
        return PolygonLocation::Degenerate;
    }

    let (u, v) = planar_axes(normal);
    let project = |q: &Point3<f32>| (q[u], q[v]);

    let extent = Bounds::from_points(vertices.iter())
        .map(|b| b.diagonal())
        .unwrap_or(0.0);
    let collapse = (extent * 1e-7).max(f32::MIN_POSITIVE);
    for i in 0..vertices.len() {
        let a = project(&vertices[i]);
        let b = project(&vertices[(i + 1) % vertices.len()]);
        if ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt() <= collapse {
            return PolygonLocation::Degenerate;
        }
    }

    if let Some(b) = bounds {
        let (x, y) = project(p);
        if x < b.min[u] || x > b.max[u] || y < b.min[v] || y > b.max[v] {
            return PolygonLocation::Outside;
        }
    }

    let (px, py) = project(p);
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = project(&vertices[i]);
        let (xj, yj) = project(&vertices[j]);
        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    if inside {
        PolygonLocation::Inside
    } else {
        PolygonLocation::Outside
    }
}

/// The two axes kept when flattening along `normal`.
fn planar_axes(normal: &Vector3<f32>) -> (usize, usize) {
    let (ax, ay, az) = (normal.x.abs(), normal.y.abs(), normal.z.abs());
    if az >= ax && az >= ay {
        (0, 1)
    } else if ay >= ax {
        (2, 0)
    } else {
        (1, 2)
    }
}

/// Intersection of the ray `origin + t·direction` (t > 0) with a plane.
pub fn ray_plane_intersection(
    origin: &Point3<f32>,
    direction: &Vector3<f32>,
    plane_point: &Point3<f32>,
    plane_normal: &Vector3<f32>,
) -> Option<Point3<f32>> {
    let denom = plane_normal.dot(direction);
    if denom.abs() <= 1e-12 {
        return None;
    }
    let t = plane_normal.dot(&(plane_point - origin)) / denom;
    if t <= 0.0 {
        return None;
    }
    Some(origin + direction * t)
}

/// Orthogonal projection of `p` onto a plane.
#[inline]
pub fn project_to_plane(
    p: &Point3<f32>,
    plane_point: &Point3<f32>,
    plane_normal: &Vector3<f32>,
) -> Point3<f32> {
    p - plane_normal * plane_normal.dot(&(p - plane_point))
}

/// Rotation by the same angle (degrees) about x, then y, then z.
pub fn rotation_xyz_degrees(degrees: f32) -> Rotation3<f32> {
    let r = degrees.to_radians();
    Rotation3::from_axis_angle(&Vector3::z_axis(), r)
        * Rotation3::from_axis_angle(&Vector3::y_axis(), r)
        * Rotation3::from_axis_angle(&Vector3::x_axis(), r)
}
