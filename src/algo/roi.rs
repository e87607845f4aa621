//! Region-of-interest selection over surface nodes.
//!
//! An ROI is a boolean per node. Predicates ([`RoiPredicate`]) build a fresh
//! boolean array from a surface and auxiliary data, and a
//! [`SelectionLogic`] merges it into the current selection.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sulcus::algo::roi::{RoiPredicate, RoiSelection, SelectionLogic};
//! use sulcus::mesh::{AttributeSemantics, ScalarMatrix, Surface, SurfaceKind, Topology};
//! use nalgebra::Point3;
//!
//! let topology = Arc::new(Topology::new(4, vec![[0, 1, 2], [0, 2, 3]]).unwrap());
//! let coords = vec![Point3::origin(); 4];
//! let surface = Surface::new(SurfaceKind::Fiducial, coords, topology).unwrap();
//!
//! let mut depth = ScalarMatrix::new(4, AttributeSemantics::Scalar);
//! depth.add_column("depth", vec![0.0, 1.0, 2.0, 3.0]).unwrap();
//!
//! let mut roi = RoiSelection::new(4);
//! roi.select(&surface, SelectionLogic::Normal, &RoiPredicate::AllNodes).unwrap();
//! roi.select(
//!     &surface,
//!     SelectionLogic::And,
//!     &RoiPredicate::MetricRange { metric: &depth, column: 0, min: 0.5, max: 2.5 },
//! )
//! .unwrap();
//! assert_eq!(roi.selected_nodes(), vec![1, 2]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use log::debug;
use nalgebra::{Point3, Vector3};

use crate::error::{Result, SurfaceError};
use crate::geometry::{self, Bounds, PolygonLocation};
use crate::mesh::{Border, LatLonMatrix, PaintMatrix, ScalarMatrix, Surface, TopologyHelper};

use super::geodesic::{dijkstra, GeodesicOptions};

/// How a freshly evaluated predicate merges into the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionLogic {
    /// Replace the selection.
    #[default]
    Normal,
    /// Keep nodes selected in both.
    And,
    /// Keep nodes selected in either.
    Or,
    /// Remove the new nodes from the selection.
    AndNot,
}

impl SelectionLogic {
    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionLogic::Normal => "NORMAL",
            SelectionLogic::And => "AND",
            SelectionLogic::Or => "OR",
            SelectionLogic::AndNot => "AND_NOT",
        }
    }
}

impl fmt::Display for SelectionLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionLogic {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "NORMAL" => Ok(SelectionLogic::Normal),
            "AND" => Ok(SelectionLogic::And),
            "OR" => Ok(SelectionLogic::Or),
            "AND_NOT" | "ANDNOT" => Ok(SelectionLogic::AndNot),
            other => Err(SurfaceError::InvalidArgument(format!(
                "unknown selection logic '{other}'"
            ))),
        }
    }
}

/// Merge `fresh` into `current` under `logic`.
///
/// Both slices must cover the same nodes.
pub fn combine(logic: SelectionLogic, current: &[bool], fresh: &[bool]) -> Result<Vec<bool>> {
    if current.len() != fresh.len() {
        return Err(SurfaceError::NodeCountMismatch {
            coords: fresh.len(),
            topology: current.len(),
        });
    }
    Ok(current
        .iter()
        .zip(fresh)
        .map(|(&c, &f)| match logic {
            SelectionLogic::Normal => f,
            SelectionLogic::And => c && f,
            SelectionLogic::Or => c || f,
            SelectionLogic::AndNot => c && !f,
        })
        .collect())
}

/// A rule that picks nodes of a surface.
#[derive(Debug, Clone, Copy)]
pub enum RoiPredicate<'a> {
    /// Every connected node.
    AllNodes,
    /// Nodes of a flat surface inside a closed border.
    WithinBorder {
        /// Closed polyline; the last link joins the first.
        border: &'a Border,
    },
    /// Nodes whose paint label equals `label`.
    PaintValue {
        /// Paint labels.
        paint: &'a PaintMatrix,
        /// Column to test.
        column: usize,
        /// Label to match.
        label: i32,
    },
    /// Nodes whose paint label has the given name.
    PaintName {
        /// Paint labels.
        paint: &'a PaintMatrix,
        /// Column to test.
        column: usize,
        /// Name resolved through the label table.
        name: &'a str,
    },
    /// Nodes whose latitude and longitude both fall in range. A longitude
    /// range with `min > max` wraps through 180 degrees.
    LatLonRange {
        /// Latitude and longitude values.
        latlon: &'a LatLonMatrix,
        /// Column to test.
        column: usize,
        /// Inclusive latitude range.
        lat: (f32, f32),
        /// Inclusive longitude range.
        lon: (f32, f32),
    },
    /// Nodes with `min <= metric <= max`.
    MetricRange {
        /// Metric values.
        metric: &'a ScalarMatrix,
        /// Column to test.
        column: usize,
        /// Inclusive minimum.
        min: f32,
        /// Inclusive maximum.
        max: f32,
    },
    /// Metric range, restricted to the in-range component containing `seed`.
    MetricConnected {
        /// Metric values.
        metric: &'a ScalarMatrix,
        /// Column to test.
        column: usize,
        /// Inclusive minimum.
        min: f32,
        /// Inclusive maximum.
        max: f32,
        /// Node the component must contain.
        seed: usize,
    },
    /// Nodes with `min <= shape <= max`.
    ShapeRange {
        /// Surface shape values.
        shape: &'a ScalarMatrix,
        /// Column to test.
        column: usize,
        /// Inclusive minimum.
        min: f32,
        /// Inclusive maximum.
        max: f32,
    },
    /// Shape range, restricted to the in-range component containing `seed`.
    ShapeConnected {
        /// Surface shape values.
        shape: &'a ScalarMatrix,
        /// Column to test.
        column: usize,
        /// Inclusive minimum.
        min: f32,
        /// Inclusive maximum.
        max: f32,
        /// Node the component must contain.
        seed: usize,
    },
    /// Nodes touching a folded tile.
    Crossovers,
    /// Nodes on a topological boundary edge.
    BoundaryEdges,
    /// Nodes within a geodesic distance of `seed`.
    WithinGeodesicDistance {
        /// Source node.
        seed: usize,
        /// Maximum distance.
        distance: f64,
    },
}

impl RoiPredicate<'_> {
    /// Evaluate against a surface, producing one flag per node.
    pub fn evaluate(&self, surface: &Surface) -> Result<Vec<bool>> {
        let n = surface.num_nodes();
        let helper = surface.helper();
        match *self {
            RoiPredicate::AllNodes => Ok(helper.connected_flags()),
            RoiPredicate::WithinBorder { border } => nodes_within_border(surface, border),
            RoiPredicate::PaintValue {
                paint,
                column,
                label,
            } => {
                check_rows(paint.num_nodes(), n)?;
                Ok(paint.values(column)?.iter().map(|&v| v == label).collect())
            }
            RoiPredicate::PaintName {
                paint,
                column,
                name,
            } => {
                let label = paint.labels().label(name).ok_or_else(|| {
                    SurfaceError::InvalidArgument(format!("no paint label named '{name}'"))
                })?;
                RoiPredicate::PaintValue {
                    paint,
                    column,
                    label,
                }
                .evaluate(surface)
            }
            RoiPredicate::LatLonRange {
                latlon,
                column,
                lat,
                lon,
            } => {
                check_rows(latlon.num_nodes(), n)?;
                let lon_ok = |v: f32| {
                    if lon.0 <= lon.1 {
                        v >= lon.0 && v <= lon.1
                    } else {
                        v >= lon.0 || v <= lon.1
                    }
                };
                Ok(latlon
                    .values(column)?
                    .iter()
                    .map(|&[la, lo]| la >= lat.0 && la <= lat.1 && lon_ok(lo))
                    .collect())
            }
            RoiPredicate::MetricRange {
                metric: values,
                column,
                min,
                max,
            }
            | RoiPredicate::ShapeRange {
                shape: values,
                column,
                min,
                max,
            } => {
                check_rows(values.num_nodes(), n)?;
                Ok(in_range(values.values(column)?, min, max))
            }
            RoiPredicate::MetricConnected {
                metric: values,
                column,
                min,
                max,
                seed,
            }
            | RoiPredicate::ShapeConnected {
                shape: values,
                column,
                min,
                max,
                seed,
            } => {
                check_rows(values.num_nodes(), n)?;
                surface.check_node(seed)?;
                let passing = in_range(values.values(column)?, min, max);
                Ok(component_containing(helper, &passing, seed))
            }
            RoiPredicate::Crossovers => Ok(surface.crossovers().node_flags),
            RoiPredicate::BoundaryEdges => Ok((0..n).map(|i| helper.is_boundary_node(i)).collect()),
            RoiPredicate::WithinGeodesicDistance { seed, distance } => {
                let field = dijkstra(
                    surface,
                    seed,
                    None,
                    &GeodesicOptions::default().with_max_distance(distance),
                )?;
                Ok((0..n).map(|i| field.is_reachable(i)).collect())
            }
        }
    }

    /// Short human-readable description.
    pub fn describe(&self) -> String {
        match *self {
            RoiPredicate::AllNodes => "all nodes".to_string(),
            RoiPredicate::WithinBorder { border } => format!("nodes within border '{}'", border.name),
            RoiPredicate::PaintValue { column, label, .. } => {
                format!("paint column {column} equal to label {label}")
            }
            RoiPredicate::PaintName { column, name, .. } => {
                format!("paint column {column} named '{name}'")
            }
            RoiPredicate::LatLonRange { lat, lon, .. } => format!(
                "latitude {} to {}, longitude {} to {}",
                lat.0, lat.1, lon.0, lon.1
            ),
            RoiPredicate::MetricRange { column, min, max, .. } => {
                format!("metric column {column} in [{min}, {max}]")
            }
            RoiPredicate::MetricConnected {
                column,
                min,
                max,
                seed,
                ..
            } => format!("metric column {column} in [{min}, {max}] connected to node {seed}"),
            RoiPredicate::ShapeRange { column, min, max, .. } => {
                format!("shape column {column} in [{min}, {max}]")
            }
            RoiPredicate::ShapeConnected {
                column,
                min,
                max,
                seed,
                ..
            } => format!("shape column {column} in [{min}, {max}] connected to node {seed}"),
            RoiPredicate::Crossovers => "crossover nodes".to_string(),
            RoiPredicate::BoundaryEdges => "boundary nodes".to_string(),
            RoiPredicate::WithinGeodesicDistance { seed, distance } => {
                format!("within geodesic distance {distance} of node {seed}")
            }
        }
    }
}

fn check_rows(rows: usize, nodes: usize) -> Result<()> {
    if rows != nodes {
        return Err(SurfaceError::NodeCountMismatch {
            coords: rows,
            topology: nodes,
        });
    }
    Ok(())
}

fn in_range(values: &[f32], min: f32, max: f32) -> Vec<bool> {
    values.iter().map(|&v| v >= min && v <= max).collect()
}

/// Flood fill over `passing` nodes starting at `seed`.
fn component_containing(helper: &TopologyHelper, passing: &[bool], seed: usize) -> Vec<bool> {
    let mut result = vec![false; passing.len()];
    if !passing[seed] {
        return result;
    }
    let mut queue = VecDeque::from([seed]);
    result[seed] = true;
    while let Some(node) = queue.pop_front() {
        for &n in helper.neighbors(node) {
            if passing[n] && !result[n] {
                result[n] = true;
                queue.push_back(n);
            }
        }
    }
    result
}

fn nodes_within_border(surface: &Surface, border: &Border) -> Result<Vec<bool>> {
    if !surface.kind().is_flat() {
        return Err(SurfaceError::InvalidArgument(format!(
            "border selection needs a flat surface, got {}",
            surface.kind()
        )));
    }
    let polygon = border.positions();
    let bounds = Bounds::from_points(polygon.iter());
    let normal = Vector3::z();
    let helper = surface.helper();

    let mut flags = vec![false; surface.num_nodes()];
    for (node, p) in surface.coords().iter().enumerate() {
        if !helper.has_neighbors(node) {
            continue;
        }
        match geometry::point_in_polygon_2d(p, &polygon, bounds.as_ref(), &normal) {
            PolygonLocation::Inside => flags[node] = true,
            PolygonLocation::Outside => {}
            PolygonLocation::Degenerate => {
                return Err(SurfaceError::DegenerateGeometry(format!(
                    "border '{}' collapses to a degenerate polygon",
                    border.name
                )));
            }
        }
    }
    Ok(flags)
}

/// Nodes at the extremes of each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtremeNodes {
    /// Smallest x.
    pub min_x: usize,
    /// Largest x.
    pub max_x: usize,
    /// Smallest y.
    pub min_y: usize,
    /// Largest y.
    pub max_y: usize,
    /// Smallest z.
    pub min_z: usize,
    /// Largest z.
    pub max_z: usize,
}

/// Boolean selection over the nodes of a surface.
///
/// The cached count always equals the number of selected nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiSelection {
    selected: Vec<bool>,
    count: usize,
    history: Vec<String>,
}

impl RoiSelection {
    /// Empty selection over `num_nodes` nodes.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            selected: vec![false; num_nodes],
            count: 0,
            history: Vec::new(),
        }
    }

    /// Selection holding exactly `nodes`.
    pub fn from_nodes<I: IntoIterator<Item = usize>>(num_nodes: usize, nodes: I) -> Result<Self> {
        let mut roi = Self::new(num_nodes);
        for node in nodes {
            if node >= num_nodes {
                return Err(SurfaceError::NodeOutOfRange { node, num_nodes });
            }
            roi.set(node, true);
        }
        Ok(roi)
    }

    /// Selection from one flag per node.
    pub fn from_flags(flags: Vec<bool>) -> Self {
        let count = flags.iter().filter(|&&f| f).count();
        Self {
            selected: flags,
            count,
            history: Vec::new(),
        }
    }

    /// Number of nodes covered.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.selected.len()
    }

    /// Number of selected nodes.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// True when nothing is selected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether a node is selected.
    #[inline]
    pub fn is_selected(&self, node: usize) -> bool {
        self.selected[node]
    }

    /// One flag per node.
    #[inline]
    pub fn flags(&self) -> &[bool] {
        &self.selected
    }

    /// Selected node indices, ascending.
    pub fn selected_nodes(&self) -> Vec<usize> {
        self.selected
            .iter()
            .enumerate()
            .filter(|(_, &s)| s)
            .map(|(i, _)| i)
            .collect()
    }

    /// First selected node.
    pub fn first_selected(&self) -> Option<usize> {
        self.selected.iter().position(|&s| s)
    }

    /// Select or deselect one node.
    pub fn set(&mut self, node: usize, value: bool) {
        let old = std::mem::replace(&mut self.selected[node], value);
        match (old, value) {
            (false, true) => self.count += 1,
            (true, false) => self.count -= 1,
            _ => {}
        }
    }

    /// Deselect everything.
    pub fn clear(&mut self) {
        self.selected.fill(false);
        self.count = 0;
        self.history.push("cleared".to_string());
    }

    /// Evaluate `predicate` and merge it in. Returns the new count.
    ///
    /// On error the selection is left unchanged.
    pub fn select(
        &mut self,
        surface: &Surface,
        logic: SelectionLogic,
        predicate: &RoiPredicate<'_>,
    ) -> Result<usize> {
        if surface.num_nodes() != self.num_nodes() {
            return Err(SurfaceError::NodeCountMismatch {
                coords: surface.num_nodes(),
                topology: self.num_nodes(),
            });
        }
        let fresh = predicate.evaluate(surface)?;
        let description = predicate.describe();
        self.apply(logic, &fresh, &description)?;
        debug!("ROI {logic} {description}: {} nodes selected", self.count);
        Ok(self.count)
    }

    /// Merge raw flags in under `logic`.
    ///
    /// Fails with [`SurfaceError::NodeCountMismatch`] when `fresh` does not
    /// have one flag per node; the selection is then left unchanged.
    pub fn apply(&mut self, logic: SelectionLogic, fresh: &[bool], description: &str) -> Result<()> {
        let merged = combine(logic, &self.selected, fresh)?;
        self.count = merged.iter().filter(|&&f| f).count();
        self.selected = merged;
        self.history.push(format!("{logic} {description}"));
        Ok(())
    }

    /// Intersect with another selection over the same nodes.
    pub fn and_with(&mut self, other: &RoiSelection) -> Result<()> {
        self.apply(SelectionLogic::And, &other.selected, "another ROI")
    }

    /// Union with another selection over the same nodes.
    pub fn or_with(&mut self, other: &RoiSelection) -> Result<()> {
        self.apply(SelectionLogic::Or, &other.selected, "another ROI")
    }

    /// Flip every connected node. Nodes without neighbors stay as they are.
    pub fn invert(&mut self, helper: &TopologyHelper) {
        for node in 0..self.selected.len() {
            if helper.has_neighbors(node) {
                let value = !self.selected[node];
                self.set(node, value);
            }
        }
        self.history.push("inverted".to_string());
    }

    /// `passes` rounds of adding every unselected node with a selected
    /// neighbor.
    pub fn dilate(&mut self, helper: &TopologyHelper, passes: usize) {
        for _ in 0..passes {
            self.grow(helper, |_| true);
        }
        self.history.push(format!("dilated {passes}"));
    }

    /// Dilation limited to nodes whose paint label equals `label`.
    pub fn dilate_with_paint(
        &mut self,
        helper: &TopologyHelper,
        passes: usize,
        paint: &PaintMatrix,
        column: usize,
        label: i32,
    ) -> Result<()> {
        check_rows(paint.num_nodes(), self.num_nodes())?;
        let values = paint.values(column)?;
        for _ in 0..passes {
            self.grow(helper, |n| values[n] == label);
        }
        self.history
            .push(format!("dilated {passes} within paint label {label}"));
        Ok(())
    }

    fn grow<F: Fn(usize) -> bool>(&mut self, helper: &TopologyHelper, allowed: F) {
        let added: Vec<usize> = (0..self.selected.len())
            .filter(|&n| {
                !self.selected[n]
                    && allowed(n)
                    && helper.neighbors(n).iter().any(|&m| self.selected[m])
            })
            .collect();
        for n in added {
            self.set(n, true);
        }
    }

    /// `passes` rounds of removing every selected node with an unselected
    /// neighbor.
    pub fn erode(&mut self, helper: &TopologyHelper, passes: usize) {
        for _ in 0..passes {
            let removed: Vec<usize> = (0..self.selected.len())
                .filter(|&n| {
                    self.selected[n] && helper.neighbors(n).iter().any(|&m| !self.selected[m])
                })
                .collect();
            for n in removed {
                self.set(n, false);
            }
        }
        self.history.push(format!("eroded {passes}"));
    }

    /// Keep only selected nodes that have an unselected neighbor or lie on a
    /// topological boundary.
    pub fn boundary_only(&mut self, helper: &TopologyHelper) {
        let interior: Vec<usize> = (0..self.selected.len())
            .filter(|&n| {
                self.selected[n]
                    && !helper.is_boundary_node(n)
                    && helper.neighbors(n).iter().all(|&m| self.selected[m])
            })
            .collect();
        for n in interior {
            self.set(n, false);
        }
        self.history.push("boundary only".to_string());
    }

    /// Connected pieces of the selection, largest first.
    pub fn islands(&self, helper: &TopologyHelper) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.selected.len()];
        let mut islands = Vec::new();
        for seed in 0..self.selected.len() {
            if !self.selected[seed] || seen[seed] {
                continue;
            }
            let piece = component_containing(helper, &self.selected, seed);
            let mut nodes = Vec::new();
            for (i, &inside) in piece.iter().enumerate() {
                if inside {
                    seen[i] = true;
                    nodes.push(i);
                }
            }
            islands.push(nodes);
        }
        islands.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
        islands
    }

    /// Deselect islands with fewer than `min_nodes` nodes. Returns the number
    /// of islands removed.
    pub fn discard_islands(&mut self, helper: &TopologyHelper, min_nodes: usize) -> usize {
        let mut removed = 0;
        for island in self.islands(helper) {
            if island.len() < min_nodes {
                removed += 1;
                for n in island {
                    self.set(n, false);
                }
            }
        }
        self.history
            .push(format!("discarded {removed} islands under {min_nodes} nodes"));
        removed
    }

    /// Keep only the largest island.
    pub fn keep_largest_island(&mut self, helper: &TopologyHelper) {
        for island in self.islands(helper).into_iter().skip(1) {
            for n in island {
                self.set(n, false);
            }
        }
        self.history.push("kept largest island".to_string());
    }

    /// Deselect nodes outside `bounds`.
    pub fn limit_extent(&mut self, coords: &[Point3<f32>], bounds: &Bounds) {
        for (node, p) in coords.iter().enumerate().take(self.selected.len()) {
            if self.selected[node] && !bounds.contains(p) {
                self.set(node, false);
            }
        }
        self.history.push("limited extent".to_string());
    }

    /// Mean position of the selected nodes.
    pub fn center_of_gravity(&self, coords: &[Point3<f32>]) -> Option<Point3<f32>> {
        if self.count == 0 {
            return None;
        }
        let sum = self
            .selected_nodes()
            .into_iter()
            .fold(Vector3::<f64>::zeros(), |acc, n| acc + coords[n].coords.cast::<f64>());
        Some(Point3::from((sum / self.count as f64).cast::<f32>()))
    }

    /// Bounding box of the selected nodes.
    pub fn extent(&self, coords: &[Point3<f32>]) -> Option<Bounds> {
        Bounds::from_points(self.selected_nodes().into_iter().map(|n| &coords[n]))
    }

    /// Tiles with all three nodes selected.
    pub fn tiles_in_roi(&self, surface: &Surface) -> Vec<usize> {
        surface
            .topology()
            .triangles()
            .iter()
            .enumerate()
            .filter(|(_, tri)| tri.iter().all(|&n| self.selected[n]))
            .map(|(t, _)| t)
            .collect()
    }

    /// Area of the tiles with all three nodes selected.
    pub fn surface_area(&self, surface: &Surface) -> f32 {
        self.tiles_in_roi(surface)
            .into_iter()
            .map(|t| f64::from(surface.triangle_area(t)))
            .sum::<f64>() as f32
    }

    /// Selected node closest to `p`. Ties go to the lower index.
    pub fn nearest_selected_node(&self, coords: &[Point3<f32>], p: &Point3<f32>) -> Option<usize> {
        self.selected_nodes()
            .into_iter()
            .map(|n| (n, (coords[n] - p).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(n, _)| n)
    }

    /// Selected nodes with the smallest and largest value along each axis.
    pub fn extreme_nodes(&self, coords: &[Point3<f32>]) -> Option<ExtremeNodes> {
        let nodes = self.selected_nodes();
        let first = *nodes.first()?;
        let mut ext = ExtremeNodes {
            min_x: first,
            max_x: first,
            min_y: first,
            max_y: first,
            min_z: first,
            max_z: first,
        };
        for &n in &nodes[1..] {
            let p = coords[n];
            if p.x < coords[ext.min_x].x {
                ext.min_x = n;
            }
            if p.x > coords[ext.max_x].x {
                ext.max_x = n;
            }
            if p.y < coords[ext.min_y].y {
                ext.min_y = n;
            }
            if p.y > coords[ext.max_y].y {
                ext.max_y = n;
            }
            if p.z < coords[ext.min_z].z {
                ext.min_z = n;
            }
            if p.z > coords[ext.max_z].z {
                ext.max_z = n;
            }
        }
        Some(ext)
    }

    /// One line per operation applied, oldest first.
    pub fn description(&self) -> String {
        self.history.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::grid_surface;
    use crate::mesh::{AttributeSemantics, LabelTable, SurfaceKind};

    /// Nodes within `radius` hops of `center`.
    fn hop_ball(helper: &TopologyHelper, center: usize, radius: usize) -> RoiSelection {
        let mut roi = RoiSelection::from_nodes(helper.num_nodes(), [center]).unwrap();
        roi.dilate(helper, radius);
        roi
    }

    #[test]
    fn test_combine() {
        let a = [true, true, false, false];
        let b = [true, false, true, false];
        assert_eq!(combine(SelectionLogic::Normal, &a, &b).unwrap(), b.to_vec());
        assert_eq!(combine(SelectionLogic::And, &a, &b).unwrap(), vec![true, false, false, false]);
        assert_eq!(combine(SelectionLogic::Or, &a, &b).unwrap(), vec![true, true, true, false]);
        assert_eq!(combine(SelectionLogic::AndNot, &a, &b).unwrap(), vec![false, true, false, false]);
        assert_eq!("and_not".parse::<SelectionLogic>().unwrap(), SelectionLogic::AndNot);
        assert!(matches!(
            combine(SelectionLogic::Or, &a, &b[..3]),
            Err(SurfaceError::NodeCountMismatch { coords: 3, topology: 4 })
        ));
    }

    #[test]
    fn test_combining_mismatched_selections_fails() {
        let mut roi = RoiSelection::from_nodes(10, [1, 2, 3, 9]).unwrap();
        let other = RoiSelection::from_nodes(4, [0, 1]).unwrap();
        let description = roi.description();

        assert!(matches!(
            roi.and_with(&other),
            Err(SurfaceError::NodeCountMismatch { coords: 4, topology: 10 })
        ));
        assert!(roi.or_with(&other).is_err());
        assert!(roi.apply(SelectionLogic::Normal, &[true; 11], "flags").is_err());
        assert_eq!(roi.num_nodes(), 10);
        assert_eq!(roi.count(), 4);
        assert_eq!(roi.selected_nodes(), vec![1, 2, 3, 9]);
        assert_eq!(roi.description(), description);

        let same = RoiSelection::from_nodes(10, [2, 5]).unwrap();
        roi.and_with(&same).unwrap();
        assert_eq!(roi.selected_nodes(), vec![2]);
    }

    #[test]
    fn test_count_invariant() {
        let surface = grid_surface(3);
        let helper = surface.helper();
        let mut roi = RoiSelection::new(16);
        roi.select(&surface, SelectionLogic::Normal, &RoiPredicate::AllNodes)
            .unwrap();
        assert_eq!(roi.count(), 16);

        // Erosion only bites where an unselected neighbor exists
        roi.erode(helper, 1);
        assert_eq!(roi.count(), 16);

        roi.set(0, false);
        roi.erode(helper, 1);
        assert_eq!(roi.count(), roi.flags().iter().filter(|&&f| f).count());
        assert_eq!(roi.count(), 12);
        assert!(!roi.is_selected(1) && !roi.is_selected(4) && !roi.is_selected(5));
    }

    #[test]
    fn test_erode_then_dilate_restores_thick_blob() {
        let surface = grid_surface(10);
        let helper = surface.helper();
        let center = 5 * 11 + 5;
        let blob = hop_ball(helper, center, 3);

        let mut roi = blob.clone();
        roi.erode(helper, 1);
        assert_eq!(roi.selected_nodes(), hop_ball(helper, center, 2).selected_nodes());
        roi.dilate(helper, 1);
        assert_eq!(roi.flags(), blob.flags());
    }

    #[test]
    fn test_invert_twice() {
        let surface = grid_surface(3);
        let helper = surface.helper();
        let mut roi = RoiSelection::from_nodes(16, [0, 5, 7]).unwrap();
        let original = roi.flags().to_vec();
        roi.invert(helper);
        assert_eq!(roi.count(), 13);
        roi.invert(helper);
        assert_eq!(roi.flags(), original.as_slice());
    }

    #[test]
    fn test_paint_predicates() {
        let surface = grid_surface(1);
        let mut paint = PaintMatrix::new(4, AttributeSemantics::Paint);
        paint.add_column("areas", vec![0, 1, 1, 2]).unwrap();
        paint.set_labels(LabelTable::new(vec!["???".into(), "V1".into(), "V2".into()]));

        let mut roi = RoiSelection::new(4);
        roi.select(
            &surface,
            SelectionLogic::Normal,
            &RoiPredicate::PaintName {
                paint: &paint,
                column: 0,
                name: "V1",
            },
        )
        .unwrap();
        assert_eq!(roi.selected_nodes(), vec![1, 2]);

        roi.select(
            &surface,
            SelectionLogic::Or,
            &RoiPredicate::PaintValue {
                paint: &paint,
                column: 0,
                label: 2,
            },
        )
        .unwrap();
        assert_eq!(roi.selected_nodes(), vec![1, 2, 3]);
        assert!(roi.description().contains("OR paint column 0 equal to label 2"));

        let missing = RoiPredicate::PaintName {
            paint: &paint,
            column: 0,
            name: "MT",
        };
        assert!(roi.select(&surface, SelectionLogic::Normal, &missing).is_err());
        assert_eq!(roi.count(), 3);
    }

    #[test]
    fn test_metric_connected() {
        // Two in-range patches separated by an out-of-range column
        let surface = grid_surface(4);
        let values: Vec<f32> = (0..25)
            .map(|i| if i % 5 == 2 { 10.0 } else { 1.0 })
            .collect();
        let mut metric = ScalarMatrix::new(25, AttributeSemantics::Scalar);
        metric.add_column("m", values).unwrap();

        let mut roi = RoiSelection::new(25);
        roi.select(
            &surface,
            SelectionLogic::Normal,
            &RoiPredicate::MetricRange {
                metric: &metric,
                column: 0,
                min: 0.0,
                max: 2.0,
            },
        )
        .unwrap();
        assert_eq!(roi.count(), 20);
        assert_eq!(roi.islands(surface.helper()).len(), 2);

        roi.select(
            &surface,
            SelectionLogic::Normal,
            &RoiPredicate::ShapeConnected {
                shape: &metric,
                column: 0,
                min: 0.0,
                max: 2.0,
                seed: 0,
            },
        )
        .unwrap();
        assert_eq!(roi.count(), 10);
        assert!(roi.selected_nodes().iter().all(|&n| n % 5 < 2));
    }

    #[test]
    fn test_latlon_wraps() {
        let surface = grid_surface(1);
        let mut latlon = LatLonMatrix::new(4, AttributeSemantics::LatLon);
        latlon
            .add_column(
                "ll",
                vec![[0.0, 170.0], [0.0, -170.0], [0.0, 0.0], [80.0, 175.0]],
            )
            .unwrap();
        let mut roi = RoiSelection::new(4);
        roi.select(
            &surface,
            SelectionLogic::Normal,
            &RoiPredicate::LatLonRange {
                latlon: &latlon,
                column: 0,
                lat: (-10.0, 10.0),
                lon: (160.0, -160.0),
            },
        )
        .unwrap();
        assert_eq!(roi.selected_nodes(), vec![0, 1]);
    }

    #[test]
    fn test_within_border() {
        let surface = grid_surface(4);
        let square = Border::from_positions(
            "square",
            [
                Point3::new(0.5, 0.5, 0.0),
                Point3::new(2.5, 0.5, 0.0),
                Point3::new(2.5, 2.5, 0.0),
                Point3::new(0.5, 2.5, 0.0),
            ],
        );
        let mut roi = RoiSelection::new(25);
        roi.select(
            &surface,
            SelectionLogic::Normal,
            &RoiPredicate::WithinBorder { border: &square },
        )
        .unwrap();
        assert_eq!(roi.selected_nodes(), vec![6, 7, 11, 12]);

        let collapsed = Border::from_positions(
            "line",
            [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
        );
        let err = roi
            .select(
                &surface,
                SelectionLogic::Normal,
                &RoiPredicate::WithinBorder { border: &collapsed },
            )
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "DEGENERATE_GEOMETRY");
        assert_eq!(roi.count(), 4);

        let mut fiducial = surface.clone();
        fiducial.set_kind(SurfaceKind::Fiducial);
        assert!(RoiPredicate::WithinBorder { border: &square }
            .evaluate(&fiducial)
            .is_err());
    }

    #[test]
    fn test_crossovers_and_boundary() {
        let mut surface = grid_surface(3);
        surface.set_coord(5, Point3::new(3.5, 2.5, 0.0));
        let crossovers = RoiPredicate::Crossovers.evaluate(&surface).unwrap();
        assert!(crossovers[5]);

        let boundary = RoiPredicate::BoundaryEdges.evaluate(&surface).unwrap();
        assert_eq!(boundary.iter().filter(|&&b| b).count(), 12);
        assert!(!boundary[5]);
    }

    #[test]
    fn test_islands_and_geometry() {
        let surface = grid_surface(4);
        let helper = surface.helper();
        let mut roi = RoiSelection::from_nodes(25, [0, 1, 5, 6, 24]).unwrap();
        assert_eq!(roi.islands(helper).len(), 2);
        assert_eq!(roi.tiles_in_roi(&surface).len(), 2);
        assert!((roi.surface_area(&surface) - 1.0).abs() < 1e-6);

        let ext = roi.extreme_nodes(surface.coords()).unwrap();
        assert_eq!((ext.min_x, ext.max_x), (0, 24));
        assert_eq!(
            roi.nearest_selected_node(surface.coords(), &Point3::new(3.6, 3.9, 0.0)),
            Some(24)
        );

        assert_eq!(roi.discard_islands(helper, 2), 1);
        assert_eq!(roi.count(), 4);

        let cog = roi.center_of_gravity(surface.coords()).unwrap();
        assert!((cog - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-6);

        roi.boundary_only(helper);
        assert_eq!(roi.count(), 4);

        roi.limit_extent(
            surface.coords(),
            &Bounds {
                min: Point3::new(-1.0, -1.0, -1.0),
                max: Point3::new(0.5, 2.0, 1.0),
            },
        );
        assert_eq!(roi.selected_nodes(), vec![0, 5]);
    }

    #[test]
    fn test_geodesic_predicate_and_paint_dilation() {
        let surface = grid_surface(4);
        let helper = surface.helper();
        let mut roi = RoiSelection::new(25);
        roi.select(
            &surface,
            SelectionLogic::Normal,
            &RoiPredicate::WithinGeodesicDistance {
                seed: 0,
                distance: 1.0,
            },
        )
        .unwrap();
        assert_eq!(roi.selected_nodes(), vec![0, 1, 5]);

        let mut paint = PaintMatrix::new(25, AttributeSemantics::Paint);
        paint
            .add_column("p", (0..25).map(|i| i32::from(i % 5 == 0)).collect())
            .unwrap();
        let mut seed = RoiSelection::from_nodes(25, [0]).unwrap();
        seed.dilate_with_paint(helper, 10, &paint, 0, 1).unwrap();
        assert_eq!(seed.selected_nodes(), vec![0, 5, 10, 15, 20]);
        seed.keep_largest_island(helper);
        assert_eq!(seed.count(), 5);
    }
}
