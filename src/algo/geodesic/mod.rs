//! Geodesic distance fields on the surface graph.
//!
//! Distances are shortest paths along surface edges, weighted by Euclidean
//! edge length, optionally restricted to a region of interest.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sulcus::algo::geodesic::{dijkstra, GeodesicOptions};
//! use sulcus::mesh::{Surface, SurfaceKind, Topology};
//! use nalgebra::Point3;
//!
//! let topology = Arc::new(Topology::new(4, vec![[0, 1, 2], [0, 2, 3]]).unwrap());
//! let coords = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let surface = Surface::new(SurfaceKind::Flat, coords, topology).unwrap();
//!
//! let field = dijkstra(&surface, 0, None, &GeodesicOptions::default()).unwrap();
//! assert!((field.distance(1) - 1.0).abs() < 1e-9);
//! assert_eq!(field.parent(1), Some(0));
//! assert_eq!(field.path_to(2).unwrap(), vec![0, 2]);
//! ```

mod dijkstra;

pub use dijkstra::{dijkstra, dijkstra_with_progress, GeodesicOptions, NodeState};

use crate::error::{Result, SurfaceError};

/// Distance and parent of every node relative to one source.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicField {
    source: usize,
    distances: Vec<f64>,
    parents: Vec<Option<usize>>,
}

impl GeodesicField {
    /// Assemble a field from parallel arrays.
    pub fn new(source: usize, distances: Vec<f64>, parents: Vec<Option<usize>>) -> Result<Self> {
        if distances.len() != parents.len() {
            return Err(SurfaceError::NodeCountMismatch {
                coords: distances.len(),
                topology: parents.len(),
            });
        }
        if source >= distances.len() {
            return Err(SurfaceError::NodeOutOfRange {
                node: source,
                num_nodes: distances.len(),
            });
        }
        Ok(Self {
            source,
            distances,
            parents,
        })
    }

    /// The source node.
    #[inline]
    pub fn source(&self) -> usize {
        self.source
    }

    /// Distance of a node, `f64::INFINITY` if unreachable.
    #[inline]
    pub fn distance(&self, node: usize) -> f64 {
        self.distances[node]
    }

    /// All distances.
    #[inline]
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Node from which `node` was settled; `None` for the source and for
    /// unreachable nodes.
    #[inline]
    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parents[node]
    }

    /// All parents.
    #[inline]
    pub fn parents(&self) -> &[Option<usize>] {
        &self.parents
    }

    /// Parents with `-1` for "none", as written to disk.
    pub fn parents_as_i32(&self) -> Vec<i32> {
        self.parents
            .iter()
            .map(|p| p.map_or(-1, |n| n as i32))
            .collect()
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    /// True for a field over zero nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// The reachable node with the largest distance. Ties go to the lower
    /// index.
    pub fn farthest_node(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &d) in self.distances.iter().enumerate() {
            if d.is_finite() && best.map_or(true, |(_, bd)| d > bd) {
                best = Some((i, d));
            }
        }
        best
    }

    /// Nodes from the source to `target`, inclusive.
    ///
    /// Fails with [`SurfaceError::NotConnected`] when `target` is unreachable.
    pub fn path_to(&self, target: usize) -> Result<Vec<usize>> {
        if target >= self.distances.len() {
            return Err(SurfaceError::NodeOutOfRange {
                node: target,
                num_nodes: self.distances.len(),
            });
        }
        if !self.distances[target].is_finite() {
            return Err(SurfaceError::NotConnected {
                from: self.source,
                to: target,
            });
        }

        let mut path = vec![target];
        let mut current = target;
        while let Some(parent) = self.parents[current] {
            path.push(parent);
            current = parent;
            if path.len() > self.distances.len() {
                return Err(SurfaceError::InvalidArgument(format!(
                    "parent chain from node {target} does not terminate"
                )));
            }
        }
        if current != self.source {
            return Err(SurfaceError::NotConnected {
                from: self.source,
                to: target,
            });
        }
        path.reverse();
        Ok(path)
    }

    /// True if the node was reached.
    #[inline]
    pub fn is_reachable(&self, node: usize) -> bool {
        self.distances[node].is_finite()
    }

    /// Number of reached nodes.
    pub fn reachable_count(&self) -> usize {
        self.distances.iter().filter(|d| d.is_finite()).count()
    }

    /// Iterate over `(node, distance)` for every node.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.distances.iter().copied().enumerate()
    }

    /// Iterate over `(node, distance)` for reached nodes only.
    pub fn reachable_iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.iter().filter(|(_, d)| d.is_finite())
    }
}
