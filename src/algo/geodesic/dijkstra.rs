//! Dijkstra's algorithm over the surface graph.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::debug;

use crate::algo::progress::Progress;
use crate::algo::roi::RoiSelection;
use crate::error::{Result, SurfaceError};
use crate::mesh::Surface;

use super::GeodesicField;

/// Options for [`dijkstra`].
#[derive(Debug, Clone)]
pub struct GeodesicOptions {
    /// Nodes farther than this are left unreached. `None` for no limit.
    pub max_distance: Option<f64>,

    /// Stop once this node is settled.
    pub target: Option<usize>,

    /// Poll for cancellation after this many settled nodes.
    pub checkpoint_interval: usize,
}

impl Default for GeodesicOptions {
    fn default() -> Self {
        Self {
            max_distance: None,
            target: None,
            checkpoint_interval: 4096,
        }
    }
}

impl GeodesicOptions {
    /// Set maximum distance to explore.
    pub fn with_max_distance(mut self, max_dist: f64) -> Self {
        self.max_distance = Some(max_dist);
        self
    }

    /// Set target node for early termination.
    pub fn with_target(mut self, target: usize) -> Self {
        self.target = Some(target);
        self
    }

    /// Set how often cancellation is polled.
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }
}

/// Search state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not reached yet; distance is infinite.
    Unvisited,
    /// Tentative distance known, waiting in the queue.
    Active,
    /// Distance is final.
    Settled,
}

/// Entry in the priority queue.
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    node: usize,
    distance: f64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the smallest distance, then the
        // lowest node index
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Geodesic distances from `source` over the surface graph.
///
/// When `roi` is given, nodes outside it are treated as absent and the source
/// must be selected, else the call fails with
/// [`SurfaceError::SourceNotInRoi`].
pub fn dijkstra(
    surface: &Surface,
    source: usize,
    roi: Option<&RoiSelection>,
    options: &GeodesicOptions,
) -> Result<GeodesicField> {
    dijkstra_with_progress(surface, source, roi, options, &Progress::none())
}

/// [`dijkstra`] with progress reporting and cancellation.
pub fn dijkstra_with_progress(
    surface: &Surface,
    source: usize,
    roi: Option<&RoiSelection>,
    options: &GeodesicOptions,
    progress: &Progress,
) -> Result<GeodesicField> {
    let n = surface.num_nodes();
    surface.check_node(source)?;
    if let Some(roi) = roi {
        if roi.num_nodes() != n {
            return Err(SurfaceError::NodeCountMismatch {
                coords: roi.num_nodes(),
                topology: n,
            });
        }
        if !roi.is_selected(source) {
            return Err(SurfaceError::SourceNotInRoi { node: source });
        }
    }
    let allowed = |node: usize| roi.map_or(true, |r| r.is_selected(node));

    let helper = surface.helper();
    let coords = surface.coords();
    let interval = options.checkpoint_interval.max(1);
    let total = roi.map_or(n, RoiSelection::count);

    let mut distances = vec![f64::INFINITY; n];
    let mut parents: Vec<Option<usize>> = vec![None; n];
    let mut states = vec![NodeState::Unvisited; n];
    let mut heap = BinaryHeap::new();

    distances[source] = 0.0;
    states[source] = NodeState::Active;
    heap.push(QueueEntry {
        node: source,
        distance: 0.0,
    });

    let mut settled = 0usize;
    while let Some(QueueEntry { node: u, distance }) = heap.pop() {
        if states[u] == NodeState::Settled || distance > distances[u] {
            continue;
        }
        if options.max_distance.map_or(false, |max| distance > max) {
            break;
        }

        states[u] = NodeState::Settled;
        settled += 1;
        if settled % interval == 0 {
            progress.report(settled, total, "Geodesic distance");
            progress.checkpoint()?;
        }
        if options.target == Some(u) {
            break;
        }

        let pu = coords[u];
        for &v in helper.neighbors(u) {
            if states[v] == NodeState::Settled || !allowed(v) {
                continue;
            }
            let candidate = distance + f64::from((coords[v] - pu).norm());
            if candidate < distances[v] {
                distances[v] = candidate;
                parents[v] = Some(u);
                states[v] = NodeState::Active;
                heap.push(QueueEntry {
                    node: v,
                    distance: candidate,
                });
            }
        }
    }

    // Only settled distances are final
    for (i, state) in states.iter().enumerate() {
        if *state != NodeState::Settled {
            distances[i] = f64::INFINITY;
            parents[i] = None;
        }
    }

    debug!("geodesic from node {source}: settled {settled} of {total} nodes");
    progress.report(total, total, "Geodesic distance");
    GeodesicField::new(source, distances, parents)
}
