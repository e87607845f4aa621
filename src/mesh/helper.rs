//! Cached neighborhood queries derived from a triangle list.

use std::collections::HashMap;

/// The one-ring of a node, walked around the node following tile winding.
///
/// `pairs` holds, for every incident tile `(node, a, b)`, the pair `(a, b)`
/// in ring order, so consecutive ring neighbors always form a real tile with
/// the node. `closed` is true when the walk returns to its start, which is the
/// case for interior nodes of a manifold surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRing {
    /// Neighbors in ring order.
    pub nodes: Vec<usize>,
    /// Consecutive neighbor pairs that form a tile with the node.
    pub pairs: Vec<(usize, usize)>,
    /// Whether the ring wraps around the node.
    pub closed: bool,
}

/// Per-node adjacency built from a topology.
///
/// Holds the sorted neighbor list, the ordered ring and the incident tiles of
/// every node, together with the edge-to-tile map and the boundary edges.
#[derive(Debug, Clone)]
pub struct TopologyHelper {
    num_nodes: usize,
    neighbors: Vec<Vec<usize>>,
    rings: Vec<NodeRing>,
    node_tiles: Vec<Vec<usize>>,
    edge_tiles: HashMap<(usize, usize), Vec<usize>>,
    edges: Vec<(usize, usize)>,
    boundary_edges: Vec<(usize, usize)>,
    boundary_nodes: Vec<bool>,
}

#[inline]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl TopologyHelper {
    /// Build the helper from a triangle list.
    ///
    /// Every index in `triangles` must be `< num_nodes`; [`super::Topology`]
    /// validates this before building.
    pub fn from_triangles(triangles: &[[usize; 3]], num_nodes: usize) -> Self {
        let mut node_tiles: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
        let mut edge_tiles: HashMap<(usize, usize), Vec<usize>> = HashMap::new();

        for (tile, tri) in triangles.iter().enumerate() {
            for i in 0..3 {
                node_tiles[tri[i]].push(tile);
                edge_tiles
                    .entry(edge_key(tri[i], tri[(i + 1) % 3]))
                    .or_default()
                    .push(tile);
            }
        }

        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
        for tri in triangles {
            for i in 0..3 {
                neighbors[tri[i]].push(tri[(i + 1) % 3]);
                neighbors[tri[i]].push(tri[(i + 2) % 3]);
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }

        let mut edges: Vec<(usize, usize)> = edge_tiles.keys().copied().collect();
        edges.sort_unstable();

        let boundary_edges: Vec<(usize, usize)> = edges
            .iter()
            .copied()
            .filter(|e| edge_tiles.get(e).map_or(false, |t| t.len() == 1))
            .collect();

        let mut boundary_nodes = vec![false; num_nodes];
        for &(a, b) in &boundary_edges {
            boundary_nodes[a] = true;
            boundary_nodes[b] = true;
        }

        let rings = (0..num_nodes)
            .map(|node| build_ring(node, &node_tiles[node], triangles))
            .collect();

        Self {
            num_nodes,
            neighbors,
            rings,
            node_tiles,
            edge_tiles,
            edges,
            boundary_edges,
            boundary_nodes,
        }
    }

    /// Number of nodes covered by the helper.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Sorted neighbors of a node; each neighbor appears once.
    #[inline]
    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.neighbors[node]
    }

    /// Number of neighbors of a node.
    #[inline]
    pub fn num_neighbors(&self, node: usize) -> usize {
        self.neighbors[node].len()
    }

    /// Ordered one-ring of a node.
    #[inline]
    pub fn ring(&self, node: usize) -> &NodeRing {
        &self.rings[node]
    }

    /// Tiles incident to a node, in ascending order.
    #[inline]
    pub fn node_tiles(&self, node: usize) -> &[usize] {
        &self.node_tiles[node]
    }

    /// True if the node is used by at least one tile.
    #[inline]
    pub fn has_neighbors(&self, node: usize) -> bool {
        !self.neighbors[node].is_empty()
    }

    /// Per-node flags: true where the node has neighbors.
    pub fn connected_flags(&self) -> Vec<bool> {
        self.neighbors.iter().map(|n| !n.is_empty()).collect()
    }

    /// Number of nodes that have neighbors.
    pub fn num_connected(&self) -> usize {
        self.neighbors.iter().filter(|n| !n.is_empty()).count()
    }

    /// Tiles sharing the edge `(a, b)`.
    #[inline]
    pub fn edge_tiles(&self, a: usize, b: usize) -> Option<&[usize]> {
        self.edge_tiles.get(&edge_key(a, b)).map(Vec::as_slice)
    }

    /// All unique edges `(a, b)` with `a < b`, sorted.
    #[inline]
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Edges used by exactly one tile, sorted.
    #[inline]
    pub fn boundary_edges(&self) -> &[(usize, usize)] {
        &self.boundary_edges
    }

    /// Check if an edge is on the boundary.
    #[inline]
    pub fn is_boundary_edge(&self, a: usize, b: usize) -> bool {
        self.edge_tiles(a, b).map_or(false, |t| t.len() == 1)
    }

    /// Check if a node lies on a boundary edge.
    #[inline]
    pub fn is_boundary_node(&self, node: usize) -> bool {
        self.boundary_nodes[node]
    }
}

/// Walk the tiles around `node` to order its neighbors.
fn build_ring(node: usize, tiles: &[usize], triangles: &[[usize; 3]]) -> NodeRing {
    let mut pending: Vec<(usize, usize)> = tiles
        .iter()
        .filter_map(|&t| {
            let tri = triangles[t];
            let k = tri.iter().position(|&v| v == node)?;
            Some((tri[(k + 1) % 3], tri[(k + 2) % 3]))
        })
        .collect();

    if pending.is_empty() {
        return NodeRing::default();
    }

    // Start where the walk cannot be extended backwards, if such a place exists
    let start_index = pending
        .iter()
        .position(|&(a, _)| !pending.iter().any(|&(_, b)| b == a))
        .unwrap_or_else(|| {
            pending
                .iter()
                .enumerate()
                .min_by_key(|&(_, pair)| pair.0)
                .map(|(i, _)| i)
                .unwrap_or(0)
        });

    let mut nodes = Vec::with_capacity(pending.len() + 1);
    let mut pairs = Vec::with_capacity(pending.len());

    let first = pending.swap_remove(start_index);
    nodes.push(first.0);
    nodes.push(first.1);
    pairs.push(first);
    let start = first.0;
    let mut current = first.1;
    let mut closed = false;

    loop {
        if current == start {
            // Walked all the way round; the start is already recorded
            nodes.pop();
            closed = true;
            break;
        }
        match pending.iter().position(|&(a, _)| a == current) {
            Some(i) => {
                let pair = pending.swap_remove(i);
                pairs.push(pair);
                current = pair.1;
                nodes.push(current);
            }
            None => break,
        }
    }

    if !pending.is_empty() {
        // Non-manifold fan: keep the remaining tiles, ring is no longer a cycle
        closed = false;
        pending.sort_unstable();
        for pair in pending {
            for v in [pair.0, pair.1] {
                if !nodes.contains(&v) {
                    nodes.push(v);
                }
            }
            pairs.push(pair);
        }
    }

    NodeRing {
        nodes,
        pairs,
        closed,
    }
}
