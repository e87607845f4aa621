//! Triangle topology shared by the surfaces of one subject.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Result, SurfaceError};

use super::helper::TopologyHelper;

/// How a topology was cut, as recorded in topology files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TopologyType {
    /// Closed surface with holes (e.g. medial wall removed).
    Open,
    /// Closed surface.
    Closed,
    /// Cut for flattening.
    Cut,
    /// Cut for lobar flattening.
    LobarCut,
    /// Not recorded.
    #[default]
    Unknown,
}

impl TopologyType {
    /// Canonical name used in files.
    pub fn as_str(self) -> &'static str {
        match self {
            TopologyType::Open => "OPEN",
            TopologyType::Closed => "CLOSED",
            TopologyType::Cut => "CUT",
            TopologyType::LobarCut => "LOBAR_CUT",
            TopologyType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TopologyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopologyType {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(TopologyType::Open),
            "CLOSED" => Ok(TopologyType::Closed),
            "CUT" => Ok(TopologyType::Cut),
            "LOBAR_CUT" | "LOBARCUT" => Ok(TopologyType::LobarCut),
            "UNKNOWN" => Ok(TopologyType::Unknown),
            other => Err(SurfaceError::InvalidArgument(format!(
                "unknown topology type '{other}'"
            ))),
        }
    }
}

/// An ordered list of triangles over `num_nodes` nodes.
///
/// The neighborhood cache ([`TopologyHelper`]) is built lazily on first use
/// and dropped whenever the triangle list changes.
#[derive(Debug, Clone)]
pub struct Topology {
    triangles: Vec<[usize; 3]>,
    num_nodes: usize,
    topology_type: TopologyType,
    helper: OnceLock<TopologyHelper>,
}

impl Topology {
    /// Create a topology, checking that every triangle references three
    /// distinct nodes below `num_nodes`.
    pub fn new(num_nodes: usize, triangles: Vec<[usize; 3]>) -> Result<Self> {
        validate(num_nodes, &triangles)?;
        Ok(Self {
            triangles,
            num_nodes,
            topology_type: TopologyType::Unknown,
            helper: OnceLock::new(),
        })
    }

    /// Set the recorded topology type.
    pub fn with_type(mut self, topology_type: TopologyType) -> Self {
        self.topology_type = topology_type;
        self
    }

    /// Number of nodes the topology spans.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// All triangles.
    #[inline]
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// One triangle.
    #[inline]
    pub fn triangle(&self, index: usize) -> [usize; 3] {
        self.triangles[index]
    }

    /// Recorded topology type.
    #[inline]
    pub fn topology_type(&self) -> TopologyType {
        self.topology_type
    }

    /// The neighborhood cache, built on first call.
    pub fn helper(&self) -> &TopologyHelper {
        self.helper
            .get_or_init(|| TopologyHelper::from_triangles(&self.triangles, self.num_nodes))
    }

    /// Replace the triangle list, invalidating the neighborhood cache.
    pub fn set_triangles(&mut self, triangles: Vec<[usize; 3]>) -> Result<()> {
        validate(self.num_nodes, &triangles)?;
        self.triangles = triangles;
        self.helper = OnceLock::new();
        Ok(())
    }

    /// A copy of this topology with the winding of the flagged triangles
    /// reversed.
    pub fn with_flipped(&self, flip: &[bool]) -> Self {
        let triangles = self
            .triangles
            .iter()
            .zip(flip.iter().chain(std::iter::repeat(&false)))
            .map(|(&[a, b, c], &f)| if f { [a, c, b] } else { [a, b, c] })
            .collect();
        Self {
            triangles,
            num_nodes: self.num_nodes,
            topology_type: self.topology_type,
            helper: OnceLock::new(),
        }
    }

    /// Connected pieces of the node graph, largest first.
    ///
    /// Nodes without neighbors are not part of any piece.
    pub fn connected_islands(&self) -> Vec<Vec<usize>> {
        let helper = self.helper();
        let mut visited = vec![false; self.num_nodes];
        let mut islands = Vec::new();

        for seed in 0..self.num_nodes {
            if visited[seed] || !helper.has_neighbors(seed) {
                continue;
            }
            let mut island = Vec::new();
            let mut stack = vec![seed];
            visited[seed] = true;
            while let Some(node) = stack.pop() {
                island.push(node);
                for &n in helper.neighbors(node) {
                    if !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
            island.sort_unstable();
            islands.push(island);
        }

        islands.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
        islands
    }

    /// Triangles with at least two edges on the boundary.
    pub fn corner_tiles(&self) -> Vec<usize> {
        let helper = self.helper();
        self.triangles
            .iter()
            .enumerate()
            .filter(|(_, tri)| {
                (0..3)
                    .filter(|&i| helper.is_boundary_edge(tri[i], tri[(i + 1) % 3]))
                    .count()
                    >= 2
            })
            .map(|(i, _)| i)
            .collect()
    }
}

fn validate(num_nodes: usize, triangles: &[[usize; 3]]) -> Result<()> {
    for (t, tri) in triangles.iter().enumerate() {
        for &node in tri {
            if node >= num_nodes {
                return Err(SurfaceError::InvalidTriangle {
                    triangle: t,
                    node,
                    num_nodes,
                });
            }
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(SurfaceError::DegenerateTriangle { triangle: t });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(Topology::new(3, vec![[0, 1, 2]]).is_ok());
        assert!(matches!(
            Topology::new(3, vec![[0, 1, 3]]),
            Err(SurfaceError::InvalidTriangle { node: 3, .. })
        ));
        assert!(matches!(
            Topology::new(3, vec![[0, 1, 1]]),
            Err(SurfaceError::DegenerateTriangle { triangle: 0 })
        ));
    }

    #[test]
    fn test_helper_rebuilt_after_change() {
        let mut topo = Topology::new(4, vec![[0, 1, 2]]).unwrap();
        assert!(!topo.helper().has_neighbors(3));
        topo.set_triangles(vec![[0, 1, 2], [0, 2, 3]]).unwrap();
        assert!(topo.helper().has_neighbors(3));
    }

    #[test]
    fn test_islands() {
        let topo = Topology::new(7, vec![[0, 1, 2], [1, 3, 2], [4, 5, 6]]).unwrap();
        let islands = topo.connected_islands();
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0], vec![0, 1, 2, 3]);
        assert_eq!(islands[1], vec![4, 5, 6]);
    }

    #[test]
    fn test_flip_and_corner_tiles() {
        let topo = Topology::new(4, vec![[0, 1, 2], [0, 2, 3]]).unwrap();
        // Each of the two tiles has two boundary edges
        assert_eq!(topo.corner_tiles(), vec![0, 1]);

        let flipped = topo.with_flipped(&[true]);
        assert_eq!(flipped.triangle(0), [0, 2, 1]);
        assert_eq!(flipped.triangle(1), [0, 2, 3]);
    }

    #[test]
    fn test_type_names() {
        assert_eq!("cut".parse::<TopologyType>().unwrap(), TopologyType::Cut);
        assert_eq!(TopologyType::LobarCut.to_string(), "LOBAR_CUT");
        assert!("bogus".parse::<TopologyType>().is_err());
    }
}
