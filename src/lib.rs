//! # Sulcus
//!
//! A cortical surface engine: triangulated surfaces that share one topology
//! across their fiducial, inflated, spherical and flat configurations, and the
//! algorithms that relate them.
//!
//! ## Features
//!
//! - **Surfaces**: shared [`Topology`](mesh::Topology) with per-configuration
//!   coordinates, lazily built neighborhood queries, crossover checks
//! - **Regions of interest**: predicate selection, morphology, border tracing
//! - **Geodesics**: Dijkstra distance fields restricted to an ROI
//! - **Projection**: nearest node and barycentric lookup, border projection
//! - **Morphing**: multiresolution flat and spherical morphing with distortion
//!   measurements, landmark alignment and external deformation
//! - **File formats**: coordinates, topology, ROI, borders, attribute matrices
//!   and geodesic fields
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sulcus::prelude::*;
//!
//! let topology = Arc::new(sulcus::io::topo::load("subject.topo")?);
//! let fiducial = sulcus::io::coord::load_surface(
//!     "subject.fiducial.coord",
//!     Arc::clone(&topology),
//!     SurfaceKind::Fiducial,
//! )?;
//!
//! let field = dijkstra(&fiducial, 0, None, &GeodesicOptions::default())?;
//! if let Some((node, distance)) = field.farthest_node() {
//!     println!("node {node} is {distance:.2} mm away");
//! }
//! # Ok::<(), sulcus::SurfaceError>(())
//! ```
//!
//! ## Building Surfaces Programmatically
//!
//! ```
//! use std::sync::Arc;
//! use sulcus::prelude::*;
//! use nalgebra::Point3;
//!
//! let coords = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let triangles = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//!
//! let topology = Arc::new(Topology::new(4, triangles).unwrap());
//! let surface = Surface::new(SurfaceKind::Fiducial, coords, topology).unwrap();
//! assert_eq!(surface.num_nodes(), 4);
//! assert_eq!(surface.helper().neighbors(3).len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod geometry;
pub mod io;
pub mod mesh;

pub use error::{Result, SurfaceError};

/// Prelude module for convenient imports.
///
/// ```
/// use sulcus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::geodesic::{dijkstra, GeodesicField, GeodesicOptions};
    pub use crate::algo::morph::{MorphMode, MorphingParameters, MultiresolutionMorphing};
    pub use crate::algo::projector::{PointProjector, ProjectionHint, ProjectorOptions};
    pub use crate::algo::roi::{RoiPredicate, RoiSelection, SelectionLogic};
    pub use crate::algo::Progress;
    pub use crate::error::{Result, SurfaceError};
    pub use crate::mesh::{Border, Structure, Surface, SurfaceKind, Topology, TopologyType};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;
    use std::sync::Arc;

    #[test]
    fn test_tetrahedron() {
        let coords = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let triangles = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];

        let topology = Arc::new(Topology::new(4, triangles).unwrap());
        let surface = Surface::new(SurfaceKind::Fiducial, coords, topology).unwrap();

        assert_eq!(surface.topology().num_triangles(), 4);
        // Every node of a tetrahedron touches the other three.
        for node in 0..4 {
            assert_eq!(surface.helper().neighbors(node).len(), 3);
        }
        assert_eq!(surface.topology().connected_islands().len(), 1);
    }
}
