//! Core surface data structures.
//!
//! A [`Topology`] is an ordered triangle list shared by every [`Surface`] of
//! one subject. Each surface owns a coordinate array of the same node count
//! and holds its topology through an `Arc`. Neighborhood queries come from a
//! [`TopologyHelper`] that the topology builds lazily.
//!
//! ```
//! use std::sync::Arc;
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
//! assert_eq!(surface.helper().neighbors(0), &[1, 2]);
//! assert!((surface.surface_area() - 0.5).abs() < 1e-6);
//! ```

pub mod attributes;
pub mod border;
mod helper;
mod session;
mod surface;
mod topology;

pub use attributes::{
    AttributeColumn, AttributeSemantics, LabelTable, LatLonMatrix, NodeAttributeMatrix,
    PaintMatrix, ScalarMatrix,
};
pub use border::{Border, BorderLink, BorderProjection, ProjectedLink};
pub use helper::{NodeRing, TopologyHelper};
pub use session::{Session, SurfaceId, TopologyId};
pub use surface::{sphere_point, CrossoverMethod, CrossoverReport, Structure, Surface, SurfaceKind};
pub use topology::{Topology, TopologyType};

#[cfg(test)]
pub(crate) use surface::fixtures;
