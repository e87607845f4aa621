//! Arena owning the topologies and surfaces of one subject.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, SurfaceError};

use super::surface::{Surface, SurfaceKind};
use super::topology::Topology;

/// Handle to a topology owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopologyId(usize);

/// Handle to a surface owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(usize);

impl TopologyId {
    /// Position in the session's topology list.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl SurfaceId {
    /// Position in the session's surface list.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Owns topologies and the surfaces built on them.
///
/// Surfaces hold their topology through an `Arc`, so a topology stays alive as
/// long as any surface (or any level stack built from one) still uses it.
#[derive(Debug, Default)]
pub struct Session {
    topologies: Vec<Arc<Topology>>,
    surfaces: Vec<Surface>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a topology.
    pub fn add_topology(&mut self, topology: Topology) -> TopologyId {
        self.topologies.push(Arc::new(topology));
        TopologyId(self.topologies.len() - 1)
    }

    /// Shared handle to a topology.
    pub fn topology(&self, id: TopologyId) -> Result<&Arc<Topology>> {
        self.topologies.get(id.0).ok_or_else(|| {
            SurfaceError::InvalidArgument(format!("no topology with id {}", id.0))
        })
    }

    /// Take ownership of a surface.
    pub fn add_surface(&mut self, surface: Surface) -> SurfaceId {
        self.surfaces.push(surface);
        SurfaceId(self.surfaces.len() - 1)
    }

    /// Build a surface from coordinates over a topology of this session.
    pub fn create_surface(
        &mut self,
        kind: SurfaceKind,
        coords: Vec<nalgebra::Point3<f32>>,
        topology: TopologyId,
    ) -> Result<SurfaceId> {
        let topo = Arc::clone(self.topology(topology)?);
        let surface = Surface::new(kind, coords, topo)?;
        Ok(self.add_surface(surface))
    }

    /// Read a coordinate file and attach it to a topology of this session.
    pub fn load_surface<P: AsRef<Path>>(
        &mut self,
        coord_path: P,
        topology: TopologyId,
        kind: SurfaceKind,
    ) -> Result<SurfaceId> {
        let topo = Arc::clone(self.topology(topology)?);
        let surface = crate::io::coord::load_surface(coord_path, topo, kind)?;
        Ok(self.add_surface(surface))
    }

    /// Read a topology file into the session.
    pub fn load_topology<P: AsRef<Path>>(&mut self, path: P) -> Result<TopologyId> {
        let topology = crate::io::topo::load(path)?;
        Ok(self.add_topology(topology))
    }

    /// Borrow a surface.
    pub fn surface(&self, id: SurfaceId) -> Result<&Surface> {
        self.surfaces
            .get(id.0)
            .ok_or_else(|| SurfaceError::InvalidArgument(format!("no surface with id {}", id.0)))
    }

    /// Mutably borrow a surface.
    pub fn surface_mut(&mut self, id: SurfaceId) -> Result<&mut Surface> {
        self.surfaces
            .get_mut(id.0)
            .ok_or_else(|| SurfaceError::InvalidArgument(format!("no surface with id {}", id.0)))
    }

    /// Ids of every surface of the given kind, in insertion order.
    pub fn surfaces_of_kind(&self, kind: SurfaceKind) -> Vec<SurfaceId> {
        self.surfaces
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind() == kind)
            .map(|(i, _)| SurfaceId(i))
            .collect()
    }

    /// The first surface of the given kind.
    pub fn first_of_kind(&self, kind: SurfaceKind) -> Option<SurfaceId> {
        self.surfaces
            .iter()
            .position(|s| s.kind() == kind)
            .map(SurfaceId)
    }

    /// Number of surfaces.
    pub fn num_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    /// Number of topologies.
    pub fn num_topologies(&self) -> usize {
        self.topologies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_shared_topology() {
        let mut session = Session::new();
        let topo = session.add_topology(Topology::new(3, vec![[0, 1, 2]]).unwrap());
        let coords = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let flat = session
            .create_surface(SurfaceKind::Flat, coords.clone(), topo)
            .unwrap();
        let fiducial = session
            .create_surface(SurfaceKind::Fiducial, coords, topo)
            .unwrap();

        assert!(Arc::ptr_eq(
            session.surface(flat).unwrap().topology(),
            session.surface(fiducial).unwrap().topology()
        ));
        assert_eq!(session.first_of_kind(SurfaceKind::Fiducial), Some(fiducial));
        assert_eq!(session.surfaces_of_kind(SurfaceKind::Flat), vec![flat]);
        assert!(session.first_of_kind(SurfaceKind::Spherical).is_none());
    }

    #[test]
    fn test_rejects_mismatched_surface() {
        let mut session = Session::new();
        let topo = session.add_topology(Topology::new(3, vec![[0, 1, 2]]).unwrap());
        let err = session
            .create_surface(SurfaceKind::Flat, vec![Point3::origin(); 4], topo)
            .unwrap_err();
        assert!(matches!(err, SurfaceError::NodeCountMismatch { .. }));
        assert_eq!(session.num_surfaces(), 0);
    }
}
