//! Rigid alignment of a morphed surface to a landmark border.

use nalgebra::{Point3, Rotation3, Vector3};

use crate::algo::projector::{PointProjector, ProjectionHint, ProjectorOptions};
use crate::error::{Result, SurfaceError};
use crate::mesh::{Border, Structure, Surface};

/// Orientation of the ventral-to-dorsal axis, in degrees from +x, for left
/// hemispheres.
const LEFT_ANGLE: f32 = 75.0;
/// Same, for every other structure.
const RIGHT_ANGLE: f32 = 105.0;

/// Two landmark nodes of the reference surface.
///
/// Alignment moves the ventral tip to a standard place and turns the surface
/// about z until the line toward the dorsal tip points at a fixed angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkAlignment {
    /// Node nearest the lower end of the landmark.
    pub ventral: usize,
    /// Node nearest the upper end of the landmark.
    pub dorsal: usize,
}

impl LandmarkAlignment {
    /// Locate the ends of `border` on `reference`.
    pub fn from_border(border: &Border, reference: &Surface) -> Result<Self> {
        let links = border.links();
        let (Some(first), Some(last)) = (links.first(), links.last()) else {
            return Err(SurfaceError::InvalidArgument(format!(
                "landmark border {:?} has no links",
                border.name
            )));
        };
        if links.len() < 2 {
            return Err(SurfaceError::InvalidArgument(format!(
                "landmark border {:?} needs at least two links",
                border.name
            )));
        }

        let projector = PointProjector::new(reference, ProjectionHint::Other, ProjectorOptions::default());
        let nearest = |p: &Point3<f32>| {
            projector.project_nearest_node(p).ok_or_else(|| {
                SurfaceError::DegenerateGeometry("reference surface has no connected node".into())
            })
        };
        let (mut ventral, mut dorsal) = (nearest(&first.position)?, nearest(&last.position)?);
        if first.position.z > last.position.z {
            std::mem::swap(&mut ventral, &mut dorsal);
        }
        if ventral == dorsal {
            return Err(SurfaceError::InvalidArgument(format!(
                "both ends of landmark border {:?} map to node {ventral}",
                border.name
            )));
        }
        Ok(Self { ventral, dorsal })
    }

    /// Target angle of the ventral-to-dorsal axis, in radians.
    pub fn target_angle(structure: Structure) -> f32 {
        match structure {
            Structure::Left => LEFT_ANGLE.to_radians(),
            _ => RIGHT_ANGLE.to_radians(),
        }
    }

    /// Align `surface` in place.
    ///
    /// Flat surfaces get the ventral tip at the origin. Spherical surfaces get
    /// it on the +z pole.
    pub fn align(&self, surface: &mut Surface) -> Result<()> {
        surface.check_node(self.ventral)?;
        surface.check_node(self.dorsal)?;
        let theta = Self::target_angle(surface.structure());

        if surface.kind().is_spherical() {
            let tip = surface.coord(self.ventral).coords;
            let to_pole = Rotation3::rotation_between(&tip, &Vector3::z())
                .unwrap_or_else(|| Rotation3::from_axis_angle(&Vector3::x_axis(), std::f32::consts::PI));
            surface.apply_rotation(&to_pole);
            let d = surface.coord(self.dorsal);
            surface.apply_rotation(&about_z(theta - d.y.atan2(d.x)));
        } else {
            let tip = surface.coord(self.ventral);
            surface.translate(&-tip.coords);
            let d = surface.coord(self.dorsal);
            surface.apply_rotation(&about_z(theta - d.y.atan2(d.x)));
        }
        Ok(())
    }
}

fn about_z(angle: f32) -> Rotation3<f32> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{grid_surface, icosphere};
    use crate::mesh::SurfaceKind;

    #[test]
    fn test_tips_follow_link_height() {
        let reference = icosphere(2);
        let low = reference.coord(0);
        let high = reference.coord(5);
        let (low, high) = if low.z < high.z { (0, 5) } else { (5, 0) };
        let border = Border::from_positions(
            "landmark",
            [reference.coord(high), reference.coord(low)],
        );
        let tips = LandmarkAlignment::from_border(&border, &reference).unwrap();
        assert_eq!(tips.ventral, low);
        assert_eq!(tips.dorsal, high);
    }

    #[test]
    fn test_flat_alignment() {
        let reference = grid_surface(5);
        let border = Border::from_positions(
            "landmark",
            [Point3::new(1.0, 1.0, 0.0), Point3::new(4.0, 2.0, 0.0)],
        );
        let tips = LandmarkAlignment::from_border(&border, &reference).unwrap();

        let mut surface = reference.clone().with_structure(Structure::Left);
        surface.translate(&Vector3::new(3.0, -2.0, 0.0));
        tips.align(&mut surface).unwrap();

        let v = surface.coord(tips.ventral);
        let d = surface.coord(tips.dorsal);
        assert!(v.coords.norm() < 1e-5);
        assert!((d.y.atan2(d.x) - 75f32.to_radians()).abs() < 1e-4);
        // Rigid: edge lengths survive
        assert!((d.coords.norm() - 10f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_spherical_alignment() {
        let mut surface = icosphere(2).with_structure(Structure::Right);
        surface.scale(50.0);
        let tips = LandmarkAlignment {
            ventral: 7,
            dorsal: 40,
        };
        let radius = surface.spherical_radius();
        tips.align(&mut surface).unwrap();
        assert_eq!(surface.kind(), SurfaceKind::Spherical);

        let v = surface.coord(tips.ventral);
        assert!((v - Point3::new(0.0, 0.0, radius)).norm() < 1e-3);
        let d = surface.coord(tips.dorsal);
        assert!((d.y.atan2(d.x) - 105f32.to_radians()).abs() < 1e-3);
        assert!((surface.spherical_radius() - radius).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_landmark() {
        let reference = grid_surface(3);
        let single = Border::from_positions("one", [Point3::new(1.0, 1.0, 0.0)]);
        assert!(LandmarkAlignment::from_border(&single, &reference).is_err());
        let collapsed = Border::from_positions(
            "same",
            [Point3::new(1.0, 1.0, 0.0), Point3::new(1.01, 1.0, 0.0)],
        );
        assert!(LandmarkAlignment::from_border(&collapsed, &reference).is_err());
    }
}
