//! Multiresolution morphing of flat maps and spheres.
//!
//! A morph relaxes a flat or spherical surface so its edge lengths and ring
//! angles approach those of a fiducial reference with the same topology.
//! Each cycle works coarse to fine:
//!
//! 1. resample the surface into a stack of levels (hexagonal grids for flat
//!    maps, standard spheres for spheres)
//! 2. run the [`MorphingKernel`] on each level from the coarsest down and
//!    carry the result to the next finer level
//! 3. remove crossovers and measure distortion
//!
//! # Example
//!
//! ```
//! use sulcus::algo::morph::{MorphMode, MorphingParameters};
//!
//! let params = MorphingParameters::for_mode(MorphMode::Spherical).with_cycles(2);
//! assert_eq!(params.cycles.len(), 2);
//! assert!(params.validate().is_ok());
//! ```

mod align;
mod distortion;
mod driver;
mod external;
mod hex;
mod kernel;
mod levels;
mod params;
mod sphere;

pub use align::LandmarkAlignment;
pub use distortion::{areal_distortion, linear_distortion, DescriptiveStatistics, MorphingMeasurement};
pub use driver::{MorphingResult, MultiresolutionMorphing};
pub use external::{coords_as_borders, ExternalDeformation, MAX_LINKS_PER_BORDER};
pub use hex::{hex_subsample, GridIndex, HexSubsample, HexSubsampleOptions};
pub use kernel::{ForceKernel, KernelParameters, KernelReport, MorphingKernel};
pub use levels::{equilateral_triangles, FlatLevel};
pub use params::{CrossoverSchedule, CycleSchedule, MorphMode, MorphingParameters};
pub use sphere::{
    build_sphere_stack, spherical_upsample, subdivided_icosahedron, DownTable, SphereLevel, SphereStack,
    StandardSphere, StandardSphereHierarchy,
};
