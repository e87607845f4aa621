//! Surface algorithms.
//!
//! - **Projection**: nearest node and barycentric lookup ([`projector`])
//! - **Regions of interest**: predicate selection and morphology ([`roi`]),
//!   and tracing an ROI's outline as a border ([`roi_border`])
//! - **Geodesics**: Dijkstra distance fields over surface edges ([`geodesic`])
//! - **Smoothing**: areal and linear smoothing, crossover and overlap removal
//!   ([`smooth`])
//! - **Morphing**: multiresolution flat and spherical morphing ([`morph`])
//!
//! Long-running operations take a [`Progress`] for reporting and
//! cancellation.

pub mod geodesic;
pub mod morph;
pub mod progress;
pub mod projector;
pub mod roi;
pub mod roi_border;
pub mod smooth;

pub use progress::Progress;
