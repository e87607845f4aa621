//! Border extraction along a region of interest.
//!
//! The ROI is treated as a strip. Geodesic distances inside it locate the two
//! ends, and the parent chain between them becomes a border polyline.

use log::debug;

use crate::algo::geodesic::{dijkstra_with_progress, GeodesicOptions};
use crate::algo::progress::Progress;
use crate::algo::roi::RoiSelection;
use crate::error::{Result, SurfaceError};
use crate::mesh::{Border, Surface};

/// Options for [`roi_to_border`].
#[derive(Debug, Clone)]
pub struct RoiBorderOptions {
    /// First node of the border. Picked as one end of the strip when `None`.
    pub start: Option<usize>,

    /// Last node of the border. Picked as the node farthest from the start
    /// when `None`.
    pub end: Option<usize>,

    /// Target distance between consecutive links.
    pub spacing: f32,

    /// Minimum number of links after resampling.
    pub min_links: usize,
}

impl Default for RoiBorderOptions {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            spacing: 1.0,
            min_links: 2,
        }
    }
}

impl RoiBorderOptions {
    /// Set the start node.
    pub fn with_start(mut self, start: usize) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the end node.
    pub fn with_end(mut self, end: usize) -> Self {
        self.end = Some(end);
        self
    }

    /// Set the link spacing.
    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = spacing;
        self
    }

    /// Set the minimum link count.
    pub fn with_min_links(mut self, min_links: usize) -> Self {
        self.min_links = min_links;
        self
    }
}

/// Build a border named `name` along the geodesic between two ends of `roi`.
///
/// # Errors
///
/// - [`SurfaceError::InvalidArgument`] for an empty or single-node ROI, an
///   end node outside the ROI, or `start == end`
/// - [`SurfaceError::SourceNotInRoi`] when the start node is not selected
/// - [`SurfaceError::NotConnected`] when no path joins the ends
pub fn roi_to_border(
    surface: &Surface,
    roi: &RoiSelection,
    name: &str,
    options: &RoiBorderOptions,
) -> Result<Border> {
    roi_to_border_with_progress(surface, roi, name, options, &Progress::none())
}

/// [`roi_to_border`] with progress reporting and cancellation.
pub fn roi_to_border_with_progress(
    surface: &Surface,
    roi: &RoiSelection,
    name: &str,
    options: &RoiBorderOptions,
    progress: &Progress,
) -> Result<Border> {
    if options.spacing <= 0.0 || !options.spacing.is_finite() {
        return Err(SurfaceError::invalid_param(
            "spacing",
            options.spacing,
            "must be positive",
        ));
    }
    match roi.count() {
        0 => {
            return Err(SurfaceError::InvalidArgument(
                "cannot build a border from an empty ROI".into(),
            ))
        }
        1 => {
            return Err(SurfaceError::InvalidArgument(
                "cannot build a border from a single-node ROI".into(),
            ))
        }
        _ => {}
    }
    if let Some(end) = options.end {
        surface.check_node(end)?;
        if !roi.is_selected(end) {
            return Err(SurfaceError::InvalidArgument(format!(
                "end node {end} is not in the ROI"
            )));
        }
        if options.start == Some(end) {
            return Err(SurfaceError::InvalidArgument(format!(
                "start and end are both node {end}"
            )));
        }
    }

    let geodesic = GeodesicOptions::default();
    let start = match options.start {
        Some(start) => start,
        None => {
            let seed = roi.first_selected().ok_or_else(|| {
                SurfaceError::InvalidArgument("cannot build a border from an empty ROI".into())
            })?;
            let field = dijkstra_with_progress(surface, seed, Some(roi), &geodesic, progress)?;
            field.farthest_node().map_or(seed, |(node, _)| node)
        }
    };
    progress.report(1, 3, "ROI border");

    let field = dijkstra_with_progress(surface, start, Some(roi), &geodesic, progress)?;
    let end = match options.end {
        Some(end) => end,
        None => field.farthest_node().map_or(start, |(node, _)| node),
    };
    if field.parent(end).is_none() {
        return Err(SurfaceError::NotConnected {
            from: start,
            to: end,
        });
    }
    progress.report(2, 3, "ROI border");

    let path = field.path_to(end)?;
    debug!(
        "border '{name}': {} path nodes from {start} to {end}, length {:.3}",
        path.len(),
        field.distance(end)
    );

    let mut border = Border::from_positions(name, path.iter().map(|&n| surface.coord(n)));
    border.sampling_density = options.spacing;
    border.resample_to_density(options.spacing, options.min_links)?;
    progress.report(3, 3, "ROI border");
    Ok(border)
}
