//! The multiresolution morphing driver.
//!
//! Each cycle resamples the surface into a stack of coarser levels, morphs
//! from the coarsest level down to the input, removes crossovers and takes a
//! distortion measurement.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nalgebra::Point3;

use crate::algo::smooth::{
    areal_smoothing_with_progress, smooth_out_crossovers_with_progress, smooth_out_flat_overlap,
    OverlapSmoothOptions, SmoothOptions,
};
use crate::algo::Progress;
use crate::error::{Result, SurfaceError};
use crate::mesh::{Border, Surface, SurfaceKind};

use super::align::LandmarkAlignment;
use super::distortion::MorphingMeasurement;
use super::hex::{hex_subsample, HexSubsampleOptions};
use super::kernel::{ForceKernel, KernelParameters, MorphingKernel};
use super::levels::FlatLevel;
use super::params::{CycleSchedule, MorphMode, MorphingParameters};
use super::sphere::{build_sphere_stack, spherical_upsample, SphereStack, StandardSphereHierarchy};

/// Flat levels stop being downsampled at this many nodes.
const MIN_LEVEL_NODES: usize = 100;
/// Iterations per chunk of adaptive crossover smoothing.
const ADAPTIVE_CHUNK: usize = 10;
/// Node crossovers tolerated by adaptive smoothing.
const ADAPTIVE_TOLERANCE: usize = 2;

/// Output of [`MultiresolutionMorphing::run`].
#[derive(Debug, Clone)]
pub struct MorphingResult {
    /// The morphed surface.
    pub surface: Surface,
    /// Snapshots in the order they were taken.
    pub measurements: Vec<MorphingMeasurement>,
    /// Non-fatal problems met along the way.
    pub warnings: Vec<String>,
}

impl MorphingResult {
    /// The last measurement taken.
    pub fn final_measurement(&self) -> Option<&MorphingMeasurement> {
        self.measurements.last()
    }
}

/// Morphs a flat or spherical surface so its shape approaches a fiducial
/// reference sharing its topology.
///
/// # Example
///
/// ```no_run
/// use sulcus::algo::morph::{MorphingParameters, MultiresolutionMorphing};
/// # fn demo(reference: sulcus::mesh::Surface, flat: sulcus::mesh::Surface) -> sulcus::Result<()> {
/// let morphing = MultiresolutionMorphing::new(reference, MorphingParameters::flat_defaults())?;
/// let result = morphing.run(flat)?;
/// for m in &result.measurements {
///     println!("{m}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct MultiresolutionMorphing {
    reference: Surface,
    params: MorphingParameters,
    kernel: Box<dyn MorphingKernel>,
    hierarchy: Option<Arc<StandardSphereHierarchy>>,
    landmark: Option<Border>,
}

impl MultiresolutionMorphing {
    /// Morph toward `reference` with `params` and the default kernel.
    pub fn new(reference: Surface, params: MorphingParameters) -> Result<Self> {
        params.validate()?;
        if reference.num_nodes() == 0 {
            return Err(SurfaceError::EmptySurface("reference has no nodes".into()));
        }
        Ok(Self {
            reference,
            params,
            kernel: Box::new(ForceKernel),
            hierarchy: None,
            landmark: None,
        })
    }

    /// Use another kernel.
    pub fn with_kernel(mut self, kernel: impl MorphingKernel + 'static) -> Self {
        self.kernel = Box::new(kernel);
        self
    }

    /// Use a preloaded standard-sphere hierarchy. Without one, spherical
    /// morphing generates subdivided icosahedra.
    pub fn with_hierarchy(mut self, hierarchy: Arc<StandardSphereHierarchy>) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    /// Align to this landmark border after the last cycle.
    pub fn with_landmark(mut self, border: Border) -> Self {
        self.landmark = Some(border);
        self
    }

    /// The parameters in use.
    pub fn parameters(&self) -> &MorphingParameters {
        &self.params
    }

    /// Morph `surface`.
    pub fn run(&self, surface: Surface) -> Result<MorphingResult> {
        self.run_with_progress(surface, &Progress::none())
    }

    /// [`run`](Self::run) with progress reporting and cancellation.
    ///
    /// # Errors
    ///
    /// - [`SurfaceError::InvalidArgument`] when the surface has more than one
    ///   connected piece
    /// - [`SurfaceError::SubsampleFailed`] when a level cannot be built
    /// - [`SurfaceError::DivergenceDetected`] when the kernel folds the
    ///   surface
    /// - [`SurfaceError::Cancelled`] when `progress` asks to stop
    pub fn run_with_progress(&self, mut surface: Surface, progress: &Progress) -> Result<MorphingResult> {
        if surface.num_nodes() != self.reference.num_nodes() {
            return Err(SurfaceError::NodeCountMismatch {
                coords: surface.num_nodes(),
                topology: self.reference.num_nodes(),
            });
        }
        let islands = surface.topology().connected_islands();
        if islands.len() != 1 {
            return Err(SurfaceError::InvalidArgument(format!(
                "surface to morph has {} connected pieces, expected one",
                islands.len()
            )));
        }

        let mut warnings = Vec::new();
        let corners = surface.topology().corner_tiles().len();
        if corners > 0 {
            let msg = format!("{corners} corner tiles may not morph well");
            warn!("{msg}");
            warnings.push(msg);
        }

        let reference_area = self.reference.surface_area();
        let spherical = self.params.mode == MorphMode::Spherical;
        let radius = if spherical {
            surface.convert_to_sphere_with_area(reference_area)?
        } else {
            surface.set_kind(SurfaceKind::Flat);
            0.0
        };
        let hierarchy = if spherical {
            Some(self.sphere_hierarchy())
        } else {
            None
        };

        let mut measurements = vec![MorphingMeasurement::measure(
            "Before Morphing",
            &surface,
            &self.reference,
            Duration::ZERO,
        )?];
        info!("{}", measurements[0]);

        let num_cycles = self.params.cycles.len();
        for (cycle, schedule) in self.params.cycles.iter().enumerate() {
            progress.checkpoint()?;
            let start = Instant::now();
            match &hierarchy {
                Some(hierarchy) => {
                    self.spherical_cycle(cycle, schedule, &mut surface, hierarchy, radius, &mut warnings, progress)?
                }
                None => self.flat_cycle(cycle, schedule, &mut surface, &mut warnings, progress)?,
            }
            self.finish_cycle(schedule, &mut surface, radius, reference_area, progress)?;

            let m = MorphingMeasurement::measure(
                format!("Cycle {}", cycle + 1),
                &surface,
                &self.reference,
                start.elapsed(),
            )?;
            info!("{m}");
            measurements.push(m);
            progress.report(cycle + 1, num_cycles, "Morphing");
        }

        if !spherical && self.params.smooth_out_flat_overlap && num_cycles > 0 {
            let start = Instant::now();
            let mut opts = OverlapSmoothOptions::default();
            opts.smoothing.parallel = self.params.parallel;
            if smooth_out_flat_overlap(&mut surface, &opts)? {
                debug!("smoothed out flat overlap");
            }
            surface.scale_to_area(reference_area)?;
            measurements.push(MorphingMeasurement::measure(
                "Overlap Smoothed",
                &surface,
                &self.reference,
                start.elapsed(),
            )?);
        }

        if let Some(border) = &self.landmark {
            let start = Instant::now();
            LandmarkAlignment::from_border(border, &self.reference)?.align(&mut surface)?;
            measurements.push(MorphingMeasurement::measure(
                "Aligned",
                &surface,
                &self.reference,
                start.elapsed(),
            )?);
        }

        Ok(MorphingResult {
            surface,
            measurements,
            warnings,
        })
    }

    fn sphere_hierarchy(&self) -> Arc<StandardSphereHierarchy> {
        match &self.hierarchy {
            Some(h) => Arc::clone(h),
            None => Arc::new(StandardSphereHierarchy::generate(
                self.params.num_levels.saturating_sub(1),
            )),
        }
    }

    fn flat_cycle(
        &self,
        cycle: usize,
        schedule: &CycleSchedule,
        surface: &mut Surface,
        warnings: &mut Vec<String>,
        progress: &Progress,
    ) -> Result<()> {
        let opts = HexSubsampleOptions::default().with_parallel(self.params.parallel);
        let hex = hex_subsample(&self.reference, surface, &opts)?;
        if hex.fallbacks > 0 {
            warnings.push(format!(
                "cycle {}: {} grid nodes fell back to the nearest node",
                cycle + 1,
                hex.fallbacks
            ));
        }

        let mut levels = vec![FlatLevel::from_hex(&hex)];
        while levels.len() + 1 < self.params.num_levels {
            let Some(last) = levels.last() else { break };
            if last.num_nodes() <= MIN_LEVEL_NODES {
                break;
            }
            let next = last.downsample(levels.len() + 1)?;
            levels.push(next);
        }
        debug!(
            "cycle {}: flat levels {:?}",
            cycle + 1,
            levels.iter().map(FlatLevel::num_nodes).collect::<Vec<_>>()
        );

        let total = levels.len() + 1;
        for depth in (1..=levels.len()).rev() {
            progress.checkpoint()?;
            let level = &mut levels[depth - 1];
            self.morph_level(
                &mut level.surface,
                level.reference.coords(),
                schedule,
                cycle,
                depth,
                progress,
            )?;
            if depth > 1 {
                let (finer, coarser) = levels.split_at_mut(depth - 1);
                coarser[0].upsample_into(&mut finer[depth - 2])?;
            } else {
                levels[0].backsample(&hex.upsample, surface)?;
            }
            progress.report_sub(total - depth, total, cycle, self.params.cycles.len(), "Morphing");
        }
        self.morph_level(surface, self.reference.coords(), schedule, cycle, 0, progress)
    }

    #[allow(clippy::too_many_arguments)]
    fn spherical_cycle(
        &self,
        cycle: usize,
        schedule: &CycleSchedule,
        surface: &mut Surface,
        hierarchy: &StandardSphereHierarchy,
        radius: f32,
        warnings: &mut Vec<String>,
        progress: &Progress,
    ) -> Result<()> {
        let SphereStack { mut levels, down } = build_sphere_stack(
            surface,
            &self.reference,
            hierarchy,
            self.params.num_levels,
            self.params.parallel,
        )?;
        for level in levels.iter().filter(|l| l.unprojected > 0) {
            warnings.push(format!(
                "cycle {}: {} nodes of standard sphere {} missed the surface",
                cycle + 1,
                level.unprojected,
                level.template
            ));
        }

        let total = levels.len() + 1;
        for depth in (1..=levels.len()).rev() {
            progress.checkpoint()?;
            let level = &mut levels[depth - 1];
            self.morph_level(
                &mut level.surface,
                level.reference.coords(),
                schedule,
                cycle,
                depth,
                progress,
            )?;
            if depth > 1 {
                let (finer, coarser) = levels.split_at_mut(depth - 1);
                spherical_upsample(&mut coarser[0].surface, &mut finer[depth - 2].surface, &down[depth - 1])?;
            } else {
                spherical_upsample(&mut levels[0].surface, surface, &down[0])?;
            }
            progress.report_sub(total - depth, total, cycle, self.params.cycles.len(), "Morphing");
        }
        self.morph_level(surface, self.reference.coords(), schedule, cycle, 0, progress)?;
        surface.convert_to_sphere_with_radius(radius);
        Ok(())
    }

    fn morph_level(
        &self,
        surface: &mut Surface,
        reference: &[Point3<f32>],
        schedule: &CycleSchedule,
        cycle: usize,
        level: usize,
        progress: &Progress,
    ) -> Result<()> {
        let iterations = schedule.iterations.get(level).copied().unwrap_or(0);
        if iterations == 0 {
            return Ok(());
        }
        let params = KernelParameters::default()
            .with_forces(schedule.linear_force, schedule.angular_force, schedule.step_size)
            .with_iterations(iterations)
            .with_divergence_ratio(self.params.divergence_ratio)
            .with_parallel(self.params.parallel);
        let report = self.kernel.morph(surface, reference, &params, progress)?;
        if let Some((before, after)) = report.divergence {
            return Err(SurfaceError::DivergenceDetected {
                cycle,
                level,
                before,
                after,
            });
        }
        debug!(
            "cycle {} level {level}: {} iterations on {} nodes",
            cycle + 1,
            report.iterations,
            surface.num_nodes()
        );
        Ok(())
    }

    fn finish_cycle(
        &self,
        schedule: &CycleSchedule,
        surface: &mut Surface,
        radius: f32,
        reference_area: f32,
        progress: &Progress,
    ) -> Result<()> {
        let spherical = self.params.mode == MorphMode::Spherical;
        let method = surface.kind().crossover_method();

        let chunk = SmoothOptions::default()
            .with_strength(schedule.smoothing_strength)
            .with_smooth_edges_every(schedule.smoothing_edges_every)
            .with_parallel(self.params.parallel);
        let mut budget = schedule.smoothing_iterations;
        while budget > 0 && surface.crossover_check(method).node_crossovers > ADAPTIVE_TOLERANCE {
            progress.checkpoint()?;
            let n = budget.min(ADAPTIVE_CHUNK);
            areal_smoothing_with_progress(surface, &chunk.clone().with_iterations(n), None, progress)?;
            if spherical {
                surface.convert_to_sphere_with_radius(radius);
            }
            budget -= n;
        }
        if spherical && self.params.point_spherical_tiles_outward {
            let flipped = surface.orient_tiles_outward();
            if flipped > 0 {
                debug!("pointed {flipped} tiles outward");
            }
        }

        let remaining = smooth_out_crossovers_with_progress(
            surface,
            &self.params.crossover.options(self.params.parallel),
            method,
            progress,
        )?;
        if remaining > 0 {
            debug!("{remaining} crossover nodes remain after smoothing");
        }

        if spherical {
            surface.convert_to_sphere_with_radius(radius);
        } else {
            surface.translate_center_of_mass_to_origin();
            surface.scale_to_area(reference_area)?;
        }
        Ok(())
    }
}
