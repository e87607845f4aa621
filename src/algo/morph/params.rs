//! Morphing schedules.

use std::fmt;
use std::str::FromStr;

use crate::algo::smooth::CrossoverSmoothOptions;
use crate::error::{Result, SurfaceError};

/// Which kind of surface is being morphed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphMode {
    /// A flat map, subsampled with a hexagonal grid.
    #[default]
    Flat,
    /// A sphere, subsampled with the standard sphere hierarchy.
    Spherical,
}

impl MorphMode {
    /// Name used on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            MorphMode::Flat => "flat",
            MorphMode::Spherical => "sphere",
        }
    }
}

impl fmt::Display for MorphMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MorphMode {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(MorphMode::Flat),
            "sphere" | "spherical" => Ok(MorphMode::Spherical),
            other => Err(SurfaceError::InvalidArgument(format!(
                "unknown morphing mode '{other}'"
            ))),
        }
    }
}

/// Kernel and smoothing settings of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSchedule {
    /// Kernel iterations per level, finest (the input surface) first.
    pub iterations: Vec<usize>,
    /// Weight of the edge-length term.
    pub linear_force: f32,
    /// Weight of the angle term.
    pub angular_force: f32,
    /// Fraction of the force applied per iteration.
    pub step_size: f32,
    /// Strength of the adaptive areal smoothing after the level walk.
    pub smoothing_strength: f32,
    /// Iteration budget of the adaptive areal smoothing.
    pub smoothing_iterations: usize,
    /// Boundary nodes are smoothed every this many iterations.
    pub smoothing_edges_every: usize,
}

impl CycleSchedule {
    fn new(iterations: &[usize], forces: (f32, f32, f32), smoothing: (f32, usize, usize)) -> Self {
        Self {
            iterations: iterations.to_vec(),
            linear_force: forces.0,
            angular_force: forces.1,
            step_size: forces.2,
            smoothing_strength: smoothing.0,
            smoothing_iterations: smoothing.1,
            smoothing_edges_every: smoothing.2,
        }
    }
}

/// The six numbers of the fixed crossover pass run at the end of each cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverSchedule {
    /// Smoothing strength.
    pub strength: f32,
    /// Detect-and-smooth cycles.
    pub cycles: usize,
    /// Areal smoothing iterations per cycle.
    pub iterations: usize,
    /// Boundary smoothing interval.
    pub edges_every: usize,
    /// Re-sphering interval (spherical surfaces only).
    pub project_to_sphere_every: usize,
    /// Neighbor rings smoothed around each crossover.
    pub neighbor_depth: usize,
}

impl CrossoverSchedule {
    /// Smoothing options for [`crate::algo::smooth::smooth_out_crossovers`].
    pub fn options(&self, parallel: bool) -> CrossoverSmoothOptions {
        CrossoverSmoothOptions::from_schedule(
            self.strength,
            self.cycles,
            self.iterations,
            self.edges_every,
            self.project_to_sphere_every,
            self.neighbor_depth,
        )
        .with_parallel(parallel)
    }
}

/// Full multiresolution morphing configuration.
///
/// Level 0 is the input surface; higher levels are coarser.
///
/// # Example
///
/// ```
/// use sulcus::algo::morph::{MorphingParameters, MorphMode};
///
/// let params = MorphingParameters::flat_defaults().with_cycles(3).with_levels(5);
/// assert_eq!(params.mode, MorphMode::Flat);
/// assert_eq!(params.cycles.len(), 3);
/// assert!(params.cycles.iter().all(|c| c.iterations.len() == 5));
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MorphingParameters {
    /// Flat or spherical.
    pub mode: MorphMode,
    /// Number of levels, the input surface included.
    pub num_levels: usize,
    /// One schedule per cycle.
    pub cycles: Vec<CycleSchedule>,
    /// Fixed crossover pass.
    pub crossover: CrossoverSchedule,
    /// Untangle folded boundary regions after the last flat cycle.
    pub smooth_out_flat_overlap: bool,
    /// Flip inward tiles after each spherical cycle.
    pub point_spherical_tiles_outward: bool,
    /// Crossover growth factor within one kernel iteration that counts as
    /// divergence. `None` disables the check.
    pub divergence_ratio: Option<f32>,
    /// Use parallel execution.
    pub parallel: bool,
}

impl MorphingParameters {
    /// Schedule for flat maps: 5 cycles over 7 levels.
    pub fn flat_defaults() -> Self {
        let tables: [[usize; 7]; 5] = [
            [0, 10, 20, 40, 60, 70, 60],
            [0, 10, 20, 40, 60, 60, 50],
            [0, 10, 20, 40, 60, 60, 50],
            [0, 20, 20, 40, 60, 50, 30],
            [0, 20, 20, 40, 60, 50, 30],
        ];
        let cycles = tables
            .iter()
            .enumerate()
            .map(|(c, table)| {
                let linear = if c == 4 { 0.4 } else { 0.5 };
                CycleSchedule::new(table, (linear, 0.5, 0.5), (1.0, 50, 10))
            })
            .collect();
        Self {
            mode: MorphMode::Flat,
            num_levels: 7,
            cycles,
            crossover: CrossoverSchedule {
                strength: 1.0,
                cycles: 10,
                iterations: 50,
                edges_every: 10,
                project_to_sphere_every: 0,
                neighbor_depth: 5,
            },
            smooth_out_flat_overlap: true,
            point_spherical_tiles_outward: false,
            divergence_ratio: Some(10.0),
            parallel: true,
        }
    }

    /// Schedule for spheres: 4 cycles over 6 levels.
    pub fn spherical_defaults() -> Self {
        let tables: [[usize; 6]; 4] = [
            [2, 3, 5, 20, 20, 15],
            [2, 3, 15, 20, 15, 0],
            [2, 5, 10, 10, 10, 0],
            [2, 5, 10, 20, 5, 0],
        ];
        let cycles = tables
            .iter()
            .map(|table| CycleSchedule::new(table, (0.5, 0.3, 0.5), (1.0, 10, 10)))
            .collect();
        Self {
            mode: MorphMode::Spherical,
            num_levels: 6,
            cycles,
            crossover: CrossoverSchedule {
                strength: 1.0,
                cycles: 10,
                iterations: 10,
                edges_every: 0,
                project_to_sphere_every: 10,
                neighbor_depth: 30,
            },
            smooth_out_flat_overlap: true,
            point_spherical_tiles_outward: false,
            divergence_ratio: Some(10.0),
            parallel: true,
        }
    }

    /// Defaults for `mode`.
    pub fn for_mode(mode: MorphMode) -> Self {
        match mode {
            MorphMode::Flat => Self::flat_defaults(),
            MorphMode::Spherical => Self::spherical_defaults(),
        }
    }

    /// Keep the first `count` cycles, repeating the last schedule when more
    /// are asked for than the defaults hold.
    pub fn with_cycles(mut self, count: usize) -> Self {
        if let Some(last) = self.cycles.last().cloned() {
            self.cycles.resize(count, last);
        }
        self
    }

    /// Set the level count, truncating each table or repeating its coarsest
    /// entry.
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.num_levels = levels;
        for cycle in &mut self.cycles {
            let last = cycle.iterations.last().copied().unwrap_or(0);
            cycle.iterations.resize(levels, last);
        }
        self
    }

    /// Set the divergence ratio.
    pub fn with_divergence_ratio(mut self, ratio: Option<f32>) -> Self {
        self.divergence_ratio = ratio;
        self
    }

    /// Set whether flat overlap is smoothed after the last cycle.
    pub fn with_flat_overlap_smoothing(mut self, enabled: bool) -> Self {
        self.smooth_out_flat_overlap = enabled;
        self
    }

    /// Set whether spherical tiles are flipped outward after each cycle.
    pub fn with_tiles_outward(mut self, enabled: bool) -> Self {
        self.point_spherical_tiles_outward = enabled;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Use sequential execution.
    pub fn sequential(self) -> Self {
        self.with_parallel(false)
    }

    /// Check ranges and table shapes.
    pub fn validate(&self) -> Result<()> {
        if self.cycles.is_empty() {
            return Err(SurfaceError::invalid_param("cycles", 0, "at least one cycle is required"));
        }
        let min_levels = match self.mode {
            MorphMode::Flat => 2,
            MorphMode::Spherical => 1,
        };
        if self.num_levels < min_levels {
            return Err(SurfaceError::invalid_param(
                "num_levels",
                self.num_levels,
                "too few levels for this mode",
            ));
        }
        for cycle in &self.cycles {
            if cycle.iterations.len() != self.num_levels {
                return Err(SurfaceError::invalid_param(
                    "iterations",
                    cycle.iterations.len(),
                    "need one entry per level",
                ));
            }
            if !(0.0..=1.0).contains(&cycle.linear_force) {
                return Err(SurfaceError::invalid_param(
                    "linear_force",
                    cycle.linear_force,
                    "must be in [0, 1]",
                ));
            }
            if !(0.0..=1.0).contains(&cycle.angular_force) {
                return Err(SurfaceError::invalid_param(
                    "angular_force",
                    cycle.angular_force,
                    "must be in [0, 1]",
                ));
            }
            if cycle.step_size <= 0.0 || !cycle.step_size.is_finite() {
                return Err(SurfaceError::invalid_param(
                    "step_size",
                    cycle.step_size,
                    "must be positive",
                ));
            }
        }
        if let Some(ratio) = self.divergence_ratio {
            if ratio <= 1.0 {
                return Err(SurfaceError::invalid_param(
                    "divergence_ratio",
                    ratio,
                    "must exceed 1",
                ));
            }
        }
        Ok(())
    }
}

impl Default for MorphingParameters {
    fn default() -> Self {
        Self::flat_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_defaults() {
        let params = MorphingParameters::flat_defaults();
        assert_eq!(params.cycles.len(), 5);
        assert_eq!(params.cycles[0].iterations, vec![0, 10, 20, 40, 60, 70, 60]);
        assert_eq!(params.cycles[4].linear_force, 0.4);
        assert_eq!(params.cycles[3].linear_force, 0.5);
        assert_eq!(params.crossover.iterations, 50);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_spherical_defaults() {
        let params = MorphingParameters::spherical_defaults();
        assert_eq!(params.num_levels, 6);
        assert_eq!(params.cycles.len(), 4);
        assert_eq!(params.cycles[3].iterations, vec![2, 5, 10, 20, 5, 0]);
        assert_eq!(params.cycles[1].angular_force, 0.3);
        assert_eq!(params.crossover.neighbor_depth, 30);
        assert!(!params.point_spherical_tiles_outward);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_resizing() {
        let params = MorphingParameters::spherical_defaults()
            .with_cycles(6)
            .with_levels(8);
        assert_eq!(params.cycles.len(), 6);
        assert_eq!(params.cycles[5], params.cycles[3]);
        assert_eq!(params.cycles[0].iterations[6..], [15, 15]);

        let short = MorphingParameters::flat_defaults().with_levels(3);
        assert_eq!(short.cycles[0].iterations, vec![0, 10, 20]);
    }

    #[test]
    fn test_validation() {
        let mut params = MorphingParameters::flat_defaults();
        params.cycles[1].angular_force = 1.5;
        assert!(params.validate().is_err());

        let mut params = MorphingParameters::flat_defaults();
        params.cycles[0].iterations.pop();
        assert!(params.validate().is_err());

        assert!(MorphingParameters::flat_defaults().with_cycles(0).validate().is_err());
        assert!(MorphingParameters::flat_defaults().with_levels(1).validate().is_err());
        assert_eq!("SPHERE".parse::<MorphMode>().unwrap(), MorphMode::Spherical);
    }
}
