//! Flat deformation through an external program.
//!
//! The program works on border files: the flat coordinates go out as a set
//! of borders, and the program writes the deformed links to
//! `arch.deform.dat` in its working directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use nalgebra::Point3;

use crate::error::{Result, SurfaceError};
use crate::io;
use crate::mesh::{Border, Surface};

/// File the program reads the coordinates from.
pub const COORDS_BORDER_FILE: &str = "resampled_coords_as_border.border";
/// File the program writes its result to.
pub const OUTPUT_FILE: &str = "arch.deform.dat";
/// Links per border when coordinates are written as borders.
pub const MAX_LINKS_PER_BORDER: usize = 100;

/// Runner for the external flat deformation program.
#[derive(Debug, Clone)]
pub struct ExternalDeformation {
    /// Program to run.
    pub program: String,
    /// Arguments placed before the positional ones.
    pub leading_args: Vec<String>,
    /// Directory the program runs in.
    pub working_dir: PathBuf,
    /// Bending stiffness.
    pub beta: f32,
    /// Variance multiplier.
    pub variance_multiplier: f32,
    /// Deformation iterations.
    pub iterations: usize,
}

impl ExternalDeformation {
    /// Run `program` in `working_dir` with default parameters.
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            working_dir: working_dir.into(),
            beta: 0.000_01,
            variance_multiplier: 1.0,
            iterations: 20,
        }
    }

    /// Set the arguments placed before the positional ones.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set bending stiffness and variance multiplier.
    pub fn with_parameters(mut self, beta: f32, variance_multiplier: f32) -> Self {
        self.beta = beta;
        self.variance_multiplier = variance_multiplier;
        self
    }

    /// Set the iteration count.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Deform `flat` so `source_border` moves onto `target_border`, returning
    /// the deformed coordinates.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::ExternalToolFailed`] when the program cannot start,
    /// exits non-zero, or leaves no usable output.
    pub fn run(&self, target_border: &Path, source_border: &Path, flat: &Surface) -> Result<Vec<Point3<f32>>> {
        let coords_file = self.working_dir.join(COORDS_BORDER_FILE);
        io::border::save(&coords_file, &coords_as_borders(flat.coords(), MAX_LINKS_PER_BORDER))?;

        let output_file = self.working_dir.join(OUTPUT_FILE);
        if output_file.exists() {
            std::fs::remove_file(&output_file)?;
        }

        let args = [
            target_border.display().to_string(),
            source_border.display().to_string(),
            COORDS_BORDER_FILE.to_string(),
            format!("{:.6}", self.beta),
            format!("{:.6}", self.variance_multiplier),
            self.iterations.to_string(),
            "junk.image".to_string(),
            "0".to_string(),
            "0".to_string(),
        ];
        debug!("running {} {} {}", self.program, self.leading_args.join(" "), args.join(" "));

        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| self.failure(format!("could not start: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("{} {}", output.status, stderr.trim())));
        }
        debug!("{}", String::from_utf8_lossy(&output.stdout).trim());

        let borders = io::border::load(&output_file)
            .map_err(|e| self.failure(format!("unreadable {OUTPUT_FILE}: {e}")))?;
        let coords: Vec<Point3<f32>> = borders
            .iter()
            .flat_map(|b| b.links().iter().map(|l| l.position))
            .collect();
        if coords.is_empty() {
            return Err(self.failure(format!("{OUTPUT_FILE} contains no links")));
        }
        if coords.len() != flat.num_nodes() {
            return Err(self.failure(format!(
                "{OUTPUT_FILE} has {} links for {} nodes",
                coords.len(),
                flat.num_nodes()
            )));
        }
        info!("{} deformed {} nodes", self.program, coords.len());
        Ok(coords)
    }

    fn failure(&self, reason: String) -> SurfaceError {
        SurfaceError::ExternalToolFailed {
            program: self.program.clone(),
            reason,
        }
    }
}

/// Split coordinates into borders of at most `max_links` links each, in
/// node order.
pub fn coords_as_borders(coords: &[Point3<f32>], max_links: usize) -> Vec<Border> {
    coords
        .chunks(max_links.max(1))
        .enumerate()
        .map(|(i, chunk)| Border::from_positions(format!("coords_{i}"), chunk.iter().copied()))
        .collect()
}
