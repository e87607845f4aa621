//! Error types for sulcus.
//!
//! Every fallible operation in the crate returns [`SurfaceError`]. Each variant
//! maps onto one of a small set of stable [`ErrorKind`]s, which the command-line
//! tool uses to pick an exit code.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`SurfaceError`].
pub type Result<T> = std::result::Result<T, SurfaceError>;

/// Errors that can occur during surface operations.
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// The surface or topology has no nodes or no triangles.
    #[error("surface is empty: {0}")]
    EmptySurface(String),

    /// A node index is outside `[0, N)`.
    #[error("node index {node} is out of range for {num_nodes} nodes")]
    NodeOutOfRange {
        /// The offending node index.
        node: usize,
        /// Number of nodes in the surface.
        num_nodes: usize,
    },

    /// A triangle references an invalid node index.
    #[error("triangle {triangle} references invalid node index {node} ({num_nodes} nodes)")]
    InvalidTriangle {
        /// The triangle index.
        triangle: usize,
        /// The invalid node index.
        node: usize,
        /// Number of nodes in the topology.
        num_nodes: usize,
    },

    /// A triangle has duplicate node indices.
    #[error("triangle {triangle} is degenerate (has duplicate nodes)")]
    DegenerateTriangle {
        /// The triangle index.
        triangle: usize,
    },

    /// Coordinates and topology disagree on the node count.
    #[error("coordinate count {coords} does not match topology node count {topology}")]
    NodeCountMismatch {
        /// Number of coordinates supplied.
        coords: usize,
        /// Number of nodes the topology expects.
        topology: usize,
    },

    /// Geodesic source is not part of the region of interest.
    #[error("source node {node} is not in the region of interest")]
    SourceNotInRoi {
        /// The source node.
        node: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// Malformed input that is not covered by a more specific variant.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested path crosses a gap in the surface graph.
    #[error("node {to} is not connected to node {from}")]
    NotConnected {
        /// Start of the requested path.
        from: usize,
        /// Unreachable end of the requested path.
        to: usize,
    },

    /// A triangle or polygon collapsed during a geometric computation.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// A subsampling level could not be built.
    #[error("subsampling failed at level {level}: {reason}")]
    SubsampleFailed {
        /// The level being built.
        level: usize,
        /// What went wrong.
        reason: String,
    },

    /// The morphing kernel is folding the surface faster than it can recover.
    #[error(
        "morphing diverged at cycle {cycle}, level {level}: crossovers rose from {before} to {after}"
    )]
    DivergenceDetected {
        /// Cycle index.
        cycle: usize,
        /// Level index.
        level: usize,
        /// Tile crossovers before the iteration.
        before: usize,
        /// Tile crossovers after the iteration.
        after: usize,
    },

    /// The external deformation program failed.
    #[error("external tool {program} failed: {reason}")]
    ExternalToolFailed {
        /// Program that was run.
        program: String,
        /// Exit status or missing-output description.
        reason: String,
    },

    /// The caller cancelled the operation or its deadline passed.
    #[error("operation cancelled: {reason}")]
    Cancelled {
        /// Why the operation stopped.
        reason: &'static str,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file was readable but its content is malformed.
    #[error("failed to parse {path} (line {line}): {message}")]
    Parse {
        /// The file path.
        path: PathBuf,
        /// 1-based line number, or 0 for binary sections.
        line: usize,
        /// Error message.
        message: String,
    },
}

/// Stable error categories shared by the library and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input.
    InvalidArgument,
    /// Path crosses a graph gap.
    NotConnected,
    /// Collapsed triangle or polygon.
    DegenerateGeometry,
    /// No triangles retained in a level.
    SubsampleFailed,
    /// Morphing kernel diverging.
    DivergenceDetected,
    /// Deformation subprocess failed.
    ExternalToolFailed,
    /// Caller requested cancellation.
    Cancelled,
    /// File missing, unreadable, or malformed.
    IoError,
}

impl ErrorKind {
    /// Stable identifier of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotConnected => "NOT_CONNECTED",
            ErrorKind::DegenerateGeometry => "DEGENERATE_GEOMETRY",
            ErrorKind::SubsampleFailed => "SUBSAMPLE_FAILED",
            ErrorKind::DivergenceDetected => "DIVERGENCE_DETECTED",
            ErrorKind::ExternalToolFailed => "EXTERNAL_TOOL_FAILED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::IoError => "IO_ERROR",
        }
    }

    /// Process exit code for this kind: 1 user error, 2 algorithmic failure,
    /// 3 external tool failure.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InvalidArgument | ErrorKind::IoError => 1,
            ErrorKind::NotConnected
            | ErrorKind::DegenerateGeometry
            | ErrorKind::SubsampleFailed
            | ErrorKind::DivergenceDetected
            | ErrorKind::Cancelled => 2,
            ErrorKind::ExternalToolFailed => 3,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SurfaceError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        SurfaceError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a parse error for a file.
    pub fn parse<P: Into<PathBuf>, M: Into<String>>(path: P, line: usize, message: M) -> Self {
        SurfaceError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// The stable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SurfaceError::EmptySurface(_)
            | SurfaceError::NodeOutOfRange { .. }
            | SurfaceError::InvalidTriangle { .. }
            | SurfaceError::DegenerateTriangle { .. }
            | SurfaceError::NodeCountMismatch { .. }
            | SurfaceError::SourceNotInRoi { .. }
            | SurfaceError::InvalidParameter { .. }
            | SurfaceError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SurfaceError::NotConnected { .. } => ErrorKind::NotConnected,
            SurfaceError::DegenerateGeometry(_) => ErrorKind::DegenerateGeometry,
            SurfaceError::SubsampleFailed { .. } => ErrorKind::SubsampleFailed,
            SurfaceError::DivergenceDetected { .. } => ErrorKind::DivergenceDetected,
            SurfaceError::ExternalToolFailed { .. } => ErrorKind::ExternalToolFailed,
            SurfaceError::Cancelled { .. } => ErrorKind::Cancelled,
            SurfaceError::Io(_) | SurfaceError::Parse { .. } => ErrorKind::IoError,
        }
    }

    /// Returns true for [`ErrorKind::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}
