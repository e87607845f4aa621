//! Sulcus CLI - cortical surface command-line tool.
//!
//! Usage: sulcus <COMMAND> [OPTIONS]
//!
//! Run `sulcus --help` for available commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use nalgebra::Point3;

use sulcus::algo::geodesic::{dijkstra_with_progress, GeodesicOptions};
use sulcus::algo::morph::{MorphMode, MorphingParameters, MultiresolutionMorphing, StandardSphereHierarchy};
use sulcus::algo::projector::{PointProjector, ProjectionHint, ProjectorOptions};
use sulcus::algo::roi::{RoiPredicate, RoiSelection, SelectionLogic};
use sulcus::algo::roi_border::{roi_to_border_with_progress, RoiBorderOptions};
use sulcus::algo::Progress;
use sulcus::io::{self, Encoding};
use sulcus::mesh::{Border, LatLonMatrix, PaintMatrix, ScalarMatrix, Surface, SurfaceKind};
use sulcus::{Result, SurfaceError};

#[derive(Parser)]
#[command(name = "sulcus")]
#[command(author, version, about = "Cortical surface CLI", long_about = None)]
struct Cli {
    /// Raise log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Region of interest operations
    #[command(subcommand)]
    Roi(RoiCommand),

    /// Geodesic distances from one node
    Geodesic {
        #[command(flatten)]
        surface: SurfaceArgs,

        /// Source node
        #[arg(long)]
        source: usize,

        /// Restrict paths to this ROI
        #[arg(long)]
        roi: Option<PathBuf>,

        /// Leave nodes farther than this unreached
        #[arg(long)]
        max_distance: Option<f64>,

        /// Output field file
        #[arg(long)]
        out: PathBuf,
    },

    /// Project a point onto a surface
    Project {
        #[command(flatten)]
        surface: SurfaceArgs,

        /// Point as x,y,z
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        point: Point3<f32>,

        /// Projection mode
        #[arg(long, value_enum, default_value = "bary")]
        mode: ProjectMode,
    },

    /// Morph a flat map or sphere toward a fiducial reference
    Morph {
        /// Fiducial reference coordinates
        #[arg(long)]
        reference: PathBuf,

        /// Flat or spherical coordinates to morph
        #[arg(long)]
        input: PathBuf,

        /// Topology shared by both
        #[arg(long)]
        topology: PathBuf,

        /// Morphing mode
        #[arg(long, default_value = "flat")]
        mode: MorphMode,

        /// Number of cycles (default: the mode's schedule)
        #[arg(long)]
        cycles: Option<usize>,

        /// Number of levels (default: the mode's schedule)
        #[arg(long)]
        levels: Option<usize>,

        /// Directory holding sphere.<level>.coord and sphere.<level>.topo
        #[arg(long)]
        spheres: Option<PathBuf>,

        /// Border whose first link is the ventral landmark tip
        #[arg(long)]
        landmark: Option<PathBuf>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write ASCII coordinates
        #[arg(long)]
        ascii: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,

        /// Output coordinate file
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum RoiCommand {
    /// Select nodes with a predicate
    Select(RoiSelectArgs),

    /// Trace an ROI strip as a border
    Border {
        #[command(flatten)]
        surface: SurfaceArgs,

        /// ROI file
        #[arg(long)]
        roi: PathBuf,

        /// Border name
        #[arg(long)]
        name: String,

        /// First node
        #[arg(long)]
        start: Option<usize>,

        /// Last node
        #[arg(long)]
        end: Option<usize>,

        /// Distance between links
        #[arg(long, default_value = "1.0")]
        sampling: f32,

        /// Output border file
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Args)]
struct SurfaceArgs {
    /// Coordinate file
    #[arg(long)]
    surface: PathBuf,

    /// Topology file
    #[arg(long)]
    topology: PathBuf,

    /// Surface configuration
    #[arg(long, default_value = "FIDUCIAL")]
    kind: SurfaceKind,
}

#[derive(Args)]
struct RoiSelectArgs {
    #[command(flatten)]
    surface: SurfaceArgs,

    /// Selection rule
    #[arg(long, value_enum)]
    predicate: PredicateKind,

    /// How the selection merges with --roi-in
    #[arg(long, default_value = "NORMAL")]
    combine: SelectionLogic,

    /// Existing ROI to combine with
    #[arg(long)]
    roi_in: Option<PathBuf>,

    /// Attribute file (paint, metric, shape or lat-lon)
    #[arg(long)]
    attributes: Option<PathBuf>,

    /// Attribute column
    #[arg(long, default_value = "0")]
    column: usize,

    /// Paint label, by number or name
    #[arg(long)]
    label: Option<String>,

    /// Inclusive minimum
    #[arg(long, allow_hyphen_values = true)]
    min: Option<f32>,

    /// Inclusive maximum
    #[arg(long, allow_hyphen_values = true)]
    max: Option<f32>,

    /// Seed node for connected selections
    #[arg(long)]
    seed: Option<usize>,

    /// Closed border file; its first border is used
    #[arg(long)]
    border: Option<PathBuf>,

    /// Latitude range as min,max
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    lat: Option<(f32, f32)>,

    /// Longitude range as min,max
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    lon: Option<(f32, f32)>,

    /// Dilation passes after selecting
    #[arg(long, default_value = "0")]
    dilate: usize,

    /// Erosion passes after selecting
    #[arg(long, default_value = "0")]
    erode: usize,

    /// Output ROI file (prints the count when absent)
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PredicateKind {
    /// Every connected node
    All,
    /// Nodes with a paint label
    Paint,
    /// Nodes with a metric value in range
    Metric,
    /// Nodes with a shape value in range
    Shape,
    /// Metric range, connected to --seed
    MetricConnected,
    /// Shape range, connected to --seed
    ShapeConnected,
    /// Nodes inside a latitude and longitude box
    Latlon,
    /// Nodes of a flat surface inside a closed border
    Border,
    /// Nodes touching a folded tile
    Crossovers,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ProjectMode {
    /// Nearest connected node
    Nearest,
    /// Barycentric position in a tile
    Bary,
}

/// Exit code for a command line clap rejected: help and version requests
/// succeed, anything else is a user error.
fn usage_exit_code(kind: clap::error::ErrorKind) -> i32 {
    match kind {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(usage_exit_code(e.kind()));
        }
    };

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if let Err(e) = run(cli) {
        let kind = e.kind();
        if matches!(e, SurfaceError::Cancelled { .. }) {
            info!("stopped: {e}");
        }
        eprintln!("Error [{kind}]: {e}");
        std::process::exit(kind.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Roi(RoiCommand::Select(args)) => cmd_roi_select(&args),
        Commands::Roi(RoiCommand::Border {
            surface,
            roi,
            name,
            start,
            end,
            sampling,
            out,
        }) => cmd_roi_border(&surface, &roi, &name, start, end, sampling, &out),
        Commands::Geodesic {
            surface,
            source,
            roi,
            max_distance,
            out,
        } => cmd_geodesic(&surface, source, roi.as_deref(), max_distance, &out),
        Commands::Project {
            surface,
            point,
            mode,
        } => cmd_project(&surface, &point, mode),
        Commands::Morph {
            reference,
            input,
            topology,
            mode,
            cycles,
            levels,
            spheres,
            landmark,
            timeout,
            ascii,
            sequential,
            out,
        } => {
            let mut params = MorphingParameters::for_mode(mode).with_parallel(!sequential);
            if let Some(cycles) = cycles {
                params = params.with_cycles(cycles);
            }
            if let Some(levels) = levels {
                params = params.with_levels(levels);
            }
            let encoding = if ascii { Encoding::Ascii } else { Encoding::Binary };
            cmd_morph(
                &reference,
                &input,
                &topology,
                params,
                spheres.as_deref(),
                landmark.as_deref(),
                timeout.map(Duration::from_secs),
                encoding,
                &out,
            )
        }
    }
}

fn parse_point(s: &str) -> std::result::Result<Point3<f32>, String> {
    let values: Vec<f32> = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| format!("'{v}': {e}")))
        .collect::<std::result::Result<_, _>>()?;
    match values.as_slice() {
        &[x, y, z] => Ok(Point3::new(x, y, z)),
        _ => Err(format!("expected x,y,z, found '{s}'")),
    }
}

fn parse_range(s: &str) -> std::result::Result<(f32, f32), String> {
    let (lo, hi) = s
        .split_once(',')
        .ok_or_else(|| format!("expected min,max, found '{s}'"))?;
    let lo = lo.trim().parse::<f32>().map_err(|e| format!("'{lo}': {e}"))?;
    let hi = hi.trim().parse::<f32>().map_err(|e| format!("'{hi}': {e}"))?;
    Ok((lo, hi))
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0)); // Track highest percent seen (monotonic)

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Only increase, never decrease, so sub-task transitions do not bounce
        let previous = max_percent.fetch_max(raw_percent, Ordering::Relaxed);
        if raw_percent <= previous && raw_percent != 100 {
            return;
        }
        let percent = raw_percent.max(previous);

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        eprint!("\r[{bar}{space}] {percent:3}% {message:<40}");
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn load_surface(args: &SurfaceArgs) -> Result<Surface> {
    let topology = Arc::new(io::topo::load(&args.topology)?);
    let surface = io::coord::load_surface(&args.surface, topology, args.kind)?;
    println!(
        "Loaded: {} ({} nodes, {} tiles)",
        args.surface.display(),
        surface.num_nodes(),
        surface.topology().num_triangles()
    );
    Ok(surface)
}

fn require<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| SurfaceError::InvalidArgument(format!("{flag} is required for this predicate")))
}

fn cmd_roi_select(args: &RoiSelectArgs) -> Result<()> {
    let surface = load_surface(&args.surface)?;
    let n = surface.num_nodes();
    let mut roi = match &args.roi_in {
        Some(path) => io::roi::load(path, n)?,
        None => RoiSelection::new(n),
    };

    let paint: PaintMatrix;
    let scalars: ScalarMatrix;
    let latlon: LatLonMatrix;
    let borders: Vec<Border>;
    let attributes = || require(args.attributes.as_ref(), "--attributes");
    let range = || Ok::<_, SurfaceError>((require(args.min, "--min")?, require(args.max, "--max")?));

    let predicate = match args.predicate {
        PredicateKind::All => RoiPredicate::AllNodes,
        PredicateKind::Crossovers => RoiPredicate::Crossovers,
        PredicateKind::Paint => {
            paint = io::attributes::load(attributes()?)?;
            let label = require(args.label.as_deref(), "--label")?;
            match label.parse::<i32>() {
                Ok(label) => RoiPredicate::PaintValue {
                    paint: &paint,
                    column: args.column,
                    label,
                },
                Err(_) => RoiPredicate::PaintName {
                    paint: &paint,
                    column: args.column,
                    name: label,
                },
            }
        }
        PredicateKind::Metric | PredicateKind::Shape => {
            scalars = io::attributes::load(attributes()?)?;
            let (min, max) = range()?;
            if args.predicate == PredicateKind::Metric {
                RoiPredicate::MetricRange {
                    metric: &scalars,
                    column: args.column,
                    min,
                    max,
                }
            } else {
                RoiPredicate::ShapeRange {
                    shape: &scalars,
                    column: args.column,
                    min,
                    max,
                }
            }
        }
        PredicateKind::MetricConnected | PredicateKind::ShapeConnected => {
            scalars = io::attributes::load(attributes()?)?;
            let (min, max) = range()?;
            let seed = require(args.seed, "--seed")?;
            if args.predicate == PredicateKind::MetricConnected {
                RoiPredicate::MetricConnected {
                    metric: &scalars,
                    column: args.column,
                    min,
                    max,
                    seed,
                }
            } else {
                RoiPredicate::ShapeConnected {
                    shape: &scalars,
                    column: args.column,
                    min,
                    max,
                    seed,
                }
            }
        }
        PredicateKind::Latlon => {
            latlon = io::attributes::load(attributes()?)?;
            RoiPredicate::LatLonRange {
                latlon: &latlon,
                column: args.column,
                lat: require(args.lat, "--lat")?,
                lon: require(args.lon, "--lon")?,
            }
        }
        PredicateKind::Border => {
            borders = io::border::load(require(args.border.as_ref(), "--border")?)?;
            let border = borders
                .first()
                .ok_or_else(|| SurfaceError::InvalidArgument("border file holds no borders".into()))?;
            RoiPredicate::WithinBorder { border }
        }
    };

    let start = Instant::now();
    let count = roi.select(&surface, args.combine, &predicate)?;
    if args.dilate > 0 {
        roi.dilate(surface.helper(), args.dilate);
    }
    if args.erode > 0 {
        roi.erode(surface.helper(), args.erode);
    }
    let elapsed = start.elapsed();
    info!("predicate selected {count} nodes before morphology");

    match &args.out {
        Some(out) => {
            io::roi::save(out, &roi)?;
            println!("Selected {} of {} nodes", roi.count(), n);
            println!("Saved: {} ({:.2?})", out.display(), elapsed);
        }
        None => println!("{}", roi.count()),
    }
    Ok(())
}

fn cmd_roi_border(
    surface_args: &SurfaceArgs,
    roi_path: &Path,
    name: &str,
    start: Option<usize>,
    end: Option<usize>,
    sampling: f32,
    out: &Path,
) -> Result<()> {
    let surface = load_surface(surface_args)?;
    let roi = io::roi::load(roi_path, surface.num_nodes())?;

    let mut options = RoiBorderOptions::default().with_spacing(sampling);
    if let Some(start) = start {
        options = options.with_start(start);
    }
    if let Some(end) = end {
        options = options.with_end(end);
    }

    let progress = create_progress();
    let started = Instant::now();
    let border = roi_to_border_with_progress(&surface, &roi, name, &options, &progress)?;
    let elapsed = started.elapsed();

    println!("Border '{}': {} links, length {:.3}", border.name, border.num_links(), border.length());
    io::border::save(out, std::slice::from_ref(&border))?;
    println!("Saved: {} ({:.2?})", out.display(), elapsed);
    Ok(())
}

fn cmd_geodesic(
    surface_args: &SurfaceArgs,
    source: usize,
    roi_path: Option<&Path>,
    max_distance: Option<f64>,
    out: &Path,
) -> Result<()> {
    let surface = load_surface(surface_args)?;
    let roi = roi_path
        .map(|path| io::roi::load(path, surface.num_nodes()))
        .transpose()?;
    let options = GeodesicOptions {
        max_distance,
        ..GeodesicOptions::default()
    };

    let progress = create_progress();
    let start = Instant::now();
    let field = dijkstra_with_progress(&surface, source, roi.as_ref(), &options, &progress)?;
    let elapsed = start.elapsed();

    println!("Reached {} of {} nodes", field.reachable_count(), field.len());
    if let Some((node, distance)) = field.farthest_node() {
        println!("Farthest: node {node} at {distance:.4}");
    }
    io::geodesic::save(out, &field)?;
    println!("Saved: {} ({:.2?})", out.display(), elapsed);
    Ok(())
}

fn cmd_project(surface_args: &SurfaceArgs, point: &Point3<f32>, mode: ProjectMode) -> Result<()> {
    let surface = load_surface(surface_args)?;
    let hint = ProjectionHint::from(surface.kind());
    let projector = PointProjector::new(&surface, hint, ProjectorOptions::default());
    if projector.degenerate_count() > 0 {
        warn!("{} degenerate tiles skipped", projector.degenerate_count());
    }

    match mode {
        ProjectMode::Nearest => match projector.project_nearest_node(point) {
            Some(node) => println!("Nearest node: {node}"),
            None => println!("No connected node"),
        },
        ProjectMode::Bary => {
            let projection = projector.project_barycentric(point, true)?;
            match projection.tile {
                Some(tile) => {
                    let [a, b, c] = projection.nodes;
                    let [wa, wb, wc] = projection.weights;
                    let p = projection.unproject(surface.coords());
                    println!("Tile: {tile}");
                    println!("Nodes: {a} {b} {c}");
                    println!("Weights: {wa:.6} {wb:.6} {wc:.6}");
                    println!("Point: {:.4} {:.4} {:.4}", p.x, p.y, p.z);
                }
                None => println!("Outside all tiles; nearest node {}", projection.nearest_node),
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_morph(
    reference_path: &Path,
    input_path: &Path,
    topology_path: &Path,
    params: MorphingParameters,
    spheres: Option<&Path>,
    landmark: Option<&Path>,
    timeout: Option<Duration>,
    encoding: Encoding,
    out: &Path,
) -> Result<()> {
    let topology = Arc::new(io::topo::load(topology_path)?);
    let reference = io::coord::load_surface(reference_path, Arc::clone(&topology), SurfaceKind::Fiducial)?;
    let kind = match params.mode {
        MorphMode::Flat => SurfaceKind::Flat,
        MorphMode::Spherical => SurfaceKind::Spherical,
    };
    let input = io::coord::load_surface(input_path, topology, kind)?;
    println!("Loaded: {} nodes, {} tiles", input.num_nodes(), input.topology().num_triangles());

    let mode = if params.parallel { "parallel" } else { "sequential" };
    println!(
        "Morphing {} surface ({} cycles, {} levels, {})...",
        params.mode,
        params.cycles.len(),
        params.num_levels,
        mode
    );

    let max_template = params.num_levels.saturating_sub(1);
    let mut morphing = MultiresolutionMorphing::new(reference, params)?;
    if let Some(dir) = spheres {
        morphing = morphing.with_hierarchy(Arc::new(StandardSphereHierarchy::load(dir, max_template)?));
    }
    if let Some(path) = landmark {
        let border = io::border::load(path)?
            .into_iter()
            .next()
            .ok_or_else(|| SurfaceError::InvalidArgument("landmark file holds no borders".into()))?;
        morphing = morphing.with_landmark(border);
    }

    let mut progress = create_progress();
    if let Some(timeout) = timeout {
        progress = progress.with_timeout(timeout);
    }

    let start = Instant::now();
    let result = morphing.run_with_progress(input, &progress)?;
    let elapsed = start.elapsed();

    for measurement in &result.measurements {
        println!("{measurement}");
    }
    for warning in &result.warnings {
        warn!("{warning}");
    }
    io::coord::save(out, &result.surface, encoding)?;
    println!("Saved: {} ({:.2?})", out.display(), elapsed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_exit_code(args: &[&str]) -> Option<i32> {
        Cli::try_parse_from(args).err().map(|e| usage_exit_code(e.kind()))
    }

    #[test]
    fn test_usage_errors_exit_with_one() {
        assert_eq!(parse_exit_code(&["sulcus", "geodesic", "--bogus"]), Some(1));
        assert_eq!(parse_exit_code(&["sulcus", "nonsense"]), Some(1));
        assert_eq!(
            parse_exit_code(&["sulcus", "project", "--point", "1,2", "--surface", "a", "--topology", "b"]),
            Some(1)
        );
        // No subcommand at all
        assert_eq!(parse_exit_code(&["sulcus"]), Some(1));
        assert_eq!(
            parse_exit_code(&["sulcus", "project", "--point", "1,2,3", "--surface", "a", "--topology", "b"]),
            None
        );
    }

    #[test]
    fn test_help_and_version_exit_with_zero() {
        assert_eq!(parse_exit_code(&["sulcus", "--help"]), Some(0));
        assert_eq!(parse_exit_code(&["sulcus", "geodesic", "--help"]), Some(0));
        assert_eq!(parse_exit_code(&["sulcus", "--version"]), Some(0));
    }
}
