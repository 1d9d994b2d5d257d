//! geostat CLI - variogram fitting, kriging and simulation for point files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geo::Point;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use geostat_algorithms::index::KdTree;
use geostat_algorithms::kriging::{
    DriftOrder, GridKrigingParams, KrigingEngine, KrigingOptions, SpatialCovariance, Target, Trend,
    krige_grid,
};
use geostat_algorithms::simulation::{RNG_STREAM_VERSION, SequentialSimulator, SimulationParams};
use geostat_algorithms::variogram::{
    Estimator, FitParams, ModelRecord, StructureKind, VariogramModel, VariogramParams,
    empirical_variogram, fit_best_variogram,
};
use geostat_core::{GridSpec, Observation, PlanarGeometry, validate_observations};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geostat")]
#[command(author, version, about = "Geostatistical prediction for point data", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the empirical variogram of a point file
    Variogram {
        /// Input points: x,y,value[,covariates...]
        input: PathBuf,
        #[command(flatten)]
        bins: BinArgs,
        /// Output JSON file (prints a table when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Fit a variogram model and write it as JSON
    Fit {
        /// Input points: x,y,value[,covariates...]
        input: PathBuf,
        #[command(flatten)]
        bins: BinArgs,
        /// Candidate structures, comma separated
        #[arg(short, long, default_value = "spherical,exponential,gaussian")]
        models: String,
        /// Fit without a nugget
        #[arg(long)]
        no_nugget: bool,
        /// Output JSON file (prints to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Krige a regular grid
    Krige {
        /// Input points: x,y,value[,covariates...]
        input: PathBuf,
        /// Fitted model JSON (from `geostat fit`)
        model: PathBuf,
        #[command(flatten)]
        grid: GridArgs,
        #[command(flatten)]
        search: SearchArgs,
        /// Predict cell averages instead of cell centres
        #[arg(long)]
        block: bool,
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Sequential Gaussian simulation on a regular grid
    Simulate {
        /// Input points: x,y,value[,covariates...]
        input: PathBuf,
        /// Fitted model JSON (from `geostat fit`)
        model: PathBuf,
        #[command(flatten)]
        grid: GridArgs,
        #[command(flatten)]
        search: SearchArgs,
        /// Number of realizations
        #[arg(short = 'n', long, default_value = "1")]
        realizations: usize,
        /// Random seed
        #[arg(short, long, default_value = "0")]
        seed: u64,
        /// Output CSV file, one column per realization
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct BinArgs {
    /// Maximum pair distance (default: a third of the bounding diagonal)
    #[arg(long)]
    cutoff: Option<f64>,
    /// Bin width (default: cutoff / 15)
    #[arg(long)]
    width: Option<f64>,
    /// Estimator: matheron, cressie
    #[arg(short, long, default_value = "matheron")]
    estimator: String,
    /// Remove a trend before pairing: constant, linear, quadratic
    #[arg(short, long, default_value = "constant")]
    drift: String,
}

#[derive(clap::Args)]
struct GridArgs {
    /// Grid extent: xmin ymin xmax ymax
    #[arg(long, num_args = 4, value_names = ["XMIN", "YMIN", "XMAX", "YMAX"], allow_negative_numbers = true)]
    extent: Vec<f64>,
    #[arg(long)]
    rows: usize,
    #[arg(long)]
    cols: usize,
}

#[derive(clap::Args)]
struct SearchArgs {
    /// Maximum neighbours per prediction
    #[arg(long, default_value = "16")]
    nmax: usize,
    /// Maximum search radius
    #[arg(long)]
    radius: Option<f64>,
    /// Trend: constant, linear, quadratic
    #[arg(short, long, default_value = "constant")]
    drift: String,
    /// Known mean (simple kriging; overrides the trend)
    #[arg(long, allow_negative_numbers = true)]
    mean: Option<f64>,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// Parse `x,y,value[,covariates...]` lines. Commas or whitespace separate
/// fields; blank lines, `#` comments and a non-numeric header are skipped.
fn parse_points(text: &str) -> Result<Vec<Observation<Point<f64>>>> {
    let mut points = Vec::new();
    let mut header_checked = false;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        let parsed: std::result::Result<Vec<f64>, _> = fields.iter().map(|f| f.parse::<f64>()).collect();
        let first = !header_checked;
        header_checked = true;
        let values = match parsed {
            Ok(v) => v,
            Err(_) if first => continue,
            Err(e) => anyhow::bail!("line {}: {}", lineno + 1, e),
        };
        if values.len() < 3 {
            anyhow::bail!("line {}: expected x,y,value, got {} fields", lineno + 1, values.len());
        }
        points.push(Observation::with_covariates(
            Point::new(values[0], values[1]),
            values[2],
            values[3..].to_vec(),
        ));
    }
    Ok(points)
}

fn read_points(path: &Path) -> Result<Vec<Observation<Point<f64>>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let points = parse_points(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
    validate_observations(&points).context("Invalid observations")?;
    info!(points = points.len(), "read {}", path.display());
    Ok(points)
}

fn read_model(path: &Path) -> Result<VariogramModel> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let record: ModelRecord = serde_json::from_str(&text).context("Failed to parse model JSON")?;
    VariogramModel::from_record(&record).context("Invalid variogram model")
}

fn parse_estimator(name: &str) -> Result<Estimator> {
    match name.to_lowercase().as_str() {
        "matheron" | "classical" => Ok(Estimator::Matheron),
        "cressie" | "robust" => Ok(Estimator::Cressie),
        _ => anyhow::bail!("Unknown estimator: {}. Use matheron or cressie.", name),
    }
}

fn parse_trend(name: &str) -> Result<Trend<Point<f64>>> {
    match name.to_lowercase().as_str() {
        "constant" | "none" | "ordinary" => Ok(Trend::intercept()),
        "linear" => Ok(Trend::polynomial(DriftOrder::Linear)),
        "quadratic" => Ok(Trend::polynomial(DriftOrder::Quadratic)),
        _ => anyhow::bail!("Unknown drift: {}. Use constant, linear, or quadratic.", name),
    }
}

fn parse_kinds(list: &str) -> Result<Vec<StructureKind>> {
    list.split(',')
        .map(|s| match StructureKind::from_code(s.trim()) {
            Some(StructureKind::Nugget) => {
                anyhow::bail!("Nugget is not a candidate model; it is fitted unless --no-nugget")
            }
            Some(kind) => Ok(kind),
            None => anyhow::bail!("Unknown model: {}", s.trim()),
        })
        .collect()
}

fn variogram_params(args: &BinArgs) -> Result<VariogramParams<Point<f64>>> {
    Ok(VariogramParams {
        cutoff: args.cutoff,
        width: args.width,
        estimator: parse_estimator(&args.estimator)?,
        trend: Some(parse_trend(&args.drift)?),
        ..Default::default()
    })
}

fn grid_spec(args: &GridArgs) -> Result<GridSpec> {
    let [x_min, y_min, x_max, y_max] = args.extent[..] else {
        anyhow::bail!("--extent needs exactly four values");
    };
    GridSpec::from_extent(x_min, y_min, x_max, y_max, args.rows, args.cols).context("Invalid grid")
}

fn kriging_setup(args: &SearchArgs) -> Result<(Trend<Point<f64>>, KrigingOptions)> {
    let trend = if args.mean.is_some() {
        Trend::empty()
    } else {
        parse_trend(&args.drift)?
    };
    let options = KrigingOptions {
        nmax: Some(args.nmax),
        max_radius: args.radius,
        mean: args.mean,
        ..Default::default()
    };
    Ok((trend, options))
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn create_csv(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Variogram {
            input,
            bins,
            output,
        } => {
            let points = read_points(&input)?;
            let params = variogram_params(&bins)?;
            let start = Instant::now();
            let emp = empirical_variogram(&PlanarGeometry::default(), &points, &params)
                .context("Failed to compute variogram")?;
            let elapsed = start.elapsed();

            match output {
                Some(path) => {
                    write_json(&emp, Some(&path))?;
                    done("Variogram", &path, elapsed);
                }
                None => {
                    println!("{:>12} {:>12} {:>10} {:>14}", "lag_lower", "mean_lag", "pairs", "semivariance");
                    for b in &emp.bins {
                        println!(
                            "{:>12.4} {:>12.4} {:>10} {:>14.6}",
                            b.lag_lower, b.mean_lag, b.pair_count, b.semivariance
                        );
                    }
                    println!("Cutoff: {:.4}", emp.cutoff);
                }
            }
        }

        Commands::Fit {
            input,
            bins,
            models,
            no_nugget,
            output,
        } => {
            let points = read_points(&input)?;
            let params = variogram_params(&bins)?;
            let kinds = parse_kinds(&models)?;
            let start = Instant::now();
            let emp = empirical_variogram(&PlanarGeometry::default(), &points, &params)
                .context("Failed to compute variogram")?;

            let pb = spinner("Fitting variogram...");
            let fitted = fit_best_variogram(
                &emp,
                &kinds,
                &FitParams {
                    fit_nugget: !no_nugget,
                    ..Default::default()
                },
            );
            pb.finish_and_clear();
            let fitted = fitted.context("Failed to fit variogram")?;
            let elapsed = start.elapsed();

            info!(model = %fitted.model, rss = fitted.rss, iterations = fitted.iterations, "fitted");
            write_json(&fitted.model.to_record(), output.as_deref())?;
            if let Some(path) = &output {
                done("Model", path, elapsed);
            }
        }

        Commands::Krige {
            input,
            model,
            grid,
            search,
            block,
            output,
        } => {
            let points = read_points(&input)?;
            let model = read_model(&model)?;
            let grid = grid_spec(&grid)?;
            let (trend, options) = kriging_setup(&search)?;

            let pb = spinner("Kriging...");
            let start = Instant::now();
            let result = krige_grid(
                &points,
                &model,
                &grid,
                GridKrigingParams {
                    block,
                    trend,
                    options,
                    ..Default::default()
                },
            );
            pb.finish_and_clear();
            let result = result.context("Failed to krige grid")?;
            let elapsed = start.elapsed();

            let mut out = create_csv(&output)?;
            writeln!(out, "row,col,x,y,estimate,variance")?;
            for row in 0..grid.rows {
                for col in 0..grid.cols {
                    let c = grid.cell_center(row, col);
                    writeln!(
                        out,
                        "{},{},{},{},{},{}",
                        row,
                        col,
                        c.x(),
                        c.y(),
                        result.estimate[[row, col]],
                        result.variance[[row, col]]
                    )?;
                }
            }
            out.flush()?;
            if result.failed > 0 {
                eprintln!("{} of {} cells could not be predicted (NaN)", result.failed, grid.len());
            }
            done("Kriging", &output, elapsed);
        }

        Commands::Simulate {
            input,
            model,
            grid,
            search,
            realizations,
            seed,
            output,
        } => {
            let points = read_points(&input)?;
            let model = read_model(&model)?;
            let grid = grid_spec(&grid)?;
            let (trend, options) = kriging_setup(&search)?;

            let geometry = PlanarGeometry::default();
            let engine = KrigingEngine::new(geometry, SpatialCovariance::new(model, geometry), trend, options)
                .context("Invalid kriging setup")?;
            let index = KdTree::build(&points);
            let targets: Vec<Target<Point<f64>, geo::Polygon<f64>>> =
                grid.centers().into_iter().map(Target::point).collect();

            let simulator = SequentialSimulator::new(
                &engine,
                SimulationParams {
                    n_realizations: realizations,
                    seed,
                    cancel: None,
                },
            );
            let pb = spinner(&format!("Simulating {} realizations...", realizations));
            let start = Instant::now();
            let result = simulator.simulate_all(&index, &targets);
            pb.finish_and_clear();
            let result = result.context("Simulation failed")?;
            let elapsed = start.elapsed();

            let mut out = create_csv(&output)?;
            write!(out, "row,col,x,y")?;
            for r in &result {
                write!(out, ",sim_{}", r.index)?;
            }
            writeln!(out)?;
            for (t, target) in targets.iter().enumerate() {
                let Target::Point { location, .. } = target else {
                    continue;
                };
                write!(out, "{},{},{},{}", t / grid.cols, t % grid.cols, location.x(), location.y())?;
                for r in &result {
                    write!(out, ",{}", r.values[t])?;
                }
                writeln!(out)?;
            }
            out.flush()?;
            info!(seed, stream_version = RNG_STREAM_VERSION, "simulation finished");
            done("Simulation", &output, elapsed);
        }
    }

    Ok(())
}
