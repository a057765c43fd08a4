//! landgrid CLI - landscape metrics over categorical rasters

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use landgrid_algorithms::classification::{
    classify, parse_changes, parse_rules, search_and_replace, ClassificationConfig, ReplaceConfig,
};
use landgrid_algorithms::cluster::{cluster, ClusterConfig, ClusterType};
use landgrid_algorithms::combine::{combine, CombineConfig, Factor};
use landgrid_algorithms::diagnostics::Diagnostics;
use landgrid_algorithms::distance::{
    distance_map, AnalyzeType, DistanceConfig, DistanceFunction, DistanceType,
};
use landgrid_algorithms::landscape::{
    entity_analysis, grid_analysis, map_analysis, AnalysisConfig, MetricRaster, Positions,
    ScanOutputs, WindowScanner, ZoneConfig,
};
use landgrid_algorithms::run::{RunConfig, Treatment};
use landgrid_core::io::{read_points, read_raster, write_raster, PointFields, Table};
use landgrid_core::{Raster, RasterElement, WindowShape};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "landgrid")]
#[command(author, version, about = "Landscape metrics over categorical rasters", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (all cores by default)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Execute a run described by a properties or JSON file
    Run {
        /// Run configuration (`.properties` or `.json`)
        config: PathBuf,
    },
    /// Metrics in a window centred on every cell (or every delta-th cell)
    Sliding {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        metrics: MetricArgs,
        #[command(flatten)]
        window: WindowArgs,
        /// Scan step in cells
        #[arg(long, default_value = "1")]
        delta: usize,
        /// Fill skipped and non-scanned cells from the nearest evaluated cell
        #[arg(long)]
        interpolate: bool,
    },
    /// Metrics in windows centred on the points of point files
    Selected {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        metrics: MetricArgs,
        #[command(flatten)]
        window: WindowArgs,
        /// Point files (delimited, with a header line)
        #[arg(long, required = true, value_delimiter = ',')]
        points: Vec<PathBuf>,
        /// Points are given as row/col pixel positions instead of x/y
        #[arg(long)]
        pixels: bool,
        /// Fill windows skipped for missing data from the nearest evaluated point
        #[arg(long)]
        interpolate: bool,
    },
    /// Metrics per square tile
    Grid {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        metrics: MetricArgs,
        /// Tile sizes in cells
        #[arg(short, long, required = true, value_delimiter = ',')]
        sizes: Vec<usize>,
    },
    /// Metrics over the whole map
    Map {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        metrics: MetricArgs,
    },
    /// Metrics per entity of an entity raster
    Entity {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        metrics: MetricArgs,
        /// Raster of entity ids (0 and nodata belong to no entity)
        #[arg(long)]
        entities: PathBuf,
    },
    /// Connected clusters of selected values
    Cluster {
        #[command(flatten)]
        io: IoArgs,
        /// Values to cluster
        #[arg(long, required = true, value_delimiter = ',')]
        values: Vec<i64>,
        /// Neighbourhood: rook, queen, euclidean, functional
        #[arg(short = 't', long = "type", default_value = "rook")]
        cluster_type: ClusterType,
        /// Maximum linking distance in map units (euclidean and functional)
        #[arg(long)]
        max_distance: Option<f64>,
    },
    /// Distance to the nearest cell holding one of the source values
    Distance {
        #[command(flatten)]
        io: IoArgs,
        /// Source values
        #[arg(long, required = true, value_delimiter = ',')]
        sources: Vec<i64>,
        /// Distance model: euclidean, functional
        #[arg(short = 't', long = "type", default_value = "euclidean")]
        distance_type: DistanceType,
        /// Cells farther than this become nodata
        #[arg(long)]
        max_distance: Option<f64>,
    },
    /// Map values to classes with interval rules
    Classify {
        #[command(flatten)]
        io: IoArgs,
        /// Rules such as "([0,1[-1);([1,]-2)", first match wins
        #[arg(long)]
        domains: String,
    },
    /// Cell-by-cell formula over named factor rasters
    Combine {
        /// Factors as name=path; the first one sets the output grid
        #[arg(short = 'f', long = "factor", required = true)]
        factors: Vec<String>,
        /// Formula such as "2 * (land == 3) + slope / 10"
        #[arg(long, allow_hyphen_values = true)]
        formula: String,
        /// Output raster
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Replace listed values
    Replace {
        #[command(flatten)]
        io: IoArgs,
        /// Changes such as "(1,10);(2,20)"
        #[arg(long)]
        changes: String,
        /// Output nodata value
        #[arg(long, allow_hyphen_values = true)]
        nodata: Option<f64>,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input raster (.tif or .asc)
    input: PathBuf,
    /// Output raster; several outputs are named `<stem>_<metric>_<size>`
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Output table (`;` separated)
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Friction raster for functional windows, distances and clusters
    #[arg(long)]
    friction: Option<PathBuf>,
}

#[derive(Args)]
struct MetricArgs {
    /// Metrics, per-class prefixes or families, e.g. SHDI,HET,NP_
    #[arg(short, long, required = true, value_delimiter = ',')]
    metrics: Vec<String>,
    /// Highest share of missing cells (0 to 1) a window may have
    #[arg(long, default_value = "1.0")]
    max_missing: f64,
    /// Skip patch metrics
    #[arg(long)]
    fast: bool,
}

#[derive(Args)]
struct WindowArgs {
    /// Window sizes in cells (odd)
    #[arg(short, long, required = true, value_delimiter = ',')]
    sizes: Vec<usize>,
    /// Window shape: SQUARE, CIRCLE, FUNCTIONAL, RING:<inner>, CUSTOM:<mask>
    #[arg(long, default_value = "SQUARE")]
    shape: WindowShape,
    /// Weight cells by this distance-decay function
    #[arg(long)]
    weighted: Option<DistanceFunction>,
    /// Only evaluate windows whose centre class is listed
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    filters: Vec<i64>,
    /// Never evaluate windows whose centre class is listed
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    unfilters: Vec<i64>,
}

impl IoArgs {
    fn into_run(self, treatment: Treatment) -> RunConfig {
        RunConfig {
            input_raster: self.input,
            friction_raster: self.friction,
            output_raster: self.output,
            output_csv: self.csv,
            treatment,
        }
    }

    fn outputs(&self) -> ScanOutputs {
        ScanOutputs {
            raster: self.output.is_some(),
            table: self.csv.is_some(),
        }
    }
}

impl MetricArgs {
    fn zone(self) -> ZoneConfig {
        ZoneConfig {
            metrics: self.metrics,
            max_missing_rate: self.max_missing,
            fast: self.fast,
        }
    }
}

fn analysis(metrics: MetricArgs, window: &WindowArgs, outputs: ScanOutputs) -> AnalysisConfig {
    AnalysisConfig {
        metrics: metrics.metrics,
        shape: window.shape.clone(),
        analyze_type: if window.weighted.is_some() {
            AnalyzeType::WeightedDistance
        } else {
            AnalyzeType::Threshold
        },
        distance_function: window.weighted.unwrap_or_default(),
        max_missing_rate: metrics.max_missing,
        filters: window.filters.clone(),
        unfilters: window.unfilters.clone(),
        fast: metrics.fast,
        outputs,
        ..Default::default()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("a global tracing subscriber is already installed");
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(msg.to_string());
    pb
}

fn read_input<T: RasterElement>(path: &Path) -> Result<Raster<T>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<T> =
        read_raster(path).with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_output<T: RasterElement>(raster: &Raster<T>, path: &Path) -> Result<()> {
    write_raster(raster, path).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Raster saved to: {}", path.display());
    Ok(())
}

fn write_table(table: &Table, path: &Path) -> Result<()> {
    table
        .write(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Table saved to: {}", path.display());
    Ok(())
}

/// `<stem>_<parts>.<ext>` next to `base`, or `base` itself when there are no parts
fn derived_path(base: &Path, parts: &[String]) -> PathBuf {
    if parts.is_empty() {
        return base.to_path_buf();
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let mut name = format!("{stem}_{}", parts.join("_"));
    if let Some(ext) = base.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    base.with_file_name(name)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("points")
        .to_string()
}

/// Write one raster per metric; names carry the metric unless there is a
/// single raster overall
fn write_metric_rasters(rasters: &[MetricRaster], base: &Path, suffix: &[String], single: bool) -> Result<()> {
    for r in rasters {
        let mut parts = Vec::new();
        if !single {
            parts.push(r.metric.to_string());
            parts.extend_from_slice(suffix);
        }
        write_output(&r.raster, &derived_path(base, &parts))?;
    }
    Ok(())
}

fn parse_factor(text: &str) -> Result<Factor> {
    let (name, path) = text
        .split_once('=')
        .with_context(|| format!("Invalid factor '{text}', expected name=path"))?;
    Ok(Factor {
        name: name.trim().to_string(),
        raster: PathBuf::from(path.trim()),
    })
}

fn log_diagnostics(run: &str, diagnostics: &Diagnostics) {
    if !diagnostics.is_empty() {
        info!(run, diagnostics = diagnostics.len(), "run finished with diagnostics");
    }
}

// ─── Execution ──────────────────────────────────────────────────────────

/// Execute a run; returns whether every part completed
fn execute(run: &RunConfig) -> Result<bool> {
    let grid: Raster<f64> = read_input(&run.input_raster)?;
    let friction: Option<Raster<f64>> = run
        .friction_raster
        .as_deref()
        .map(|p| read_input::<f64>(p))
        .transpose()?;
    let start = Instant::now();
    let mut complete = true;

    match &run.treatment {
        Treatment::Sliding { .. } | Treatment::Selected { .. } => {
            let mut scanner = WindowScanner::new(&grid);
            if let Some(f) = &friction {
                scanner = scanner.with_friction(f).context("Friction raster does not match the input")?;
            }
            let pb = progress_bar("Scanning");
            let bar = pb.clone();
            let mut scanner = scanner.with_progress(move |done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            });

            let analyses = run.analyses();
            let multi_size = analyses.len() > 1;
            let point_sets: Vec<(Option<String>, Option<Positions>)> = match &run.treatment {
                Treatment::Selected { point_files, fields, .. } => point_files
                    .iter()
                    .map(|file| {
                        let points = read_points(file, fields)
                            .with_context(|| format!("Failed to read points {}", file.display()))?;
                        info!(file = %file.display(), points = points.len(), "points loaded");
                        let label = (point_files.len() > 1).then(|| file_stem(file));
                        Ok((label, Some(Positions::Points(points))))
                    })
                    .collect::<Result<_>>()?,
                _ => vec![(None, None)],
            };

            let mut batch: Vec<(Vec<String>, AnalysisConfig)> = Vec::new();
            for (label, positions) in &point_sets {
                for config in &analyses {
                    let mut config = config.clone();
                    if let Some(p) = positions {
                        config.positions = p.clone();
                    }
                    let mut suffix: Vec<String> = label.iter().cloned().collect();
                    if multi_size {
                        suffix.push(config.size.to_string());
                    }
                    batch.push((suffix, config));
                }
            }
            let configs: Vec<AnalysisConfig> = batch.iter().map(|(_, c)| c.clone()).collect();
            let reports = scanner.run_batch(&configs);

            for ((suffix, config), report) in batch.iter().zip(reports) {
                let report = match report {
                    Ok(report) => report,
                    Err(e) => {
                        warn!(size = config.size, "analysis failed: {e}");
                        complete = false;
                        continue;
                    }
                };
                if !report.is_complete() {
                    warn!(size = config.size, "scan interrupted, outputs hold the finished prefix");
                    complete = false;
                }
                if let Some(base) = &run.output_raster {
                    let single = report.rasters.len() == 1 && !multi_size && point_sets.len() == 1;
                    write_metric_rasters(&report.rasters, base, suffix, single)?;
                }
                if let (Some(table), Some(base)) = (&report.table, &run.output_csv) {
                    write_table(table, &derived_path(base, suffix))?;
                }
                log_diagnostics("window analysis", &report.diagnostics);
            }
            pb.finish_and_clear();
        }

        Treatment::Grid { sizes, zone } => {
            for &size in sizes {
                let result = match grid_analysis(&grid, friction.as_ref(), size, zone) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(size, "tile analysis failed: {e}");
                        complete = false;
                        continue;
                    }
                };
                let suffix = if sizes.len() > 1 { vec![size.to_string()] } else { Vec::new() };
                if let Some(base) = &run.output_raster {
                    let single = result.rasters.len() == 1 && sizes.len() == 1;
                    write_metric_rasters(&result.rasters, base, &suffix, single)?;
                }
                if let Some(base) = &run.output_csv {
                    write_table(&result.table, &derived_path(base, &suffix))?;
                }
                log_diagnostics("tile analysis", &result.diagnostics);
            }
        }

        Treatment::Map { zone } => {
            let result = map_analysis(&grid, friction.as_ref(), zone).context("Map analysis failed")?;
            for (name, value) in result.table.columns().iter().zip(result.table.rows().iter().flatten()) {
                println!("  {name}: {value}");
            }
            if let Some(base) = &run.output_csv {
                write_table(&result.table, base)?;
            }
            log_diagnostics("map analysis", &result.diagnostics);
        }

        Treatment::Entity { entity_raster, zone } => {
            let entities: Raster<i32> = read_input(entity_raster)?;
            let result = entity_analysis(&grid, &entities, friction.as_ref(), zone).context("Entity analysis failed")?;
            if let Some(base) = &run.output_raster {
                write_metric_rasters(&result.rasters, base, &[], result.rasters.len() == 1)?;
            }
            if let Some(base) = &run.output_csv {
                write_table(&result.table, base)?;
            }
            log_diagnostics("entity analysis", &result.diagnostics);
        }

        Treatment::Cluster { cluster: config } => {
            let result = cluster(&grid, friction.as_ref(), config).context("Clustering failed")?;
            println!("Clusters: {}", result.clusters.len());
            if let Some(path) = &run.output_raster {
                write_output(&result.raster, path)?;
            }
            if let Some(path) = &run.output_csv {
                write_table(&result.table()?, path)?;
            }
            log_diagnostics("clustering", &result.diagnostics);
        }

        Treatment::Distance { distance } => {
            let result = distance_map(&grid, friction.as_ref(), distance).context("Distance map failed")?;
            if let Some(path) = &run.output_raster {
                write_output(&result.raster, path)?;
            }
            log_diagnostics("distance map", &result.diagnostics);
        }

        Treatment::Classification { classification } => {
            let result = classify(&grid, classification).context("Classification failed")?;
            if let Some(path) = &run.output_raster {
                write_output(&result.raster, path)?;
            }
            log_diagnostics("classification", &result.diagnostics);
        }

        Treatment::SearchAndReplace { replace } => {
            let result = search_and_replace(&grid, replace).context("Search and replace failed")?;
            if let Some(path) = &run.output_raster {
                write_output(&result.raster, path)?;
            }
            log_diagnostics("search and replace", &result.diagnostics);
        }

        Treatment::Combine { combine: config } => {
            let rasters: Vec<Raster<f64>> = config
                .factors
                .iter()
                .map(|f| {
                    if f.raster == run.input_raster {
                        Ok(grid.clone())
                    } else {
                        read_input(&f.raster)
                    }
                })
                .collect::<Result<_>>()?;
            let factors: Vec<(&str, &Raster<f64>)> = config
                .factors
                .iter()
                .zip(&rasters)
                .map(|(f, r)| (f.name.as_str(), r))
                .collect();
            let result = combine(&grid, &factors, &config.formula).context("Combination failed")?;
            if let Some(path) = &run.output_raster {
                write_output(&result.raster, path)?;
            }
            log_diagnostics("combination", &result.diagnostics);
        }
    }

    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(complete)
}

/// Write the resolved configuration next to the first output
fn write_snapshot(run: &RunConfig) -> Result<()> {
    let Some(base) = run.output_raster.as_ref().or(run.output_csv.as_ref()) else {
        return Ok(());
    };
    let path = base.with_extension("properties");
    run.to_properties()
        .write(&path, &format!(" landgrid {} run", run.treatment.name()))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "run configuration saved");
    Ok(())
}

/// Execute a run and snapshot its configuration if every part completed
fn run_request(run: &RunConfig) -> Result<bool> {
    info!(treatment = run.treatment.name(), "starting run");
    let complete = execute(run)?;
    if complete {
        write_snapshot(run)?;
    } else {
        warn!("run incomplete, no properties snapshot written");
    }
    Ok(complete)
}

fn print_info(input: &Path) -> Result<()> {
    let raster: Raster<f64> = read_input(input)?;
    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = raster.crs() {
        println!("CRS: {}", crs);
    }
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    let classes = raster.distinct_classes();
    println!("Classes: {} {:?}", classes.len(), classes);
    println!(
        "Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the thread pool")?;
    }

    let run = match cli.command {
        Commands::Info { input } => return print_info(&input),
        Commands::Run { config } => RunConfig::load(&config)
            .with_context(|| format!("Invalid run configuration {}", config.display()))?,
        Commands::Sliding {
            io,
            metrics,
            window,
            delta,
            interpolate,
        } => {
            let mut analysis = analysis(metrics, &window, io.outputs());
            analysis.positions = Positions::Lattice { delta };
            analysis.interpolate = interpolate;
            io.into_run(Treatment::Sliding {
                sizes: window.sizes,
                analysis,
            })
        }
        Commands::Selected {
            io,
            metrics,
            window,
            points,
            pixels,
            interpolate,
        } => {
            let mut analysis = analysis(metrics, &window, io.outputs());
            analysis.interpolate = interpolate;
            io.into_run(Treatment::Selected {
                sizes: window.sizes,
                point_files: points,
                fields: if pixels { PointFields::pixels() } else { PointFields::coordinates() },
                analysis,
            })
        }
        Commands::Grid { io, metrics, sizes } => io.into_run(Treatment::Grid {
            sizes,
            zone: metrics.zone(),
        }),
        Commands::Map { io, metrics } => io.into_run(Treatment::Map { zone: metrics.zone() }),
        Commands::Entity { io, metrics, entities } => io.into_run(Treatment::Entity {
            entity_raster: entities,
            zone: metrics.zone(),
        }),
        Commands::Cluster {
            io,
            values,
            cluster_type,
            max_distance,
        } => io.into_run(Treatment::Cluster {
            cluster: ClusterConfig {
                values,
                cluster_type,
                max_distance,
            },
        }),
        Commands::Distance {
            io,
            sources,
            distance_type,
            max_distance,
        } => io.into_run(Treatment::Distance {
            distance: DistanceConfig {
                sources,
                distance_type,
                max_distance,
            },
        }),
        Commands::Classify { io, domains } => {
            let rules = parse_rules(&domains).context("Invalid domains")?;
            io.into_run(Treatment::Classification {
                classification: ClassificationConfig { rules },
            })
        }
        Commands::Combine {
            factors,
            formula,
            output,
        } => {
            let factors = factors.iter().map(|f| parse_factor(f)).collect::<Result<Vec<_>>>()?;
            let input_raster = factors
                .first()
                .map(|f| f.raster.clone())
                .context("At least one factor is required")?;
            RunConfig {
                input_raster,
                friction_raster: None,
                output_raster: Some(output),
                output_csv: None,
                treatment: Treatment::Combine {
                    combine: CombineConfig { formula, factors },
                },
            }
        }
        Commands::Replace { io, changes, nodata } => {
            let changes = parse_changes(&changes).context("Invalid changes")?;
            io.into_run(Treatment::SearchAndReplace {
                replace: ReplaceConfig {
                    changes,
                    nodata_value: nodata,
                },
            })
        }
    };

    run_request(&run)?;
    Ok(())
}
