mod scenarios;

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use kmeans_core::{load_json, save_json, write_points};
use kmeans_engine::{CentroidSource, Orchestrator, RunConfig, RunOutcome, RunReport};
use scenarios::ScenarioKind;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(about = "Iterative map/aggregate k-means clustering")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Cluster a point file until convergence or the iteration cap
    Run(RunArgs),
    /// Write a synthetic point file from a named scenario
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Point records, one tab-separated vector per line
    #[arg(required_unless_present = "config")]
    input: Option<PathBuf>,
    /// Directory for each round's part files
    #[arg(required_unless_present = "config")]
    output: Option<PathBuf>,
    /// Initial centroid file, or a count of centroids to sample from the input
    #[arg(required_unless_present = "config")]
    centroids: Option<CentroidSource>,
    /// Maximum number of rounds
    #[arg(required_unless_present = "config")]
    max_iterations: Option<usize>,
    /// Largest centroid shift still counted as converged
    #[arg(required_unless_present = "config")]
    threshold: Option<f64>,
    /// Parallelism of the global aggregation stage
    #[arg(required_unless_present = "config")]
    num_reducers: Option<usize>,
    /// Load run parameters from a JSON file; positional arguments override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for centroid sampling (default: OS entropy)
    #[arg(long)]
    seed: Option<u64>,
    /// Number of map partitions per round
    #[arg(long)]
    partitions: Option<usize>,
    /// Skip the local pre-aggregation stage
    #[arg(long)]
    no_combine: bool,
    /// Point records carry a leading id column
    #[arg(long)]
    point_id_column: bool,
    /// Directory for sampled initial centroids
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Export the run report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// List the baked-in dataset scenarios
    #[arg(long)]
    list_scenarios: bool,
    /// Scenario to generate
    #[arg(long, value_enum, default_value = "smoke")]
    scenario: ScenarioKind,
    /// Destination point file
    #[arg(long, required_unless_present = "list_scenarios")]
    out: Option<PathBuf>,
    /// RNG seed used for dataset generation
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => run(args),
        Command::Generate(args) => generate(args),
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt().with_env_filter(filter).with_target(false).init();
}

fn run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let orchestrator = Orchestrator::local(config).context("invalid run parameters")?;
    let report = orchestrator.run().context("k-means run failed")?;

    print_summary(&report);

    if let Some(path) = args.report_json.as_deref() {
        save_json(&report, path)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
        println!("Wrote run report to {}", path.display());
    }
    Ok(())
}

fn build_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => load_json::<RunConfig>(path)
            .with_context(|| format!("failed to load run config from {}", path.display()))?,
        None => {
            let (Some(input), Some(output), Some(centroids)) =
                (&args.input, &args.output, &args.centroids)
            else {
                bail!("input, output and centroids are required without --config");
            };
            RunConfig::new(input, output, centroids.clone())
        }
    };

    if let Some(input) = &args.input {
        config.input = input.clone();
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if let Some(centroids) = &args.centroids {
        config.centroids = centroids.clone();
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(num_reducers) = args.num_reducers {
        config.num_reducers = num_reducers;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.partitions.is_some() {
        config.num_partitions = args.partitions;
    }
    if args.no_combine {
        config.combine = false;
    }
    if args.point_id_column {
        config.point_id_column = true;
    }
    if args.work_dir.is_some() {
        config.work_dir = args.work_dir.clone();
    }

    Ok(config)
}

fn print_summary(report: &RunReport) {
    for round in &report.rounds {
        println!("Current iteration: {}", round.iteration);
        println!("Unconverged centroids: {}", round.unconverged);
    }

    let outcome = match report.outcome {
        RunOutcome::Converged => "converged",
        RunOutcome::MaxIterExceeded => "iteration cap reached",
        RunOutcome::Cancelled => "cancelled",
    };
    let elapsed_ms: f64 = report.rounds.iter().map(|round| round.elapsed_ms).sum();
    println!(
        "Outcome: {} | Rounds: {} | Centroids: {} | Dim: {} | Total: {:.2} ms | Snapshot: {}",
        outcome,
        report.iterations,
        report.centroids.len(),
        report.centroids.dimension(),
        elapsed_ms,
        report.final_snapshot.display()
    );
}

fn generate(args: GenerateArgs) -> Result<()> {
    if args.list_scenarios {
        scenarios::print_available();
        return Ok(());
    }
    let Some(out) = args.out.as_deref() else {
        bail!("--out is required unless --list-scenarios is given");
    };

    let details = args.scenario.details();
    println!("Using scenario '{}' – {}", details.slug, details.description);
    let points = details
        .config
        .generate(args.seed)
        .with_context(|| format!("failed to generate scenario '{}'", details.slug))?;
    export_points(out, &points)?;
    info!(points = points.len(), path = %out.display(), "wrote synthetic dataset");
    println!("Wrote {} points to {}", points.len(), out.display());
    Ok(())
}

fn export_points(path: &Path, points: &[kmeans_core::Point]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create point file at {}", path.display()))?;
    write_points(BufWriter::new(file), points)
        .with_context(|| format!("failed to write points to {}", path.display()))?;
    Ok(())
}
