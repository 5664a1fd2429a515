use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sourcefresh_catalog::connect;
use sourcefresh_core::{Config, FreshnessReport, FreshnessStatus};
use sourcefresh_dbt::{DependencyGraph, Manifest};
use sourcefresh_engine::{FreshnessOptions, FreshnessTask, ProjectVars};
use sourcefresh_select::{parse_many, NodeSelector, SelectionPurpose};

const DEFAULT_CONFIG: &str = "sourcefresh.toml";

/// SourceFresh - source freshness checks for dbt projects
#[derive(Parser)]
#[command(name = "sourcefresh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sourcefresh.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commands that operate on sources
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },

    /// List the nodes a selection resolves to
    Ls(ListArgs),
}

#[derive(Subcommand)]
enum SourceCommands {
    /// Check how recently each selected source was loaded
    Freshness(FreshnessArgs),

    /// Deprecated alias for `source freshness`
    SnapshotFreshness(FreshnessArgs),
}

#[derive(Args)]
struct SelectionArgs {
    /// Nodes to include (default: all)
    #[arg(short, long, num_args = 1.., alias = "models")]
    select: Vec<String>,

    /// Nodes to exclude
    #[arg(long, num_args = 1..)]
    exclude: Vec<String>,

    /// Path to dbt manifest.json (default: manifest_path from config)
    #[arg(short, long)]
    manifest: Option<PathBuf>,
}

#[derive(Args)]
struct FreshnessArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Output file for sources.json (default: output_path from config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML mapping of project variables, e.g. '{"days": 3}'
    #[arg(long)]
    vars: Option<String>,

    /// Number of concurrent freshness queries
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args)]
struct ListArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Which nodes to keep after selection
    #[arg(long, value_enum, default_value_t = ListPurpose::Execution)]
    resource_type: ListPurpose,

    /// Output format
    #[arg(long, value_enum, default_value_t = ListFormat::Text)]
    output: ListFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListPurpose {
    /// Source nodes only
    Freshness,
    /// Everything except sources
    Execution,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Source {
            command: SourceCommands::Freshness(args),
        } => freshness_command(&config, args, cli.verbose).await,
        Commands::Source {
            command: SourceCommands::SnapshotFreshness(args),
        } => {
            tracing::warn!("'source snapshot-freshness' is deprecated; use 'source freshness'");
            freshness_command(&config, args, cli.verbose).await
        }
        Commands::Ls(args) => list_command(&config, args),
    }
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    let config = if let Some(path) = path {
        Config::from_file(path).with_context(|| format!("Failed to load config {}", path.display()))?
    } else if Path::new(DEFAULT_CONFIG).exists() {
        Config::from_file(Path::new(DEFAULT_CONFIG))?
    } else {
        if verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };
    Ok(config)
}

fn load_manifest(config: &Config, selection: &SelectionArgs, verbose: bool) -> Result<Manifest> {
    let path = match &selection.manifest {
        Some(path) => path.clone(),
        None => config.resolve_path(&config.manifest_path),
    };

    if !path.exists() {
        anyhow::bail!(
            "Manifest not found at {}. Run 'dbt compile' or 'dbt build' first.",
            path.display()
        );
    }

    if verbose {
        eprintln!("{} {}", "Loading manifest from:".cyan(), path.display());
    }
    Ok(Manifest::from_file(&path)?)
}

/// `source freshness`: probe every selected source and write sources.json
async fn freshness_command(config: &Config, args: FreshnessArgs, verbose: bool) -> Result<ExitCode> {
    let manifest = load_manifest(config, &args.selection, verbose)?;
    let vars = ProjectVars::from_yaml(args.vars.as_deref().unwrap_or_default())?;

    let warehouse = config
        .warehouse
        .as_ref()
        .context("No [warehouse] section in config; nothing to query")?;

    if verbose {
        eprintln!("{} {}...", "Connecting to".cyan(), warehouse.warehouse_type);
    }
    let adapter = connect(warehouse, config).await?;
    adapter
        .test_connection()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to warehouse: {}", e))?;

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing in-flight freshness queries");
            let _ = cancel_tx.send(true);
        }
    });

    let task = FreshnessTask::new(config, manifest, adapter)
        .with_vars(vars)
        .with_cancellation(cancel_rx);

    let options = FreshnessOptions {
        select: args.selection.select,
        exclude: args.selection.exclude,
        threads: args.threads,
    };
    let report = task.run(&options).await?;

    let output = args
        .output
        .unwrap_or_else(|| config.resolve_path(&config.output_path));
    task.write(&report, &output)?;

    print_report(&report);
    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    if report.has_failures() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// `ls`: print the node ids a selection resolves to
fn list_command(config: &Config, args: ListArgs) -> Result<ExitCode> {
    let manifest = load_manifest(config, &args.selection, false)?;
    let graph = DependencyGraph::from_manifest(&manifest)?;

    let include = parse_many(&args.selection.select)?;
    let exclude = parse_many(&args.selection.exclude)?;
    let purpose = match args.resource_type {
        ListPurpose::Freshness => SelectionPurpose::Freshness,
        ListPurpose::Execution => SelectionPurpose::Execution,
    };

    let selected = NodeSelector::new(&graph).select(include.as_ref(), exclude.as_ref(), purpose);

    for unique_id in &selected {
        match args.output {
            ListFormat::Text => println!("{}", unique_id),
            ListFormat::Json => {
                let Some(node) = graph.node(unique_id) else {
                    continue;
                };
                let line = serde_json::json!({
                    "unique_id": node.unique_id,
                    "name": node.name,
                    "resource_type": node.resource_type.as_str(),
                    "package_name": node.package_name,
                    "tags": node.tags,
                });
                println!("{}", line);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn status_label(status: FreshnessStatus) -> colored::ColoredString {
    match status {
        FreshnessStatus::Pass => "PASS".green(),
        FreshnessStatus::Warn => "WARN".yellow(),
        FreshnessStatus::Error => "ERROR STALE".red().bold(),
        FreshnessStatus::RuntimeError => "ERROR".red().bold(),
    }
}

/// Print per-source lines and a summary to stdout
fn print_report(report: &FreshnessReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Source Freshness Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    let total = report.results.len();
    for (index, result) in report.results.iter().enumerate() {
        println!(
            "{} of {} {} freshness of {} [{} in {:.2}s]",
            index + 1,
            total,
            status_label(result.status),
            result.unique_id,
            result.status.as_str(),
            result.execution_time
        );
        if result.status == FreshnessStatus::RuntimeError {
            if let Some(message) = result.message() {
                println!("    {}", message.dimmed());
            }
        }
    }

    let summary = report.summary();
    println!();
    println!("{}", "Summary:".bold());
    println!("  Sources checked: {}", summary.total);
    println!("  Pass:    {}", format!("{}", summary.passed).green());
    if summary.warned > 0 {
        println!("  Warn:    {}", format!("{}", summary.warned).yellow());
    } else {
        println!("  Warn:    {}", format!("{}", summary.warned).green());
    }
    if summary.errored + summary.runtime_errors > 0 {
        println!("  Error:   {}", format!("{}", summary.errored).red().bold());
        println!("  Runtime: {}", format!("{}", summary.runtime_errors).red().bold());
    } else {
        println!("  Error:   {}", format!("{}", summary.errored).green());
        println!("  Runtime: {}", format!("{}", summary.runtime_errors).green());
    }
    println!("  Elapsed: {:.2}s", report.elapsed_time);
    println!();

    if total == 0 {
        println!("{}", "No sources selected for freshness checks".yellow());
    } else if !report.has_failures() {
        println!("{}", "✓ All sources are fresh enough".green().bold());
    }
    println!("{}", "=".repeat(60).bright_blue());
}
