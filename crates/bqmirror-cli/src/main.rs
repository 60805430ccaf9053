use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use bqmirror_cache::CacheStore;
use bqmirror_core::{Config, RefreshReport};
use bqmirror_engine::{
    directory_from_config, open_store, DiagnosticEngine, FetchOptions, SchemaFetcher, Validation,
};
use bqmirror_sql::SqlTokenizer;

/// bqmirror - local BigQuery schema mirror and dry-run diagnostics
#[derive(Parser)]
#[command(name = "bqmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: bqmirror.toml)
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
    /// Remove every cached project, dataset, table and column
    ClearCache,

    /// Refresh the cache; columns are fetched for datasets named in FILES
    UpdateCache {
        /// SQL files whose text gates which datasets get column fetches
        files: Vec<PathBuf>,

        /// Print the refresh report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a SQL file with a warehouse dry run
    DryRun {
        /// SQL file to validate
        file: PathBuf,
    },

    /// Print the cached hierarchy
    Show {
        /// Only this project
        project: Option<String>,

        /// Only this dataset (requires a project)
        dataset: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::ClearCache => clear_cache_command(&config, cli.verbose),
        Commands::UpdateCache { files, json } => {
            update_cache_command(&config, &files, json, cli.verbose).await
        }
        Commands::DryRun { file } => dry_run_command(&config, &file, cli.verbose).await,
        Commands::Show { project, dataset } => {
            show_command(&config, project.as_deref(), dataset.as_deref())
        }
    }
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(config_path) = path {
        return Config::from_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()));
    }

    let default_path = Path::new(Config::FILE_NAME);
    if default_path.exists() {
        return Ok(Config::from_file(default_path)?);
    }

    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

fn store(config: &Config, verbose: bool) -> Result<CacheStore> {
    let store = open_store(config).context("failed to open metadata cache")?;
    if verbose {
        if let Some(path) = store.path() {
            eprintln!("{} {}", "Cache:".cyan(), path.display());
        }
    }
    Ok(store)
}

/// Clear cache command
fn clear_cache_command(config: &Config, verbose: bool) -> Result<()> {
    let store = store(config, verbose)?;
    store.clear()?;
    store.close()?;

    println!("{}", "✓ Cache cleared".green());
    Ok(())
}

/// Update cache command - run one refresh cycle
async fn update_cache_command(
    config: &Config,
    files: &[PathBuf],
    json: bool,
    verbose: bool,
) -> Result<()> {
    let texts = files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    if verbose {
        eprintln!("{} {}...", "Connecting with".cyan(), backend_name(config));
    }
    let directory = directory_from_config(config).await?;
    let store = Arc::new(store(config, verbose)?);

    let fetcher = SchemaFetcher::new(directory, Arc::clone(&store))
        .with_options(FetchOptions::from(&config.remote));
    let report = fetcher.refresh(&texts).await;
    store.close()?;
    let report = report?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print_refresh_summary(&report);
    }
    Ok(())
}

fn backend_name(config: &Config) -> String {
    format!("{:?}", config.remote.backend).to_lowercase()
}

/// Print refresh report summary to stdout
fn print_refresh_summary(report: &RefreshReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Schema Cache Refresh".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Projects:               {}", report.projects);
    println!("Dataset lists replaced: {}", report.dataset_scopes);
    println!("Datasets with columns:  {}", report.column_scopes);
    println!("Tables cached:          {}", report.tables);
    println!("Datasets not referenced: {}", report.datasets_not_referenced);
    println!();

    if report.has_failures() {
        println!("{}", "Skipped scopes:".bold());
        for failure in &report.failures {
            println!("  [{}] {}: {}", "SKIP".yellow().bold(), failure.scope, failure.message);
        }
    } else {
        println!("{}", "✓ All scopes refreshed".green().bold());
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

/// Dry run command - exits non-zero when the warehouse rejects the query
async fn dry_run_command(config: &Config, file: &Path, verbose: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    if verbose {
        eprintln!("{} {}", "Dry-running".cyan(), file.display());
    }

    let directory = directory_from_config(config).await?;
    let engine = DiagnosticEngine::from_config(directory, Arc::new(SqlTokenizer::bigquery()), config);
    let validation = engine.validate_text(&text).await;

    print_validation(file, &validation);
    if validation.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_validation(file: &Path, validation: &Validation) {
    if validation.diagnostics.is_empty() {
        println!(
            "{} {} will process {}",
            "✓".green().bold(),
            file.display(),
            validation.cost_label.bold()
        );
        return;
    }

    for diag in &validation.diagnostics {
        // Editor positions are 0-based; print them the way editors display them
        println!(
            "{}:{}:{}: [{}] {}",
            file.display(),
            diag.range.start.line + 1,
            diag.range.start.character + 1,
            "ERROR".red().bold(),
            diag.message
        );
    }
}

/// Show command - print cached projects, datasets and tables
fn show_command(config: &Config, project: Option<&str>, dataset: Option<&str>) -> Result<()> {
    let store = store(config, false)?;

    let projects: Vec<String> = match project {
        Some(project) => vec![project.to_string()],
        None => store.projects()?.into_iter().map(|p| p.id).collect(),
    };

    if projects.is_empty() {
        println!("{}", "Cache is empty. Run 'bqmirror update-cache' first.".yellow());
        return Ok(());
    }

    for project_id in &projects {
        println!("{}", project_id.bold().bright_blue());

        for ds in store.datasets(project_id)? {
            if dataset.is_some_and(|wanted| wanted != ds.id) {
                continue;
            }
            println!("  {} {}", ds.id.bold(), format!("({})", ds.location).dimmed());

            for table in store.tables(project_id, &ds.id)? {
                println!("    {}", table.id.cyan());
                for column in &table.columns {
                    println!("      {} {}", column.name, column.data_type.dimmed());
                }
            }
        }
    }

    store.close()?;
    Ok(())
}
