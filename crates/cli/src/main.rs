use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fsorter_core::{
    app_paths, load_config, FileRecord, Pipeline, PipelineError, PipelineReport, ProcessConfig,
    StageOutcome,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fsorter-cli")]
#[command(about = "Renames files and sorts them into dated or per-name folders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Run(RunArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show { config } => cmd_config_show(config),
        },
    }
}

fn resolve_config_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Ok(app_paths()?.config_path),
    }
}

fn init_logging(config: &ProcessConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_path() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("could not create log directory: {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("could not open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| anyhow!(err))
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow!(err)),
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config_path = resolve_config_path(args.config)?;
    let mut config = load_config(&config_path)?;
    init_logging(&config)?;
    tracing::info!(config = %config_path.display(), "configuration loaded");

    let pipeline = Pipeline::default().on_error(Arc::new(|err: &PipelineError| {
        eprintln!("skipped: {err}");
    }));
    let report = pipeline.run(&mut config);

    match args.output {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "records": &config.files,
                "stages": &report.stages,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Table => print_table(&config.files, &report),
    }

    if let Some(aborted) = report.aborted() {
        if let StageOutcome::Aborted(err) = &aborted.outcome {
            anyhow::bail!("{} stage aborted: {err}", aborted.stage);
        }
    }
    Ok(())
}

fn cmd_config_show(path: Option<PathBuf>) -> Result<()> {
    let config_path = resolve_config_path(path)?;
    let config = load_config(&config_path)?;
    println!("config file: {}", config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_table(files: &[FileRecord], report: &PipelineReport) {
    println!("status\tsource -> name (folder)\tcomment");
    for record in files {
        println!(
            "{:?}\t{} -> {}{} ({})\t{}",
            record.status(),
            record.full_path().display(),
            record.name(),
            record.extension(),
            record.endpoint(),
            record.comment()
        );
    }

    println!();
    for stage in &report.stages {
        let state = match &stage.outcome {
            StageOutcome::Completed => "completed",
            StageOutcome::Skipped => "skipped",
            StageOutcome::Aborted(_) => "aborted",
        };
        println!(
            "{}: {} records={} rejected={} contained={}",
            stage.stage,
            state,
            stage.records,
            stage.rejected.len(),
            stage.contained
        );
    }
}
