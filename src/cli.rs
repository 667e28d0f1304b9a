use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use zenhub_rag::config::{self, ZenhubConfig, TOKEN_ENV};
use zenhub_rag::stats::{corpus_stats, workspace_stats};
use zenhub_rag::{
    corpus, providers, AssembleOptions, CancelSignal, Converter, Error, FilterSpec,
};

use crate::report::{self, Spinner};

/// Convert Zenhub workspace content into a RAG-ready document corpus.
#[derive(Parser, Debug)]
#[command(name = "zenhub-rag", version, long_about = None)]
pub struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Zenhub API access token. Falls back to the config file.
    #[arg(short = 't', long = "access-token", env = TOKEN_ENV, hide_env_values = true)]
    pub access_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect a workspace and save a content analysis.
    Inspect {
        /// Zenhub workspace identifier.
        workspace_id: String,

        #[command(flatten)]
        token: TokenArgs,

        /// Output directory for logs and the analysis file.
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Convert workspace issues into a JSONL corpus.
    Convert {
        /// Zenhub workspace identifier.
        workspace_id: String,

        #[command(flatten)]
        token: TokenArgs,

        /// Output directory for logs and the corpus.
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Only include issues in these pipelines.
        #[arg(short = 'p', long = "pipeline", num_args = 1..)]
        pipelines: Vec<String>,

        /// Only include issues carrying at least one of these labels.
        #[arg(short = 'l', long = "label", num_args = 1..)]
        labels: Vec<String>,

        /// Leave epic information out of the documents.
        #[arg(long)]
        no_epics: bool,

        /// Leave dependency information out of the documents.
        #[arg(long)]
        no_dependencies: bool,
    },

    /// Validate a processed JSONL corpus.
    Validate {
        /// Corpus file to validate.
        input: PathBuf,
    },

    /// Compute statistics over a processed JSONL corpus.
    Stats {
        /// Corpus file to analyze.
        input: PathBuf,

        /// Write the statistics to this JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Explain how to get an API token and workspace id.
    HelpToken,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Creates `<output>/logs` and `<output>/data` and opens a timestamped log
/// file for commands that talk to the API.
pub fn prepare_log_file(cli: &Cli) -> Result<Option<File>> {
    let (name, output_dir) = match &cli.command {
        Command::Inspect { output_dir, .. } => ("inspect", output_dir),
        Command::Convert { output_dir, .. } => ("convert", output_dir),
        _ => return Ok(None),
    };
    setup_output_dir(output_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = output_dir.join("logs").join(format!("{name}_{stamp}.log"));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    Ok(Some(file))
}

pub fn init_tracing(cli: &Cli, log_file: Option<File>) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "zenhub_rag=info",
        1 => "zenhub_rag=debug",
        _ => "zenhub_rag=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match cli.log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub async fn run(cli: Cli, cancel: CancelSignal) -> Result<()> {
    match cli.command {
        Command::Inspect {
            workspace_id,
            token,
            output_dir,
        } => cmd_inspect(&workspace_id, token, &output_dir, &cancel).await,
        Command::Convert {
            workspace_id,
            token,
            output_dir,
            pipelines,
            labels,
            no_epics,
            no_dependencies,
        } => {
            let filter = FilterSpec::new(pipelines, labels);
            let options = AssembleOptions {
                include_epics: !no_epics,
                include_dependencies: !no_dependencies,
            };
            cmd_convert(&workspace_id, token, &output_dir, &filter, options, &cancel).await
        }
        Command::Validate { input } => cmd_validate(input).await,
        Command::Stats { input, output } => cmd_stats(input, output).await,
        Command::HelpToken => {
            report::print_help_token();
            Ok(())
        }
    }
}

fn setup_output_dir(output_dir: &Path) -> Result<()> {
    for sub in ["logs", "data"] {
        let dir = output_dir.join(sub);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }
    Ok(())
}

fn require_token(token: TokenArgs, config: &ZenhubConfig) -> Result<String> {
    config::resolve_token(token.access_token.as_deref(), config).ok_or_else(|| {
        Error::UpstreamAuth(format!(
            "no Zenhub access token provided; pass --access-token, set {TOKEN_ENV}, \
             or add token to {}",
            config::config_path().display()
        ))
        .into()
    })
}

fn converter_for(token: TokenArgs) -> Result<Converter> {
    let config = config::load_config()?;
    let token = require_token(token, &config.zenhub)?;
    Ok(Converter::new(providers::create_source(token, &config.zenhub)))
}

async fn cmd_inspect(
    workspace_id: &str,
    token: TokenArgs,
    output_dir: &Path,
    cancel: &CancelSignal,
) -> Result<()> {
    let converter = converter_for(token)?;
    info!(workspace_id, "inspecting workspace");

    let spinner = Spinner::new("Fetching workspace content...");
    let snapshot = converter.inspect(workspace_id, cancel).await;
    spinner.finish();
    let snapshot = snapshot?;

    let stats = workspace_stats(&snapshot);
    report::print_workspace_stats(&stats);

    let path = output_dir
        .join("data")
        .join(format!("analysis_{workspace_id}.json"));
    corpus::write_json(&stats, &path)?;
    info!(path = %path.display(), "analysis saved");
    println!("Analysis saved to {}", path.display());
    Ok(())
}

async fn cmd_convert(
    workspace_id: &str,
    token: TokenArgs,
    output_dir: &Path,
    filter: &FilterSpec,
    options: AssembleOptions,
    cancel: &CancelSignal,
) -> Result<()> {
    let converter = converter_for(token)?;
    info!(
        workspace_id,
        pipelines = filter.pipelines.len(),
        labels = filter.labels.len(),
        include_epics = options.include_epics,
        include_dependencies = options.include_dependencies,
        "converting workspace"
    );

    let spinner = Spinner::new("Converting workspace data...");
    let documents = match converter
        .convert(workspace_id, filter, options, cancel)
        .await
    {
        Ok(docs) => docs,
        Err(e) => {
            spinner.finish();
            return Err(e.into());
        }
    };
    for doc in &documents {
        debug!(title = %doc.metadata.title, "processed");
    }
    if cancel.is_cancelled() {
        spinner.finish();
        return Err(Error::Cancelled.into());
    }

    spinner.set_message("Writing corpus...");
    let output_file = output_dir
        .join("data")
        .join(format!("{workspace_id}_raw.jsonl"));
    let written = corpus::write_corpus(&documents, &output_file);
    spinner.finish();
    let count = written?;

    println!(
        "Successfully converted {count} items to {}",
        output_file.display()
    );
    Ok(())
}

async fn cmd_validate(input: PathBuf) -> Result<()> {
    ensure_input(&input)?;
    let spinner = Spinner::new("Validating documents...");
    let report = tokio::task::spawn_blocking(move || corpus::validate_corpus(&input)).await;
    spinner.finish();

    let report = report??;
    report::print_validation(&report);
    Ok(())
}

async fn cmd_stats(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    ensure_input(&input)?;
    let spinner = Spinner::new("Analyzing documents...");
    let stats = tokio::task::spawn_blocking(move || corpus_stats(&input)).await;
    spinner.finish();

    let stats = stats??;
    report::print_corpus_stats(&stats);

    if let Some(path) = output {
        corpus::write_json(&stats, &path)?;
        println!("Statistics saved to {}", path.display());
    }
    Ok(())
}

fn ensure_input(input: &Path) -> Result<()> {
    if !input.exists() {
        return Err(Error::io(
            input,
            std::io::Error::new(std::io::ErrorKind::NotFound, "input file not found"),
        )
        .into());
    }
    Ok(())
}
