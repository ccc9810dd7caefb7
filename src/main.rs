mod aggregate;
mod classify;
mod config;
mod discover;
mod ingest;
mod key;
mod report;
mod summary;
mod table;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use config::DigestConfig;
use ingest::IngestOutcome;

/// Turns tshark conversation and RTP stream reports into CSV tables, then
/// compares eBPF and no-eBPF runs across client counts.
#[derive(Parser, Debug)]
#[command(name = "tshark-digest", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file path
    #[arg(short, long, default_value = "digest.toml", global = true)]
    config: PathBuf,

    /// Validate config and print resolved settings, don't run
    #[arg(long, global = true)]
    dry_run: bool,

    /// Extra logging (per-file and per-row decisions)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert every report under DIR into a CSV table next to it
    Parse {
        /// Results directory (overrides config)
        dir: Option<PathBuf>,
    },
    /// Show how each report under DIR would be routed
    Classify {
        /// Results directory (overrides config)
        dir: Option<PathBuf>,
    },
    /// Group the CSV tables under DIR by run and compare modes
    Summarize {
        /// Results directory (overrides config)
        dir: Option<PathBuf>,

        /// Also write the summary as JSON to this path (overrides config)
        #[arg(long)]
        json: Option<PathBuf>,

        /// Convert reports first
        #[arg(long)]
        parse: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match DigestConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        match toml::to_string_pretty(&config) {
            Ok(text) => {
                println!("# resolved from {}", cli.config.display());
                print!("{text}");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to render config");
                return ExitCode::FAILURE;
            }
        }
    }

    let result = match cli.command {
        Command::Parse { dir } => {
            let dir = dir.unwrap_or_else(|| config.input.dir.clone());
            run_parse(&dir, Arc::new(config)).await.map(|_| ())
        }
        Command::Classify { dir } => {
            let dir = dir.unwrap_or_else(|| config.input.dir.clone());
            run_classify(&dir, &config)
        }
        Command::Summarize { dir, json, parse } => {
            let dir = dir.unwrap_or_else(|| config.input.dir.clone());
            let json = json.or_else(|| config.summary.json.clone());
            run_summarize(&dir, json.as_deref(), parse, Arc::new(config)).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "tshark-digest failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "tshark_digest=debug"
    } else if quiet {
        "tshark_digest=warn"
    } else {
        "tshark_digest=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

async fn run_parse(dir: &Path, config: Arc<DigestConfig>) -> CliResult<ingest::BatchSummary> {
    let paths = discover::find_reports(dir, &config.input.extension)?;
    tracing::info!(dir = %dir.display(), files = paths.len(), "converting reports");

    let (results, summary) = ingest::ingest_all(paths, config).await;
    for (path, result) in &results {
        match result {
            Ok(IngestOutcome::Converted { kind, rows, .. }) => {
                tracing::info!(file = %path.display(), %kind, rows, "converted");
            }
            Ok(IngestOutcome::Unclassified) => {
                tracing::debug!(file = %path.display(), "not a conversation or RTP report");
            }
            Ok(IngestOutcome::NoData { .. }) | Err(_) => {}
        }
    }
    tracing::info!(
        converted = summary.converted,
        unclassified = summary.unclassified,
        no_data = summary.no_data,
        failed = summary.failed,
        skipped_rows = summary.skipped_rows,
        "conversion finished"
    );
    Ok(summary)
}

fn run_classify(dir: &Path, config: &DigestConfig) -> CliResult<()> {
    let ext = &config.input.extension;
    for path in discover::find_reports(dir, ext)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = classify::classify(&name, ext);
        let key = match key::extract_key(name.strip_suffix(&format!(".{ext}")).unwrap_or(&name)) {
            Ok(k) => format!(
                "captured={} clients={} for={} mode={} stat={}",
                k.capture_timestamp()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| k.capture_time.clone()),
                k.no_clients,
                k.clients_duration()
                    .map(|d| format!("{}s", d.as_secs()))
                    .unwrap_or_else(|| k.clients_time.clone()),
                k.mode,
                k.stat
            ),
            Err(e) => e.to_string(),
        };
        let ambiguous = classify::is_rtp_report(&name, ext)
            && classify::is_conversation_report(&name, ext);
        println!(
            "{:<14} {}  [{}]{}",
            kind,
            path.display(),
            key,
            if ambiguous { " (name matches both kinds)" } else { "" }
        );
    }
    Ok(())
}

async fn run_summarize(
    dir: &Path,
    json: Option<&Path>,
    parse_first: bool,
    config: Arc<DigestConfig>,
) -> CliResult<()> {
    let batch = if parse_first {
        Some(run_parse(dir, Arc::clone(&config)).await?)
    } else {
        None
    };

    let data = aggregate::load_dataset(dir, &config.output.extension)?;
    if data.conversations.is_empty() && data.rtp.is_empty() {
        tracing::warn!(dir = %dir.display(), "no tables found, nothing to compare");
    }
    let throughput = data.throughput()?;
    let deltas = data.deltas()?;
    let loss = data.loss()?;

    let mut summary = summary::Summary::new(dir, &data, throughput, deltas, loss);
    summary.batch = batch;
    print!("{}", summary.render_text());

    if let Some(path) = json {
        summary::write_summary(path, &summary)?;
        tracing::info!(path = %path.display(), "wrote summary");
    }
    Ok(())
}
