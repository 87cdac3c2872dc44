//! pubflow - PubMed citation classification pipelines
//!
//! Pulls new citations from the PubMed update files (or E-utilities by
//! id), runs them through an external classifier and stores the positives
//! for the read feed.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pubflow_core::shutdown_flag;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "pubflow")]
#[command(about = "PubMed citation classification pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./pubflow.toml or ~/.config/pubflow/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Store directory (overrides [store] dir)
    #[arg(long, global = true)]
    store: Option<std::path::PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Classify citations from new PubMed update files
    Updates(cmd::updates::UpdatesArgs),
    /// Classify citations for PubMed ids read from a file or stdin
    Ids(cmd::ids::IdsArgs),
    /// Score citations sentence by sentence without storing them
    Explain(cmd::explain::ExplainArgs),
    /// Print stored documents as JSON lines
    Feed(cmd::feed::FeedArgs),
    /// Show current configuration
    Config,
}

/// First signal requests a graceful stop, the second exits.
fn install_signal_handlers() -> Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })
        }
        .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(pubflow_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress lines show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    pubflow_core::init_logging(quiet, cli.debug, multi).context("Failed to initialize logging")?;

    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };
    if let Some(dir) = cli.store {
        config.store.dir = dir;
    }

    // Apply HTTP settings (config file defaults, CLI overrides)
    let http_config = pubflow_core::HttpConfig {
        read_timeout: std::time::Duration::from_secs(
            cli.read_timeout.unwrap_or(config.http.read_timeout),
        ),
        max_retries: cli.max_retries.unwrap_or(config.http.max_retries),
    };
    pubflow_core::set_http_config(http_config);

    install_signal_handlers()?;

    match cli.command {
        Command::Updates(args) => cmd::updates::run(args, &config, &progress),
        Command::Ids(args) => cmd::ids::run(args, &config, &progress),
        Command::Explain(args) => cmd::explain::run(args, &config),
        Command::Feed(args) => cmd::feed::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec!["Store directory", &config.store.dir.display().to_string()]);
            table.add_row(vec![
                "Tables",
                &format!(
                    "{} / {}",
                    config.store.documents_table, config.store.contents_table
                ),
            ]);
            table.add_row(vec!["PubMed URL", &config.ncbi.pubmed_url]);
            table.add_row(vec!["efetch URL", &config.ncbi.efetch_url]);
            table.add_row(vec![
                "NCBI API key",
                if config.ncbi.api_key.is_some() {
                    "configured"
                } else {
                    "not set"
                },
            ]);
            table.add_row(vec![
                "PMC supplement",
                if config.ncbi.supplement_pmc { "on" } else { "off" },
            ]);
            table.add_row(vec![
                "Classifier",
                &config
                    .classifier
                    .command
                    .as_ref()
                    .map(|c| format!("{c} {}", config.classifier.args.join(" ")))
                    .unwrap_or_else(|| "not set".to_string()),
            ]);
            table.add_row(vec!["Threshold", &config.classifier.threshold.to_string()]);
            table.add_row(vec![
                "Min year",
                &config
                    .classifier
                    .min_year
                    .map_or_else(|| "any".to_string(), |y| y.to_string()),
            ]);
            table.add_row(vec![
                "Read timeout",
                &format!("{}s", config.http.read_timeout),
            ]);
            table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
