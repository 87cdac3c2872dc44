//! Feed subcommand - read classified documents back out of the store

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use pubflow_store::FeedQuery;

use super::open_store;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Only documents updated on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub updated: Option<String>,

    /// Earliest publication date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// Latest publication date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Page size
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Documents to skip before the page
    #[arg(long)]
    pub skip: Option<usize>,
}

pub fn run(args: FeedArgs, config: &Config) -> Result<()> {
    let query = FeedQuery::parse(
        args.updated.as_deref(),
        args.start.as_deref(),
        args.end.as_deref(),
        args.limit,
        args.skip,
    )?;
    let store = open_store(config)?;
    let docs = query
        .run(&store, &config.store.documents_table)
        .context("Feed query failed")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for doc in &docs {
        serde_json::to_writer(&mut out, doc)?;
        writeln!(out).context("Failed to write to stdout")?;
    }
    out.flush()?;
    log::info!("Feed returned {} documents", docs.len());
    Ok(())
}
