//! Ids subcommand - classify citations for a list of PubMed ids

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use pubflow_core::SharedProgress;
use pubflow_pubmed::{Db, Services, run_ids};

use super::{eutils, open_store, print_run_summary, read_ids, spawn_classifier};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct IdsArgs {
    /// Id file, one id or JSON object per line (default: stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Maximum number of ids to process
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Drop citations published before this year
    #[arg(long)]
    pub min_year: Option<i32>,

    /// Skip the PMC author email supplement
    #[arg(long)]
    pub no_pmc: bool,
}

pub fn run(args: IdsArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let mut pipeline = config.pipeline();
    pipeline.max_ids = args.limit;
    pipeline.min_year = args.min_year.or(pipeline.min_year);
    pipeline.supplement_pmc &= !args.no_pmc;
    pipeline.validate()?;

    let ids = read_ids(args.input.as_deref())?;
    let store = open_store(config)?;
    let mut classifier = spawn_classifier(config)?;

    let pb = progress.stage_line("ids");
    let pubmed = eutils(config, Db::Pubmed).with_progress(pb.clone());
    let pmc = eutils(config, Db::Pmc).with_progress(pb.clone());

    let services = Services::new(&store, &mut classifier)
        .with_pmc(&pmc)
        .with_progress(pb);

    let summary = run_ids(&pipeline, ids, &pubmed, services)?;
    print_run_summary("PubMed ids", "Ids", &summary);

    if pubflow_core::is_shutdown_requested() {
        anyhow::bail!("Interrupted");
    }
    Ok(())
}
