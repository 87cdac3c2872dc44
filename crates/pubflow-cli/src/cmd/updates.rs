//! Updates subcommand - classify citations from new PubMed update files

use anyhow::Result;
use clap::Args;
use pubflow_core::SharedProgress;
use pubflow_pubmed::{Db, DownloadSource, HttpListing, Services, run_updates};

use super::{eutils, open_store, print_run_summary, spawn_classifier};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct UpdatesArgs {
    /// Maximum number of new update files to process
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Drop citations published before this year
    #[arg(long)]
    pub min_year: Option<i32>,

    /// Skip the PMC author email supplement
    #[arg(long)]
    pub no_pmc: bool,
}

pub fn run(args: UpdatesArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let mut pipeline = config.pipeline();
    pipeline.max_files = args.limit;
    pipeline.min_year = args.min_year.or(pipeline.min_year);
    pipeline.supplement_pmc &= !args.no_pmc;
    pipeline.validate()?;

    let store = open_store(config)?;
    let mut classifier = spawn_classifier(config)?;

    let updatefiles_url = format!(
        "{}/{}/",
        config.ncbi.pubmed_url.trim_end_matches('/'),
        pubflow_pubmed::updatefiles::UPDATEFILES_PATH
    );
    log::info!("Checking PubMed update files");
    log::info!("  Index: {updatefiles_url}");
    log::info!("  Store: {}", config.store.dir.display());

    let pb = progress.stage_line("updates");
    let listing = HttpListing::new(config.ncbi.pubmed_url.clone()).with_progress(pb.clone());
    let downloads = DownloadSource::new(updatefiles_url).with_progress(pb.clone());
    let pmc = eutils(config, Db::Pmc).with_progress(pb.clone());

    let services = Services::new(&store, &mut classifier)
        .with_pmc(&pmc)
        .with_progress(pb);

    let summary = run_updates(&pipeline, &listing, &downloads, services)?;
    print_run_summary("PubMed updates", "Files", &summary);

    if pubflow_core::is_shutdown_requested() {
        anyhow::bail!("Interrupted");
    }
    Ok(())
}
