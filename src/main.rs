use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::HumanDuration;
use log::{debug, info, warn};

use cascade_dups::logging::init_logging;
use cascade_dups::{
    CascadePipeline, Cli, JsonReport, Settings, print_file_list, print_results, print_stats,
    scan_directory,
};

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    debug!("Command line arguments: {:?}", cli);

    ctrlc::set_handler(|| {
        warn!("Interrupted");
        std::process::exit(130);
    })
    .context("Failed to install Ctrl+C handler")?;

    let settings = Settings::from_cli(&cli)?;
    debug!("Settings: {:?}", settings);

    let root = settings
        .root
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", settings.root.display()))?;

    let files = scan_directory(&root, &settings.filters)?;

    if !settings.find_duplicates {
        print_file_list(&files, &root);
        return Ok(());
    }

    info!("Cascade: {:?}", settings.mode.stages());
    let mut pipeline = CascadePipeline::new(settings.mode);
    if let Some(threads) = settings.threads {
        pipeline = pipeline.with_threads(threads);
    }
    let outcome = pipeline.run(&files, settings.stats)?;

    if settings.json {
        println!("{}", JsonReport::new(&root, settings.mode, &outcome)?.to_json()?);
    } else {
        print_results(&outcome.groups, &root);
        if let (Some(stats), Some(total)) = (&outcome.stats, outcome.total_elapsed) {
            print_stats(stats, total);
        }
    }

    info!(
        "Program completed successfully in {}",
        HumanDuration(start_time.elapsed())
    );
    Ok(())
}
