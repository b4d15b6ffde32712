use anyhow::{Context, Result};
use log::{LevelFilter, debug};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Log level for a `-v` count: info by default, then debug, then trace.
pub fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs a terminal logger on stderr with local timestamps.
pub fn init_logging(verbose: u8) -> Result<()> {
    let mut builder = ConfigBuilder::new();
    builder
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_rfc3339();
    let local_offset = builder.set_time_offset_to_local().is_ok();

    TermLogger::init(
        level_for(verbose),
        builder.build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if !local_offset {
        debug!("Local time offset unavailable, logging timestamps in UTC");
    }
    Ok(())
}
