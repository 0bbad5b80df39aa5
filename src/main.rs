//! Binary entrypoint for the e-paper photo frame.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use epaper_photo_frame::capabilities::Capabilities;
use epaper_photo_frame::catalog::remote::clear_cache_dir;
use epaper_photo_frame::config::Configuration;
use epaper_photo_frame::logging;
use epaper_photo_frame::platform::display::DisplayController;
use epaper_photo_frame::platform::placeholder::PlaceholderFonts;
use epaper_photo_frame::platform::probe_for;
use epaper_photo_frame::processing::{PhotoProcessor, ProcessingSettings};
use epaper_photo_frame::tasks::frame;

#[derive(Debug, Parser)]
#[command(
    name = "photo-frame",
    version,
    about = "Shows photos from a folder or a cloud library on an e-paper panel"
)]
struct Args {
    /// Path to the YAML configuration; a template is written if it is missing
    #[arg(value_name = "CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Process one photo and write the panel-ready PNG instead of running
    #[arg(long = "render-file", value_name = "IN", requires = "output")]
    render_file: Option<PathBuf>,

    /// Destination for --render-file
    #[arg(long, value_name = "OUT", requires = "render_file")]
    output: Option<PathBuf>,

    /// Delete every downloaded remote photo and exit
    #[arg(long = "clear-remote-cache")]
    clear_remote_cache: bool,

    /// Paint the panel white and exit
    #[arg(long = "clear-display")]
    clear_display: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if !args.config.exists() {
        Configuration::write_template(&args.config)?;
        eprintln!(
            "Wrote a default configuration to {}. Edit it and start the frame again.",
            args.config.display()
        );
        return Ok(());
    }

    let cfg = Configuration::from_yaml_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?
        .validated()
        .context("invalid configuration values")?;
    logging::init(cfg.logging.level, args.verbose, cfg.logging.file.as_deref())?;
    tracing::debug!("Loaded configuration from {}:\n{:#?}", args.config.display(), cfg);

    if args.clear_remote_cache {
        let removed = clear_cache_dir(&cfg.remote.cache_path);
        println!("Removed {removed} cached photo(s)");
        return Ok(());
    }

    let caps = Capabilities::probe();

    if let (Some(input), Some(output)) = (&args.render_file, &args.output) {
        let (width, height) = cfg.display.driver.resolution();
        let processor =
            PhotoProcessor::new(ProcessingSettings::new(width, height, &cfg.processing), caps);
        return processor.process_and_save(input, output);
    }

    let display = Arc::new(
        DisplayController::new(
            probe_for(&cfg.display.driver),
            cfg.display.full_refresh_every,
            cfg.display.saturation,
        ),
    );
    {
        let display = Arc::clone(&display);
        tokio::task::spawn_blocking(move || display.initialize())
            .await
            .context("display initialization task panicked")?
            .context("display unavailable")?;
    }

    if args.clear_display {
        let display = Arc::clone(&display);
        tokio::task::spawn_blocking(move || display.clear())
            .await
            .context("clear task panicked")??;
        info!("display cleared");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    spawn_signal_handlers(&cancel);

    let result = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || frame::run_configured(&cfg, caps, display, PlaceholderFonts::load(), cancel)
    })
    .await;
    cancel.cancel();
    match result {
        Ok(outcome) => outcome.context("frame loop failed"),
        Err(err) => bail!("frame loop panicked: {err}"),
    }
}

fn spawn_signal_handlers(cancel: &CancellationToken) {
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }
}
