//! Binary entrypoint for the photo slideshow server.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use photo_slideshow::config::{Configuration, Overrides};
use photo_slideshow::engine::{PlaybackInterval, SlideshowEngine};
use photo_slideshow::source::{self, ImageRecord, ImageSource};
use photo_slideshow::tasks::slideshow;
use photo_slideshow::web::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "photo-slideshow", version, about = "Cloudinary photo slideshow server")]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,
    /// Override the listen address (e.g. 0.0.0.0:8080)
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,
    /// Deterministic RNG seed for image selection
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Override the starting auto-advance interval in ms (3000, 5000, 8000 or 10000)
    #[arg(long, value_name = "MILLIS")]
    interval_ms: Option<u64>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("photo_slideshow={level}").parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        bind,
        seed,
        interval_ms,
        verbose,
    } = Args::parse();
    init_tracing(verbose)?;

    let default_interval = interval_ms
        .map(PlaybackInterval::try_from)
        .transpose()
        .context("invalid --interval-ms")?;
    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .with_env_overrides(|key| std::env::var(key).ok())
        .with_overrides(Overrides {
            bind_address: bind,
            shuffle_seed: seed,
            default_interval,
        })
        .validated()
        .context("invalid configuration values")?;
    tracing::info!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    let (outcome, client) = source::load_cloudinary(cfg.cloudinary.clone()).await;
    let images: Arc<[ImageRecord]> = outcome.images.into();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    let handle = if images.is_empty() {
        tracing::warn!(
            error = outcome.error.as_deref().unwrap_or("none"),
            "no images to show; slideshow stays inert"
        );
        None
    } else {
        let mut engine = SlideshowEngine::new(
            images.clone(),
            cfg.slideshow.initial_index,
            cfg.slideshow.shuffle_seed,
        )
        .with_interval(cfg.slideshow.default_interval);
        if !cfg.slideshow.autoplay {
            engine.toggle_playback();
        }
        let (handle, task) =
            slideshow::spawn(engine, cfg.slideshow.transition_duration, cancel.clone());
        tasks.spawn(async move {
            task.await
                .context("slideshow task panicked")?
                .context("slideshow task failed")
        });
        Some(handle)
    };

    let mut state = AppState::new(
        images,
        outcome.error,
        handle,
        cfg.server.state_poll_interval,
    )
    .with_site(cfg.site.clone());
    if let Some(client) = client {
        let catalog: Arc<dyn ImageSource> = Arc::new(client.original_urls());
        state = state.with_catalog(catalog);
    }

    tasks.spawn({
        let cancel = cancel.clone();
        let bind_addr = cfg.server.bind_address;
        async move {
            let result = web::serve(state, bind_addr, cancel.clone()).await;
            // Take the slideshow down with the server, whatever the reason.
            cancel.cancel();
            result
        }
    });

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!("task failed: {err:?}");
                cancel.cancel();
                first_error.get_or_insert(err);
            }
            Err(err) => {
                tracing::error!("task join error: {err}");
                cancel.cancel();
            }
        }
    }
    tracing::info!("shutdown complete");

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler failed: {err}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to register SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
