//! Vidframe - Video Frame Extraction Service
//!
//! Entry point: loads configuration, sets up logging, then runs the frame
//! dispatcher and the HTTP API until a shutdown signal arrives.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidframe::api::Api;
use vidframe::cli::Args;
use vidframe::config::{ApiConfig, Config};
use vidframe::framer::{Framer, TokenPool};
use vidframe::media::FrameExtractorFactory;
use vidframe::storage::Storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration before logging, the format depends on it
    let (config, config_path) = load_config(&args)?;

    let _log_guard = setup_logging(&config.api, &args)?;
    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    info!("Service started");

    let shutdown = CancellationToken::new();

    let storage = Storage::new(config.storage.clone());
    storage.ensure_dir().await?;

    let extractor = FrameExtractorFactory::create_extractor(config.media.clone());
    if let Err(e) = extractor.version_info().await {
        warn!("ffmpeg is not usable, frame requests will fail: {}", e);
    }

    let pool = TokenPool::new(config.framer.max_processes);
    let framer = Arc::new(Framer::new(&config.framer, pool, extractor));
    let api = Api::new(config.api.clone(), Arc::clone(&framer), Arc::new(storage));

    // Either half stopping brings the other down too
    let framer_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = framer.run(shutdown.clone()).await;
            shutdown.cancel();
            result
        }
    });

    let api_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = api.run(shutdown.clone()).await;
            shutdown.cancel();
            result
        }
    });

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let (framer_result, api_result) = tokio::join!(framer_task, api_task);
    framer_result??;
    api_result??;

    info!("Service exited gracefully");
    Ok(())
}

/// Resolve the configuration file: `--config`, else
/// `config-$CONTAINER_ENVIRONMENT.toml` when present, else defaults.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = &args.config {
        return Ok((Config::from_file(path)?, Some(path.clone())));
    }

    let environment = std::env::var("CONTAINER_ENVIRONMENT")
        .ok()
        .filter(|env| !env.is_empty())
        .unwrap_or_else(|| "local".to_string());

    let path = Config::environment_file(&environment);
    if path.exists() {
        Ok((Config::from_file(&path)?, Some(path)))
    } else {
        Ok((Config::default(), None))
    }
}

/// Setup logging: JSON at INFO in production, coloured text at TRACE otherwise
fn setup_logging(config: &ApiConfig, args: &Args) -> Result<Option<WorkerGuard>> {
    let log_level = if config.is_prod && !args.verbose {
        Level::INFO
    } else {
        Level::TRACE
    };

    let json_layer = config.is_prod.then(|| {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(false)
    });

    let console_layer = (!config.is_prod).then(|| {
        fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    // Optional file layer with daily rotation
    let (file_layer, guard) = match &args.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let (writer, guard) = non_blocking(rolling::daily(log_dir, "vidframe.log"));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_ansi(false); // No ANSI colors in file
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(json_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized at {}", log_level);
    Ok(guard)
}

/// Cancel `shutdown` on SIGINT / SIGTERM
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Shutdown signal received"),
        _ = terminate => info!("Shutdown signal received"),
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}
