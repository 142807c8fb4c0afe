use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mihari_config::Config;
use tokio::signal;
use tracing_subscriber::EnvFilter;

mod commands;
mod controller;
mod engines;
mod sink;
mod state;

use self::controller::{AppController, ChannelSet};
use self::state::AppState;

#[derive(Parser)]
#[command(
    name = "mihari",
    about = "Watch regions of a window, recognize their text on change and translate it"
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "mihari.json")]
    config: PathBuf,

    /// Target window title, exact match first then substring
    #[arg(short, long)]
    window: Option<String>,

    /// Force JSON log output
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, starting with defaults");
        Config::default()
    });

    let channels = ChannelSet::new();
    let state = Arc::new(AppState::new(config, cli.config.clone(), &channels));

    // Backends degrade to empty output when unavailable; the region
    // surface stays usable either way.
    let recognition = {
        let config = state.config.read().await;
        engines::build_recognition_engine(&config.ocr).await
    };
    let translation = {
        let config = state.config.read().await;
        engines::build_translator(&config.translator).await
    };

    // Reacquire the target window from the CLI flag or persisted config.
    let title = {
        let config = state.config.read().await;
        cli.window.or_else(|| config.capture.target_window.clone())
    };
    if let Some(title) = title {
        commands::select_window(&state, &title).await;
    }

    let controller = AppController::new(Arc::clone(&state));
    let mut tasks = controller.spawn_tasks(channels, recognition, translation);

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
        Some(result) = tasks.join_next() => {
            match result {
                Ok(Ok(())) => tracing::warn!("task exited"),
                Ok(Err(e)) => tracing::error!("task failed: {e}"),
                Err(e) => tracing::error!("task panicked: {e}"),
            }
        }
    }

    controller.shutdown();
    while tasks.join_next().await.is_some() {}
    state.save_config().await;
    Ok(())
}

fn init_tracing(force_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if force_json || !atty::is(atty::Stream::Stdout) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
