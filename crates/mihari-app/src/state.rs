use std::path::PathBuf;
use std::sync::Arc;

use kanal::AsyncSender;
use mihari_capture::WindowSource;
use mihari_config::Config;
use mihari_core::{OcrJob, RegionRegistry, Scheduler, TranslateJob};
use tokio::sync::RwLock;

use crate::controller::ChannelSet;

pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub config_path: PathBuf,
    pub scheduler: Arc<Scheduler>,
    pub ocr_tx: AsyncSender<OcrJob>,
    pub translate_tx: AsyncSender<TranslateJob>,
}

impl AppState {
    pub fn new(config: Config, config_path: PathBuf, channels: &ChannelSet) -> Self {
        let config = Arc::new(RwLock::new(config));
        let registry = Arc::new(RegionRegistry::new());
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&config),
            registry,
            Arc::new(WindowSource::new()),
            channels.ocr.0.clone(),
            channels.translate.0.clone(),
            channels.events.0.clone(),
        ));

        Self {
            config,
            config_path,
            scheduler,
            ocr_tx: channels.ocr.0.clone(),
            translate_tx: channels.translate.0.clone(),
        }
    }

    pub async fn save_config(&self) {
        let config = self.config.read().await;
        if let Err(e) = config.save(&self.config_path) {
            tracing::warn!(error = %e, path = %self.config_path.display(), "failed to save config");
        }
    }
}
