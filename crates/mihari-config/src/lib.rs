use std::fs;
use std::path::Path;

use mihari_vision::PipelineConfig;
use serde::{Deserialize, Serialize};

use self::capture::CaptureConfig;
use self::ocr::OcrConfig;
use self::scheduler::SchedulerConfig;
use self::translator::TranslatorConfig;

pub mod capture;
pub mod ocr;
pub mod scheduler;
pub mod translator;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("malformed preprocessing pipeline config")]
    MalformedPipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub capture: CaptureConfig,
    pub ocr: OcrConfig,
    pub translator: TranslatorConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load from disk. A missing file yields defaults; a malformed
    /// pipeline section falls back to the default pipeline instead of
    /// failing startup.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let mut config = Config::default();
            config.apply_env();
            return Ok(config);
        }

        let raw = fs::read_to_string(path)?;
        let mut value: serde_json::Value = serde_json::from_str(&raw)?;
        let pipeline_value = value.as_object_mut().and_then(|m| m.remove("pipeline"));

        let mut config: Config = serde_json::from_value(value)?;
        if let Some(pipeline_value) = pipeline_value {
            match parse_pipeline(pipeline_value) {
                Ok(pipeline) => config.pipeline = pipeline,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping pipeline section, using defaults");
                    config.pipeline = PipelineConfig::default();
                }
            }
        }

        config.apply_env();
        config.scheduler.clamp();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Environment overrides, applied after file values.
    fn apply_env(&mut self) {
        if let Some(interval) = env_parse::<u64>("MIHARI_TICK_INTERVAL_MS") {
            self.scheduler.tick_interval_ms = interval;
        }
        if let Some(threshold) = env_parse::<f64>("MIHARI_DIFF_THRESHOLD") {
            self.scheduler.diff_threshold = threshold;
        }
        if let Ok(title) = std::env::var("MIHARI_TARGET_WINDOW") {
            if !title.is_empty() {
                self.capture.target_window = Some(title);
            }
        }
        self.scheduler.clamp();
    }
}

fn parse_pipeline(value: serde_json::Value) -> Result<PipelineConfig, ConfigError> {
    serde_json::from_value(value).map_err(|_| ConfigError::MalformedPipelineConfig)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
