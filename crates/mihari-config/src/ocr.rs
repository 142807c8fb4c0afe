use std::collections::HashMap;

use mihari_types::{Device, EngineKind};
use serde::{Deserialize, Serialize};

fn default_engine() -> EngineKind {
    EngineKind::Lightweight
}

fn default_device() -> Device {
    Device::Cpu
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    #[serde(default = "default_engine")]
    pub engine: EngineKind,
    /// Sidecar command for the lightweight engine; none disables it.
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Sidecar command for the VLM engine.
    pub vlm_command: Option<String>,
    pub vlm_args: Vec<String>,
    #[serde(default = "default_device")]
    pub device: Device,
    /// Per-engine preprocessing override; missing entries use the
    /// engine's own default (lightweight on, VLM off).
    pub preprocess: HashMap<EngineKind, bool>,
    /// Let a capable engine emit target-language text directly and
    /// skip the translation stage.
    pub direct_translation: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            command: None,
            args: Vec::new(),
            vlm_command: None,
            vlm_args: Vec::new(),
            device: default_device(),
            preprocess: HashMap::new(),
            direct_translation: false,
        }
    }
}

impl OcrConfig {
    pub fn preprocess_enabled(&self, kind: EngineKind) -> bool {
        self.preprocess
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_preprocess())
    }

    pub fn command_for(&self, kind: EngineKind) -> (Option<&str>, &[String]) {
        match kind {
            EngineKind::Lightweight => (self.command.as_deref(), &self.args),
            EngineKind::Vlm => (self.vlm_command.as_deref(), &self.vlm_args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_defaults_follow_engine_kind() {
        let config = OcrConfig::default();
        assert!(config.preprocess_enabled(EngineKind::Lightweight));
        assert!(!config.preprocess_enabled(EngineKind::Vlm));
    }

    #[test]
    fn preprocess_override_wins() {
        let mut config = OcrConfig::default();
        config.preprocess.insert(EngineKind::Vlm, true);
        config.preprocess.insert(EngineKind::Lightweight, false);
        assert!(config.preprocess_enabled(EngineKind::Vlm));
        assert!(!config.preprocess_enabled(EngineKind::Lightweight));
    }
}
