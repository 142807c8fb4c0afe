use mihari_types::Device;
use serde::{Deserialize, Serialize};

fn default_device() -> Device {
    Device::Cpu
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Sidecar command for the offline translator; none disables it.
    pub command: Option<String>,
    pub args: Vec<String>,
    #[serde(default = "default_device")]
    pub device: Device,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            device: default_device(),
        }
    }
}
