use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CaptureConfig {
    /// Title of the window to reacquire at startup, exact match first
    /// then substring.
    pub target_window: Option<String>,
}
