use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a watched region. Never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId(Uuid);

impl RegionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short prefix for log lines and the command interface.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }

    /// Resolve a full or shortened identifier string.
    pub fn matches(&self, s: &str) -> bool {
        let full = self.0.simple().to_string();
        !s.is_empty() && full.starts_with(&s.to_lowercase())
    }
}

impl Default for RegionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Rectangle in window-client coordinates, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Clamp to a window of the given client size. Returns `None` when
    /// nothing of the rectangle remains visible.
    pub fn clamp_to(&self, win_width: u32, win_height: u32) -> Option<Rect> {
        let left = self.left.max(0);
        let top = self.top.max(0);
        let right = (self.left + self.width as i32).min(win_width as i32);
        let bottom = (self.top + self.height as i32).min(win_height as i32);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect {
            left,
            top,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// Closed set of recognition engine variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// CPU-oriented lightweight model.
    Lightweight,
    /// Vision-language model, needs accelerator hardware.
    Vlm,
}

impl EngineKind {
    /// Lightweight engines want preprocessed input by default, the VLM
    /// sees the raw capture.
    pub fn default_preprocess(&self) -> bool {
        matches!(self, EngineKind::Lightweight)
    }

    pub fn requires_accelerator(&self) -> bool {
        matches!(self, EngineKind::Vlm)
    }

    /// Whether the engine can emit target-language text directly.
    pub fn supports_direct_translation(&self) -> bool {
        matches!(self, EngineKind::Vlm)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Lightweight => write!(f, "lightweight"),
            EngineKind::Vlm => write!(f, "vlm"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

/// Operating mode passed through the recognition boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizeMode {
    Text,
    DirectTranslate,
}

/// Per-stage latency of one completed pipeline run.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub capture_ms: u64,
    pub preprocess_ms: u64,
    pub recognize_ms: u64,
    pub translate_ms: u64,
    pub total_ms: u64,
}

/// Events published by the scheduler towards the display layer.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Published {
        id: RegionId,
        text: String,
        translated: String,
        timings: StageTimings,
    },
    /// A stage failed for one region; previously published text stands.
    Degraded {
        id: RegionId,
        stage: Stage,
        detail: String,
    },
    /// The target window no longer resolves; processing is paused until
    /// a window is selected again.
    WindowLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Preprocess,
    Recognize,
    Translate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Capture => write!(f, "capture"),
            Stage::Preprocess => write!(f, "preprocess"),
            Stage::Recognize => write!(f, "recognize"),
            Stage::Translate => write!(f, "translate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_clamps_into_window_bounds() {
        let r = Rect::new(-10, 5, 100, 50);
        let c = r.clamp_to(80, 40).unwrap();
        assert_eq!(c, Rect::new(0, 5, 80, 35));
    }

    #[test]
    fn rect_fully_outside_is_none() {
        assert!(Rect::new(200, 0, 50, 50).clamp_to(100, 100).is_none());
        assert!(Rect::new(0, 0, 10, 10).clamp_to(0, 0).is_none());
    }

    #[test]
    fn region_id_short_prefix_matches() {
        let id = RegionId::new();
        assert!(id.matches(&id.short()));
        assert!(!id.matches(""));
    }
}
