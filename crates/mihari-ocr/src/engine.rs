use async_trait::async_trait;
use image::DynamicImage;
use mihari_types::{EngineKind, RecognizeMode};

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    /// The backend never came up; the engine degrades to always-empty
    /// output instead of blocking startup.
    #[error("recognition backend unavailable")]
    BackendUnavailable,

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Recognition boundary: one pixel buffer in, UTF-8 text out, possibly
/// empty. Calls are serialized by the owning worker, hence `&mut self`.
#[async_trait]
pub trait RecognitionEngine: Send {
    fn kind(&self) -> EngineKind;

    fn name(&self) -> &'static str;

    async fn recognize(
        &mut self,
        image: &DynamicImage,
        mode: RecognizeMode,
    ) -> Result<String, RecognitionError>;
}

/// Catalog entry for the interaction layer.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub kind: EngineKind,
    pub name: &'static str,
    pub requires_accelerator: bool,
}

pub fn available_engines() -> Vec<EngineInfo> {
    vec![
        EngineInfo {
            kind: EngineKind::Lightweight,
            name: "Lightweight OCR",
            requires_accelerator: false,
        },
        EngineInfo {
            kind: EngineKind::Vlm,
            name: "Vision-language OCR",
            requires_accelerator: true,
        },
    ]
}

/// Stand-in when no backend is configured or loading failed. Region
/// management and preprocessing preview stay usable without a model.
pub struct DisabledEngine {
    kind: EngineKind,
}

impl DisabledEngine {
    pub fn new(kind: EngineKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl RecognitionEngine for DisabledEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn recognize(
        &mut self,
        _image: &DynamicImage,
        _mode: RecognizeMode,
    ) -> Result<String, RecognitionError> {
        Ok(String::new())
    }
}
