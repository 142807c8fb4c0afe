pub mod sidecar;

use async_trait::async_trait;

pub use sidecar::SidecarTranslator;

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("translation backend unavailable")]
    BackendUnavailable,

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Translation boundary: UTF-8 source text in, UTF-8 target text out,
/// possibly empty. Calls are serialized by the owning worker.
#[async_trait]
pub trait TranslationEngine: Send {
    fn name(&self) -> &'static str;

    async fn translate(&mut self, text: &str) -> Result<String, TranslationError>;
}

/// Stand-in when no translator is configured; recognition output is
/// published untranslated.
pub struct DisabledTranslator;

#[async_trait]
impl TranslationEngine for DisabledTranslator {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn translate(&mut self, _text: &str) -> Result<String, TranslationError> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_translator_returns_empty() {
        let mut t = DisabledTranslator;
        assert_eq!(t.translate("こんにちは").await.unwrap(), "");
    }
}
