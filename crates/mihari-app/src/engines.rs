use mihari_config::ocr::OcrConfig;
use mihari_config::translator::TranslatorConfig;
use mihari_ocr::{DisabledEngine, RecognitionEngine, SidecarEngine};
use mihari_translate::{DisabledTranslator, SidecarTranslator, TranslationEngine};

/// Build the configured recognition engine, degrading to the disabled
/// (always-empty) engine when no command is set or the spawn fails.
pub async fn build_recognition_engine(config: &OcrConfig) -> Box<dyn RecognitionEngine> {
    let kind = config.engine;
    let (command, args) = config.command_for(kind);
    match command {
        Some(command) => match SidecarEngine::spawn(kind, command, args, config.device).await {
            Ok(engine) => Box::new(engine),
            Err(e) => {
                tracing::warn!(%kind, error = %e, "recognition backend unavailable, output degrades to empty");
                Box::new(DisabledEngine::new(kind))
            }
        },
        None => {
            tracing::info!(%kind, "no recognition command configured");
            Box::new(DisabledEngine::new(kind))
        }
    }
}

pub async fn build_translator(config: &TranslatorConfig) -> Box<dyn TranslationEngine> {
    match &config.command {
        Some(command) => match SidecarTranslator::spawn(command, &config.args, config.device).await
        {
            Ok(engine) => Box::new(engine),
            Err(e) => {
                tracing::warn!(error = %e, "translation backend unavailable, output degrades to empty");
                Box::new(DisabledTranslator)
            }
        },
        None => {
            tracing::info!("no translator command configured");
            Box::new(DisabledTranslator)
        }
    }
}
