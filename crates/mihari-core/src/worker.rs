//! Single-worker funnels for the shared recognition and translation
//! backends. The underlying engines are not safe for concurrent
//! invocation, so all calls serialize through one task per backend
//! while multiple regions' payloads queue up.

use image::DynamicImage;
use kanal::AsyncReceiver;
use mihari_ocr::{RecognitionEngine, RecognitionError};
use mihari_translate::{TranslationEngine, TranslationError};
use mihari_types::RecognizeMode;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub enum OcrJob {
    Recognize {
        image: DynamicImage,
        mode: RecognizeMode,
        reply: oneshot::Sender<Result<String, RecognitionError>>,
    },
    /// Swap the active engine variant. Takes effect between jobs, so
    /// the previous engine is released only once no run references it.
    Swap { engine: Box<dyn RecognitionEngine> },
}

pub enum TranslateJob {
    Translate {
        text: String,
        reply: oneshot::Sender<Result<String, TranslationError>>,
    },
    Swap { engine: Box<dyn TranslationEngine> },
}

pub async fn recognition_worker(
    rx: AsyncReceiver<OcrJob>,
    mut engine: Box<dyn RecognitionEngine>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };
        match job {
            OcrJob::Recognize { image, mode, reply } => {
                let result = engine.recognize(&image, mode).await;
                if let Err(e) = &result {
                    tracing::warn!(engine = engine.name(), error = %e, "recognition failed");
                }
                let _ = reply.send(result);
            }
            OcrJob::Swap { engine: next } => {
                tracing::info!(from = engine.name(), to = next.name(), "recognition engine swapped");
                engine = next;
            }
        }
    }
    tracing::debug!("recognition worker stopping");
    Ok(())
}

pub async fn translation_worker(
    rx: AsyncReceiver<TranslateJob>,
    mut engine: Box<dyn TranslationEngine>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };
        match job {
            TranslateJob::Translate { text, reply } => {
                let result = engine.translate(&text).await;
                if let Err(e) = &result {
                    tracing::warn!(engine = engine.name(), error = %e, "translation failed");
                }
                let _ = reply.send(result);
            }
            TranslateJob::Swap { engine: next } => {
                tracing::info!(from = engine.name(), to = next.name(), "translator swapped");
                engine = next;
            }
        }
    }
    tracing::debug!("translation worker stopping");
    Ok(())
}
