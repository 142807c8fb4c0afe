use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use image::DynamicImage;
use kanal::AsyncSender;
use mihari_capture::{CaptureError, CaptureSource};
use mihari_config::Config;
use mihari_ocr::{RecognitionError, clean_recognized};
use mihari_translate::TranslationError;
use mihari_types::{RecognizeMode, Rect, RegionId, SchedulerEvent, Stage, StageTimings};
use mihari_vision::PipelineConfig;
use tokio::sync::RwLock;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::counters::{PerfCounters, PerfSnapshot};
use crate::registry::RegionRegistry;
use crate::worker::{OcrJob, TranslateJob};
use crate::diff;

/// Per-tick parameter snapshot; one read of the config per tick, so a
/// concurrent settings change never tears a tick in progress.
#[derive(Clone)]
struct TickParams {
    threshold: f64,
    pipeline: PipelineConfig,
    preprocess: bool,
    direct_translate: bool,
}

pub struct PreviewResult {
    pub path: PathBuf,
    pub text: Option<String>,
}

/// The pipeline driver. On each tick it snapshots the enabled,
/// non-in-flight regions and runs capture, change detection,
/// preprocessing, recognition, translation and publish for each as an
/// independent task. The driver itself never blocks on inference.
pub struct Scheduler {
    config: Arc<RwLock<Config>>,
    registry: Arc<RegionRegistry>,
    capture: Arc<dyn CaptureSource>,
    ocr_tx: AsyncSender<OcrJob>,
    translate_tx: AsyncSender<TranslateJob>,
    events_tx: AsyncSender<SchedulerEvent>,
    target: Mutex<Option<u32>>,
    counters: PerfCounters,
}

impl Scheduler {
    pub fn new(
        config: Arc<RwLock<Config>>,
        registry: Arc<RegionRegistry>,
        capture: Arc<dyn CaptureSource>,
        ocr_tx: AsyncSender<OcrJob>,
        translate_tx: AsyncSender<TranslateJob>,
        events_tx: AsyncSender<SchedulerEvent>,
    ) -> Self {
        Self {
            config,
            registry,
            capture,
            ocr_tx,
            translate_tx,
            events_tx,
            target: Mutex::new(None),
            counters: PerfCounters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<RegionRegistry> {
        &self.registry
    }

    pub fn set_target_window(&self, window_id: Option<u32>) {
        *self.target.lock().unwrap() = window_id;
    }

    pub fn target_window(&self) -> Option<u32> {
        *self.target.lock().unwrap()
    }

    pub fn stats(&self) -> PerfSnapshot {
        self.counters.snapshot()
    }

    /// Periodic driver loop. Re-reads the interval every cycle so
    /// runtime changes apply without a restart.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        tracing::info!("scheduler starting");
        loop {
            let interval = {
                let config = self.config.read().await;
                Duration::from_millis(config.scheduler.tick_interval_ms)
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.tick().await;
        }
        tracing::info!("scheduler stopping");
        Ok(())
    }

    /// One evaluation cycle. Spawns an independent run per runnable
    /// region and returns the handles without awaiting them.
    pub async fn tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let Some(window) = self.target_window() else {
            return Vec::new();
        };

        let params = {
            let config = self.config.read().await;
            TickParams {
                threshold: config.scheduler.diff_threshold,
                pipeline: config.pipeline.clone(),
                preprocess: config.ocr.preprocess_enabled(config.ocr.engine),
                direct_translate: config.ocr.direct_translation
                    && config.ocr.engine.supports_direct_translation(),
            }
        };

        self.registry
            .begin_runnable()
            .into_iter()
            .map(|(id, rect)| {
                let scheduler = Arc::clone(self);
                let params = params.clone();
                tokio::spawn(async move {
                    scheduler.run_region(window, id, rect, params).await;
                })
            })
            .collect()
    }

    /// State sequence for one region: Capturing -> (short-circuit) |
    /// Preprocessing -> Recognizing -> Translating -> Publishing.
    /// Failure at any stage returns to idle with prior text retained.
    async fn run_region(self: Arc<Self>, window: u32, id: RegionId, rect: Rect, params: TickParams) {
        let t_total = Instant::now();
        let mut timings = StageTimings::default();

        // Capture, off the driver thread.
        let t = Instant::now();
        let capture = Arc::clone(&self.capture);
        let captured = tokio::task::spawn_blocking(move || capture.capture(window, rect)).await;
        timings.capture_ms = t.elapsed().as_millis() as u64;
        let frame = match captured {
            Ok(Ok(frame)) => frame,
            Ok(Err(CaptureError::InvalidWindow)) => {
                self.window_lost(window).await;
                self.fail(id, Stage::Capture, "window lost").await;
                return;
            }
            Ok(Err(e)) => {
                self.fail(id, Stage::Capture, &e.to_string()).await;
                return;
            }
            Err(e) => {
                self.fail(id, Stage::Capture, &e.to_string()).await;
                return;
            }
        };

        // Change detection; the primary cost control. At or below the
        // threshold nothing further runs this tick.
        let previous = self.registry.last_frame(id);
        let score = diff::diff_score(&frame, previous.as_ref());
        if score <= params.threshold {
            self.registry.finish(id, None);
            self.counters.record_skip();
            tracing::trace!(region = %id, score, "unchanged, skipping");
            return;
        }
        self.registry.commit_frame(id, frame.clone());

        let mut image = DynamicImage::ImageRgba8(frame);
        if params.preprocess {
            let t = Instant::now();
            let pipeline = params.pipeline.clone();
            image = match tokio::task::spawn_blocking(move || pipeline.apply(image)).await {
                Ok(processed) => processed,
                Err(e) => {
                    self.fail(id, Stage::Preprocess, &e.to_string()).await;
                    return;
                }
            };
            timings.preprocess_ms = t.elapsed().as_millis() as u64;
        }

        // Recognition through the single-worker funnel.
        let t = Instant::now();
        let mode = if params.direct_translate {
            RecognizeMode::DirectTranslate
        } else {
            RecognizeMode::Text
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .ocr_tx
            .send(OcrJob::Recognize {
                image,
                mode,
                reply: reply_tx,
            })
            .await;
        if sent.is_err() {
            self.fail(id, Stage::Recognize, "recognition worker gone").await;
            return;
        }
        let recognized = match reply_rx.await {
            Ok(Ok(text)) => clean_recognized(&text),
            // A backend that never loaded degrades to empty output.
            Ok(Err(RecognitionError::BackendUnavailable)) => String::new(),
            Ok(Err(e)) => {
                self.fail(id, Stage::Recognize, &e.to_string()).await;
                return;
            }
            Err(_) => {
                self.fail(id, Stage::Recognize, "recognition reply dropped").await;
                return;
            }
        };
        timings.recognize_ms = t.elapsed().as_millis() as u64;

        if recognized.is_empty() {
            self.registry.finish(id, None);
            self.counters.record_empty();
            tracing::trace!(region = %id, "recognized empty, prior text stands");
            return;
        }

        let translated = if params.direct_translate {
            recognized.clone()
        } else {
            let t = Instant::now();
            let (reply_tx, reply_rx) = oneshot::channel();
            let sent = self
                .translate_tx
                .send(TranslateJob::Translate {
                    text: recognized.clone(),
                    reply: reply_tx,
                })
                .await;
            if sent.is_err() {
                self.fail(id, Stage::Translate, "translation worker gone").await;
                return;
            }
            let translated = match reply_rx.await {
                Ok(Ok(text)) => text,
                Ok(Err(TranslationError::BackendUnavailable)) => String::new(),
                Ok(Err(e)) => {
                    self.fail(id, Stage::Translate, &e.to_string()).await;
                    return;
                }
                Err(_) => {
                    self.fail(id, Stage::Translate, "translation reply dropped").await;
                    return;
                }
            };
            timings.translate_ms = t.elapsed().as_millis() as u64;
            translated
        };

        timings.total_ms = t_total.elapsed().as_millis() as u64;

        // Publish is a no-op when the region was removed mid-run.
        if self
            .registry
            .finish(id, Some((recognized.clone(), translated.clone())))
        {
            self.counters.record_run(timings);
            tracing::debug!(
                region = %id,
                capture_ms = timings.capture_ms,
                preprocess_ms = timings.preprocess_ms,
                recognize_ms = timings.recognize_ms,
                translate_ms = timings.translate_ms,
                total_ms = timings.total_ms,
                "pipeline run complete"
            );
            let _ = self
                .events_tx
                .send(SchedulerEvent::Published {
                    id,
                    text: recognized,
                    translated,
                    timings,
                })
                .await;
        } else {
            tracing::debug!(region = %id, "region gone, result discarded");
        }
    }

    async fn fail(&self, id: RegionId, stage: Stage, detail: &str) {
        self.registry.finish(id, None);
        self.counters.record_failure();
        tracing::warn!(region = %id, %stage, detail, "stage failed, prior text retained");
        let _ = self
            .events_tx
            .send(SchedulerEvent::Degraded {
                id,
                stage,
                detail: detail.to_string(),
            })
            .await;
    }

    /// Clear the target exactly once and tell the interaction layer;
    /// regions stay paused until a window is selected again.
    async fn window_lost(&self, window: u32) {
        let cleared = {
            let mut target = self.target.lock().unwrap();
            if *target == Some(window) {
                *target = None;
                true
            } else {
                false
            }
        };
        if cleared {
            tracing::warn!(window, "target window lost, pausing all regions");
            let _ = self.events_tx.send(SchedulerEvent::WindowLost).await;
        }
    }

    /// On-demand preprocessing preview for one region: capture now,
    /// run the pipeline, write a PNG, optionally recognize. Bypasses
    /// change detection and never mutates region state.
    pub async fn preview(&self, id: RegionId) -> anyhow::Result<PreviewResult> {
        let window = self.target_window().context("no target window selected")?;
        let rect = self.registry.rect_of(id).context("unknown region")?;

        let capture = Arc::clone(&self.capture);
        let frame = tokio::task::spawn_blocking(move || capture.capture(window, rect)).await??;

        let pipeline = {
            let config = self.config.read().await;
            config.pipeline.clone()
        };
        let processed =
            tokio::task::spawn_blocking(move || pipeline.apply(DynamicImage::ImageRgba8(frame)))
                .await?;

        let path =
            std::env::temp_dir().join(format!("mihari-preview-{}.png", Uuid::new_v4().simple()));
        let save_path = path.clone();
        let image = processed.clone();
        tokio::task::spawn_blocking(move || image.save(&save_path)).await??;

        let (reply_tx, reply_rx) = oneshot::channel();
        let text = if self
            .ocr_tx
            .send(OcrJob::Recognize {
                image: processed,
                mode: RecognizeMode::Text,
                reply: reply_tx,
            })
            .await
            .is_ok()
        {
            reply_rx
                .await
                .ok()
                .and_then(|r| r.ok())
                .map(|t| clean_recognized(&t))
                // A disabled or empty-handed backend reports no text
                // rather than an empty one.
                .filter(|t| !t.is_empty())
        } else {
            None
        };

        Ok(PreviewResult { path, text })
    }
}
