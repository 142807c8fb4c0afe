//! Scripted capture source and instrumented engines for scheduler
//! behavior tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use mihari_capture::{CaptureError, CaptureSource};
use mihari_ocr::{RecognitionEngine, RecognitionError};
use mihari_translate::{TranslationEngine, TranslationError};
use mihari_types::{EngineKind, RecognizeMode, Rect};

/// Capture source returning per-rect uniform frames set by the test.
pub struct ScriptedCapture {
    frames: Mutex<HashMap<Rect, RgbaImage>>,
    invalid: AtomicBool,
    pub calls: AtomicUsize,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(HashMap::new()),
            invalid: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_frame(&self, rect: Rect, value: u8) {
        let frame = RgbaImage::from_pixel(rect.width, rect.height, Rgba([value, value, value, 255]));
        self.frames.lock().unwrap().insert(rect, frame);
    }

    pub fn set_invalid(&self, invalid: bool) {
        self.invalid.store(invalid, Ordering::SeqCst);
    }
}

impl CaptureSource for ScriptedCapture {
    fn capture(&self, _window_id: u32, rect: Rect) -> Result<RgbaImage, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.invalid.load(Ordering::SeqCst) {
            return Err(CaptureError::InvalidWindow);
        }
        self.frames
            .lock()
            .unwrap()
            .get(&rect)
            .cloned()
            .ok_or_else(|| CaptureError::CaptureFailed("no frame scripted".into()))
    }
}

/// Recognizer returning "text<n>" for the n-th call, with optional
/// delay, failure on marked frames, and empty output from a call on.
pub struct MockRecognizer {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    fail_marker: Option<u8>,
    empty_from_call: Option<usize>,
}

impl MockRecognizer {
    pub fn new(calls: Arc<AtomicUsize>) -> Self {
        Self {
            calls,
            delay: Duration::ZERO,
            fail_marker: None,
            empty_from_call: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail whenever the frame's top-left red channel equals `marker`.
    pub fn with_fail_marker(mut self, marker: u8) -> Self {
        self.fail_marker = Some(marker);
        self
    }

    pub fn empty_from(mut self, call: usize) -> Self {
        self.empty_from_call = Some(call);
        self
    }
}

#[async_trait]
impl RecognitionEngine for MockRecognizer {
    fn kind(&self) -> EngineKind {
        EngineKind::Lightweight
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn recognize(
        &mut self,
        image: &DynamicImage,
        _mode: RecognizeMode,
    ) -> Result<String, RecognitionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(marker) = self.fail_marker {
            let rgba = image.to_rgba8();
            if rgba.width() > 0 && rgba.get_pixel(0, 0).0[0] == marker {
                return Err(RecognitionError::InferenceFailed("marked frame".into()));
            }
        }
        if let Some(from) = self.empty_from_call {
            if n >= from {
                return Ok(String::new());
            }
        }
        Ok(format!("text{n}"))
    }
}

/// Translator prefixing its input, counting invocations.
pub struct MockTranslator {
    calls: Arc<AtomicUsize>,
}

impl MockTranslator {
    pub fn new(calls: Arc<AtomicUsize>) -> Self {
        Self { calls }
    }
}

#[async_trait]
impl TranslationEngine for MockTranslator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn translate(&mut self, text: &str) -> Result<String, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("EN:{text}"))
    }
}
