use std::sync::Arc;

use kanal::{AsyncReceiver, AsyncSender};
use mihari_core::{OcrJob, TranslateJob, recognition_worker, translation_worker};
use mihari_ocr::RecognitionEngine;
use mihari_translate::TranslationEngine;
use mihari_types::SchedulerEvent;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::commands;
use crate::sink;
use crate::state::AppState;

/// Centralized channel management
pub struct ChannelSet {
    pub ocr: (AsyncSender<OcrJob>, AsyncReceiver<OcrJob>),
    pub translate: (AsyncSender<TranslateJob>, AsyncReceiver<TranslateJob>),
    pub events: (AsyncSender<SchedulerEvent>, AsyncReceiver<SchedulerEvent>),
}

impl ChannelSet {
    pub fn new() -> Self {
        Self {
            ocr: kanal::bounded_async(32),      // queued frames per backend
            translate: kanal::bounded_async(32),
            events: kanal::bounded_async(256),  // publish burst capacity
        }
    }
}

/// Application controller for task spawning and lifecycle
pub struct AppController {
    state: Arc<AppState>,
    cancel_token: CancellationToken,
}

impl AppController {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn spawn_tasks(
        &self,
        channels: ChannelSet,
        recognition: Box<dyn RecognitionEngine>,
        translation: Box<dyn TranslationEngine>,
    ) -> JoinSet<anyhow::Result<()>> {
        let mut tasks = JoinSet::new();

        // Single-worker funnels for the shared backends.
        tasks.spawn(recognition_worker(
            channels.ocr.1,
            recognition,
            self.cancel_token.child_token(),
        ));
        tasks.spawn(translation_worker(
            channels.translate.1,
            translation,
            self.cancel_token.child_token(),
        ));

        // Periodic pipeline driver.
        tasks.spawn(
            Arc::clone(&self.state.scheduler).run(self.cancel_token.child_token()),
        );

        // Result sink, stand-in for the display layer.
        tasks.spawn(sink::event_loop(
            channels.events.1,
            self.cancel_token.child_token(),
        ));

        // Command surface, stand-in for the interaction layer.
        tasks.spawn(commands::command_loop(
            Arc::clone(&self.state),
            self.cancel_token.clone(),
        ));

        tasks
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
