//! Engine hot-swap through the serialized worker queue: the swap
//! applies between jobs, so a queued job always finishes on the
//! engine it was queued against.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::DynamicImage;
use mihari_types::RecognizeMode;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::tests::mocks::MockRecognizer;
use crate::worker::{OcrJob, recognition_worker};

async fn recognize_via(tx: &kanal::AsyncSender<OcrJob>) -> String {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(OcrJob::Recognize {
        image: DynamicImage::new_rgba8(4, 4),
        mode: RecognizeMode::Text,
        reply: reply_tx,
    })
    .await
    .unwrap();
    timeout(Duration::from_secs(5), reply_rx)
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn swap_takes_effect_between_jobs() {
    let calls_a = Arc::new(AtomicUsize::new(0));
    let calls_b = Arc::new(AtomicUsize::new(0));
    let engine_a = MockRecognizer::new(calls_a.clone()).with_delay(Duration::from_millis(50));
    let engine_b = MockRecognizer::new(calls_b.clone());

    let (tx, rx) = kanal::bounded_async(8);
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(recognition_worker(rx, Box::new(engine_a), cancel.clone()));

    // Queue a job and immediately the replacement engine behind it.
    // The slow first job is in flight when the swap arrives, and must
    // still complete on the engine it started with.
    let (first_tx, first_rx) = oneshot::channel();
    tx.send(OcrJob::Recognize {
        image: DynamicImage::new_rgba8(4, 4),
        mode: RecognizeMode::Text,
        reply: first_tx,
    })
    .await
    .unwrap();
    tx.send(OcrJob::Swap {
        engine: Box::new(engine_b),
    })
    .await
    .unwrap();

    let first = timeout(Duration::from_secs(5), first_rx)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first, "text1");
    assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    assert_eq!(calls_b.load(Ordering::SeqCst), 0);

    // Everything after the swap runs on the replacement.
    recognize_via(&tx).await;
    recognize_via(&tx).await;
    assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    assert_eq!(calls_b.load(Ordering::SeqCst), 2);

    cancel.cancel();
    let _ = timeout(Duration::from_secs(5), worker).await;
}
