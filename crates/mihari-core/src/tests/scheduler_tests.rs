//! Scheduler behavior tests: skip discipline, failure isolation and
//! the in-flight lifecycle, driven tick by tick with scripted frames.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kanal::AsyncReceiver;
use mihari_capture::CaptureSource;
use mihari_config::Config;
use mihari_types::{EngineKind, Rect, SchedulerEvent};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::registry::RegionRegistry;
use crate::scheduler::Scheduler;
use crate::tests::mocks::{MockRecognizer, MockTranslator, ScriptedCapture};
use crate::worker::{recognition_worker, translation_worker};

struct Harness {
    scheduler: Arc<Scheduler>,
    capture: Arc<ScriptedCapture>,
    reco_calls: Arc<AtomicUsize>,
    trans_calls: Arc<AtomicUsize>,
    events: AsyncReceiver<SchedulerEvent>,
    _cancel: CancellationToken,
}

fn harness_with(recognizer: MockRecognizer, trans_calls: Arc<AtomicUsize>, reco_calls: Arc<AtomicUsize>) -> Harness {
    harness_with_config(recognizer, trans_calls, reco_calls, |_| {})
}

fn harness_with_config(
    recognizer: MockRecognizer,
    trans_calls: Arc<AtomicUsize>,
    reco_calls: Arc<AtomicUsize>,
    configure: impl FnOnce(&mut Config),
) -> Harness {
    let mut config = Config::default();
    // Raw frames straight to the mock engines.
    config.ocr.preprocess.insert(EngineKind::Lightweight, false);
    configure(&mut config);
    let config = Arc::new(RwLock::new(config));

    let registry = Arc::new(RegionRegistry::new());
    let capture = Arc::new(ScriptedCapture::new());
    let (ocr_tx, ocr_rx) = kanal::bounded_async(32);
    let (trans_tx, trans_rx) = kanal::bounded_async(32);
    let (events_tx, events_rx) = kanal::bounded_async(64);
    let cancel = CancellationToken::new();

    tokio::spawn(recognition_worker(
        ocr_rx,
        Box::new(recognizer),
        cancel.child_token(),
    ));
    tokio::spawn(translation_worker(
        trans_rx,
        Box::new(MockTranslator::new(trans_calls.clone())),
        cancel.child_token(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        config,
        registry,
        capture.clone() as Arc<dyn CaptureSource>,
        ocr_tx,
        trans_tx,
        events_tx,
    ));
    scheduler.set_target_window(Some(1));

    Harness {
        scheduler,
        capture,
        reco_calls,
        trans_calls,
        events: events_rx,
        _cancel: cancel,
    }
}

fn harness() -> Harness {
    let reco_calls = Arc::new(AtomicUsize::new(0));
    let trans_calls = Arc::new(AtomicUsize::new(0));
    harness_with(
        MockRecognizer::new(reco_calls.clone()),
        trans_calls,
        reco_calls,
    )
}

/// Run one tick and wait for every spawned region run to finish.
async fn run_tick(h: &Harness) -> usize {
    let handles = h.scheduler.tick().await;
    let count = handles.len();
    for handle in handles {
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("run timed out")
            .expect("run panicked");
    }
    count
}

fn rect() -> Rect {
    Rect::new(0, 0, 10, 10)
}

#[tokio::test]
async fn identical_frames_recognize_exactly_once() {
    let h = harness();
    h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);

    // First observation forces processing, the two identical ticks
    // after it short-circuit before recognition.
    for _ in 0..3 {
        run_tick(&h).await;
    }

    assert_eq!(h.reco_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.trans_calls.load(Ordering::SeqCst), 1);
    let stats = h.scheduler.stats();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 2);

    match h.events.try_recv().unwrap() {
        Some(SchedulerEvent::Published {
            text, translated, ..
        }) => {
            assert_eq!(text, "text1");
            assert_eq!(translated, "EN:text1");
        }
        other => panic!("expected Published, got {other:?}"),
    }
}

#[tokio::test]
async fn change_above_threshold_reruns_pipeline() {
    let h = harness();
    let id = h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);
    run_tick(&h).await;

    // Mean luminance shift of 5.0 against the default threshold 2.0.
    h.capture.set_frame(rect(), 105);
    run_tick(&h).await;

    assert_eq!(h.reco_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.trans_calls.load(Ordering::SeqCst), 2);
    let snap = h
        .scheduler
        .registry()
        .list()
        .into_iter()
        .find(|s| s.id == id)
        .unwrap();
    assert_eq!(snap.translated, "EN:text2");
}

#[tokio::test]
async fn change_at_or_below_threshold_short_circuits() {
    let h = harness();
    h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);
    run_tick(&h).await;

    // Shift of exactly 2.0 and below stays under the cutoff.
    h.capture.set_frame(rect(), 102);
    run_tick(&h).await;
    h.capture.set_frame(rect(), 101);
    run_tick(&h).await;

    assert_eq!(h.reco_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.trans_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.scheduler.stats().skipped, 2);
}

#[tokio::test]
async fn region_disabled_mid_run_completes_then_stops() {
    let reco_calls = Arc::new(AtomicUsize::new(0));
    let trans_calls = Arc::new(AtomicUsize::new(0));
    let h = harness_with(
        MockRecognizer::new(reco_calls.clone()).with_delay(Duration::from_millis(100)),
        trans_calls,
        reco_calls,
    );
    let id = h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);

    let handles = h.scheduler.tick().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.scheduler.registry().set_enabled(id, false));
    for handle in handles {
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    // The in-flight run completed and published.
    let snap = &h.scheduler.registry().list()[0];
    assert_eq!(snap.text, "text1");

    // No further runs while disabled, even with changed pixels.
    h.capture.set_frame(rect(), 200);
    assert_eq!(run_tick(&h).await, 0);
    assert_eq!(h.reco_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.scheduler.registry().list()[0].text, "text1");
}

#[tokio::test]
async fn recognition_failure_leaves_region_and_neighbors_intact() {
    let reco_calls = Arc::new(AtomicUsize::new(0));
    let trans_calls = Arc::new(AtomicUsize::new(0));
    let h = harness_with(
        MockRecognizer::new(reco_calls.clone()).with_fail_marker(250),
        trans_calls,
        reco_calls,
    );
    let rect_a = Rect::new(0, 0, 10, 10);
    let rect_b = Rect::new(20, 0, 10, 10);
    let a = h.scheduler.registry().add(rect_a);
    let b = h.scheduler.registry().add(rect_b);
    h.capture.set_frame(rect_a, 100);
    h.capture.set_frame(rect_b, 100);
    run_tick(&h).await;

    let before_b = h
        .scheduler
        .registry()
        .list()
        .into_iter()
        .find(|s| s.id == b)
        .unwrap();
    assert!(!before_b.text.is_empty());

    // B's new frame carries the failure marker, A changes normally.
    h.capture.set_frame(rect_a, 110);
    h.capture.set_frame(rect_b, 250);
    run_tick(&h).await;

    let after: Vec<_> = h.scheduler.registry().list();
    let after_a = after.iter().find(|s| s.id == a).unwrap();
    let after_b = after.iter().find(|s| s.id == b).unwrap();
    assert!(after_a.translated.starts_with("EN:"));
    // Failing region keeps its previously published text.
    assert_eq!(after_b.text, before_b.text);
    assert_eq!(h.scheduler.stats().failed, 1);
}

#[tokio::test]
async fn removal_mid_run_discards_result() {
    let reco_calls = Arc::new(AtomicUsize::new(0));
    let trans_calls = Arc::new(AtomicUsize::new(0));
    let h = harness_with(
        MockRecognizer::new(reco_calls.clone()).with_delay(Duration::from_millis(100)),
        trans_calls,
        reco_calls,
    );
    let id = h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);

    let handles = h.scheduler.tick().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.scheduler.registry().remove(id));
    for handle in handles {
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    assert!(h.scheduler.registry().list().is_empty());
    // Nothing was published for the removed region.
    assert!(matches!(h.events.try_recv().unwrap(), None));
}

#[tokio::test]
async fn in_flight_region_is_skipped_by_next_tick() {
    let reco_calls = Arc::new(AtomicUsize::new(0));
    let trans_calls = Arc::new(AtomicUsize::new(0));
    let h = harness_with(
        MockRecognizer::new(reco_calls.clone()).with_delay(Duration::from_millis(200)),
        trans_calls,
        reco_calls,
    );
    h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);

    let first = h.scheduler.tick().await;
    assert_eq!(first.len(), 1);
    // Second tick while the run is still in flight: never queue a
    // second concurrent run for the same region.
    let second = h.scheduler.tick().await;
    assert!(second.is_empty());

    for handle in first {
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn empty_recognition_keeps_prior_text_and_skips_translation() {
    let reco_calls = Arc::new(AtomicUsize::new(0));
    let trans_calls = Arc::new(AtomicUsize::new(0));
    let h = harness_with(
        MockRecognizer::new(reco_calls.clone()).empty_from(2),
        trans_calls,
        reco_calls,
    );
    h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);
    run_tick(&h).await;

    h.capture.set_frame(rect(), 150);
    run_tick(&h).await;

    assert_eq!(h.reco_calls.load(Ordering::SeqCst), 2);
    // Empty output never reaches the translation backend.
    assert_eq!(h.trans_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.scheduler.registry().list()[0].text, "text1");
    assert_eq!(h.scheduler.stats().empty, 1);
}

#[tokio::test]
async fn invalid_window_pauses_processing() {
    let h = harness();
    h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);
    h.capture.set_invalid(true);

    run_tick(&h).await;
    assert_eq!(h.scheduler.target_window(), None);
    let mut saw_window_lost = false;
    while let Ok(Some(event)) = h.events.try_recv() {
        if matches!(event, SchedulerEvent::WindowLost) {
            saw_window_lost = true;
        }
    }
    assert!(saw_window_lost);

    // No target, no runs.
    assert_eq!(run_tick(&h).await, 0);
    assert_eq!(h.reco_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn direct_translation_skips_the_translation_stage() {
    let reco_calls = Arc::new(AtomicUsize::new(0));
    let trans_calls = Arc::new(AtomicUsize::new(0));
    let h = harness_with_config(
        MockRecognizer::new(reco_calls.clone()),
        trans_calls,
        reco_calls,
        |config| {
            config.ocr.engine = EngineKind::Vlm;
            config.ocr.direct_translation = true;
        },
    );
    let id = h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);
    run_tick(&h).await;

    assert_eq!(h.reco_calls.load(Ordering::SeqCst), 1);
    // The translation backend is never touched; the engine's output is
    // published as the translation.
    assert_eq!(h.trans_calls.load(Ordering::SeqCst), 0);
    let snap = h
        .scheduler
        .registry()
        .list()
        .into_iter()
        .find(|s| s.id == id)
        .unwrap();
    assert_eq!(snap.text, "text1");
    assert_eq!(snap.translated, "text1");

    match h.events.try_recv().unwrap() {
        Some(SchedulerEvent::Published {
            text, translated, ..
        }) => {
            assert_eq!(text, "text1");
            assert_eq!(translated, "text1");
        }
        other => panic!("expected Published, got {other:?}"),
    }
}

#[tokio::test]
async fn preview_without_text_reports_none() {
    let reco_calls = Arc::new(AtomicUsize::new(0));
    let trans_calls = Arc::new(AtomicUsize::new(0));
    // An engine with no backend behaves like empty_from(1): every call
    // yields empty output.
    let h = harness_with(
        MockRecognizer::new(reco_calls.clone()).empty_from(1),
        trans_calls,
        reco_calls,
    );
    let id = h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);

    let preview = timeout(Duration::from_secs(5), h.scheduler.preview(id))
        .await
        .unwrap()
        .unwrap();
    assert!(preview.path.exists());
    assert_eq!(preview.text, None);
    let _ = std::fs::remove_file(&preview.path);
}

#[tokio::test]
async fn preview_does_not_mutate_region_state() {
    let h = harness();
    let id = h.scheduler.registry().add(rect());
    h.capture.set_frame(rect(), 100);

    let preview = timeout(Duration::from_secs(5), h.scheduler.preview(id))
        .await
        .unwrap()
        .unwrap();
    assert!(preview.path.exists());
    assert_eq!(preview.text.as_deref(), Some("text1"));
    let _ = std::fs::remove_file(&preview.path);

    let snap = &h.scheduler.registry().list()[0];
    assert!(snap.text.is_empty());
    assert!(!snap.in_flight);
    // The next tick still treats the frame as a first observation.
    run_tick(&h).await;
    assert_eq!(h.scheduler.stats().processed, 1);
}
