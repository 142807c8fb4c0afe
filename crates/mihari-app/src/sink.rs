use kanal::AsyncReceiver;
use mihari_types::SchedulerEvent;
use tokio_util::sync::CancellationToken;

/// Result sink: consumes per-region updates from the scheduler. The
/// real display surface is out of scope; structured logs stand in.
pub async fn event_loop(
    events: AsyncReceiver<SchedulerEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };
        match event {
            SchedulerEvent::Published {
                id,
                text,
                translated,
                timings,
            } => {
                tracing::info!(
                    region = %id,
                    text,
                    translated,
                    recognize_ms = timings.recognize_ms,
                    translate_ms = timings.translate_ms,
                    total_ms = timings.total_ms,
                    "region updated"
                );
            }
            SchedulerEvent::Degraded { id, stage, detail } => {
                tracing::info!(region = %id, %stage, detail, "region degraded");
            }
            SchedulerEvent::WindowLost => {
                tracing::warn!("target window lost; select a new window to resume");
            }
        }
    }
    Ok(())
}
