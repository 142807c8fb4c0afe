//! Line-oriented command surface over stdin: the minimal stand-in for
//! the region-selection and settings interaction layer, which is out
//! of scope here.

use std::sync::Arc;

use anyhow::{Context, bail};
use mihari_capture::{find_window, list_windows};
use mihari_core::OcrJob;
use mihari_types::{EngineKind, Rect, RegionId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::engines;
use crate::state::AppState;

const HELP: &str = "commands: windows | window <title> | add <left> <top> <w> <h> | list | \
toggle <id> | remove <id> | engines | engine <lightweight|vlm> | preprocess <on|off> | \
direct <on|off> | interval <ms> | threshold <score> | preview <id> | stats | save | quit";

pub async fn command_loop(state: Arc<AppState>, cancel: CancellationToken) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                _ => break,
            },
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = handle_line(&state, &cancel, line).await {
            println!("error: {e}");
        }
    }
    Ok(())
}

async fn handle_line(
    state: &Arc<AppState>,
    cancel: &CancellationToken,
    line: &str,
) -> anyhow::Result<()> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let mut args = rest.split_whitespace();

    match command {
        "help" => println!("{HELP}"),
        "windows" => {
            let windows = tokio::task::spawn_blocking(list_windows).await??;
            for w in windows {
                println!("{:>10}  {}", w.id, w.title);
            }
        }
        "window" => {
            if rest.is_empty() {
                bail!("usage: window <title>");
            }
            select_window(state, rest).await;
        }
        "add" => {
            let left: i32 = args.next().context("usage: add <left> <top> <w> <h>")?.parse()?;
            let top: i32 = args.next().context("missing top")?.parse()?;
            let width: u32 = args.next().context("missing width")?.parse()?;
            let height: u32 = args.next().context("missing height")?.parse()?;
            let id = state
                .scheduler
                .registry()
                .add(Rect::new(left, top, width, height));
            println!("added region {id}");
        }
        "list" => {
            for s in state.scheduler.registry().list() {
                println!(
                    "{}  [{},{} {}x{}]  enabled={} in_flight={}  text={:?}  translated={:?}",
                    s.id,
                    s.rect.left,
                    s.rect.top,
                    s.rect.width,
                    s.rect.height,
                    s.enabled,
                    s.in_flight,
                    s.text,
                    s.translated,
                );
            }
        }
        "toggle" => {
            let id = resolve(state, args.next().context("usage: toggle <id>")?)?;
            let enabled = state
                .scheduler
                .registry()
                .list()
                .into_iter()
                .find(|s| s.id == id)
                .map(|s| s.enabled)
                .context("unknown region")?;
            state.scheduler.registry().set_enabled(id, !enabled);
            println!("region {id} {}", if enabled { "disabled" } else { "enabled" });
        }
        "remove" => {
            let id = resolve(state, args.next().context("usage: remove <id>")?)?;
            state.scheduler.registry().remove(id);
            println!("region {id} removed");
        }
        "engines" => {
            let active = state.config.read().await.ocr.engine;
            for info in mihari_ocr::available_engines() {
                println!(
                    "{}{}  {}  accelerator={}",
                    if info.kind == active { "*" } else { " " },
                    info.kind,
                    info.name,
                    info.requires_accelerator,
                );
            }
        }
        "engine" => {
            let kind = parse_engine(args.next().context("usage: engine <lightweight|vlm>")?)?;
            let ocr_config = {
                let mut config = state.config.write().await;
                config.ocr.engine = kind;
                config.ocr.clone()
            };
            state.save_config().await;
            // Swap takes effect between jobs; in-flight runs keep the
            // old engine until they finish.
            let engine = engines::build_recognition_engine(&ocr_config).await;
            state.ocr_tx.send(OcrJob::Swap { engine }).await?;
            println!("active engine: {kind}");
        }
        "preprocess" => {
            let flag = parse_flag(args.next().context("usage: preprocess <on|off>")?)?;
            {
                let mut config = state.config.write().await;
                let engine = config.ocr.engine;
                config.ocr.preprocess.insert(engine, flag);
            }
            state.save_config().await;
            println!("preprocessing {}", if flag { "on" } else { "off" });
        }
        "direct" => {
            let flag = parse_flag(args.next().context("usage: direct <on|off>")?)?;
            {
                let mut config = state.config.write().await;
                config.ocr.direct_translation = flag;
            }
            state.save_config().await;
            println!("direct translation {}", if flag { "on" } else { "off" });
        }
        "interval" => {
            let ms: u64 = args.next().context("usage: interval <ms>")?.parse()?;
            let applied = {
                let mut config = state.config.write().await;
                config.scheduler.tick_interval_ms = ms;
                config.scheduler.clamp();
                config.scheduler.tick_interval_ms
            };
            state.save_config().await;
            println!("tick interval {applied}ms");
        }
        "threshold" => {
            let score: f64 = args.next().context("usage: threshold <score>")?.parse()?;
            {
                let mut config = state.config.write().await;
                config.scheduler.diff_threshold = score;
                config.scheduler.clamp();
            }
            state.save_config().await;
            println!("diff threshold {score}");
        }
        "preview" => {
            let id = resolve(state, args.next().context("usage: preview <id>")?)?;
            let preview = state.scheduler.preview(id).await?;
            println!("preview written to {}", preview.path.display());
            if let Some(text) = preview.text {
                println!("recognized: {text:?}");
            }
        }
        "stats" => {
            let stats = state.scheduler.stats();
            println!(
                "processed={} skipped={} empty={} failed={}",
                stats.processed, stats.skipped, stats.empty, stats.failed
            );
            if let Some(t) = stats.last_timings {
                println!(
                    "last run: capture={}ms preprocess={}ms recognize={}ms translate={}ms total={}ms",
                    t.capture_ms, t.preprocess_ms, t.recognize_ms, t.translate_ms, t.total_ms
                );
            }
        }
        "save" => {
            state.save_config().await;
            println!("config saved");
        }
        "quit" | "exit" => cancel.cancel(),
        other => bail!("unknown command {other:?}, try 'help'"),
    }
    Ok(())
}

/// Resolve the target window by title and remember it in the config.
pub async fn select_window(state: &Arc<AppState>, title: &str) {
    let lookup = title.to_string();
    match tokio::task::spawn_blocking(move || find_window(&lookup)).await {
        Ok(Ok(Some(info))) => {
            state.scheduler.set_target_window(Some(info.id));
            {
                let mut config = state.config.write().await;
                config.capture.target_window = Some(info.title.clone());
            }
            tracing::info!(window = info.id, title = info.title, "target window selected");
        }
        Ok(Ok(None)) => tracing::warn!(title, "no window matches that title"),
        Ok(Err(e)) => tracing::warn!(error = %e, "window enumeration failed"),
        Err(e) => tracing::warn!(error = %e, "window enumeration task failed"),
    }
}

fn resolve(state: &Arc<AppState>, prefix: &str) -> anyhow::Result<RegionId> {
    state
        .scheduler
        .registry()
        .resolve(prefix)
        .with_context(|| format!("no region matches {prefix:?}"))
}

fn parse_engine(s: &str) -> anyhow::Result<EngineKind> {
    match s {
        "lightweight" => Ok(EngineKind::Lightweight),
        "vlm" => Ok(EngineKind::Vlm),
        other => bail!("unknown engine {other:?}"),
    }
}

fn parse_flag(s: &str) -> anyhow::Result<bool> {
    match s {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => bail!("expected on/off, got {other:?}"),
    }
}
