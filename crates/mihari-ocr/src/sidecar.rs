use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use mihari_types::{Device, EngineKind, RecognizeMode};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use uuid::Uuid;

use crate::engine::{RecognitionEngine, RecognitionError};

#[derive(Serialize)]
struct Request<'a> {
    image: &'a str,
    mode: &'a str,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Adapter for a long-lived recognition process speaking
/// newline-delimited JSON over stdin/stdout. The model itself lives in
/// the sidecar; this side only moves frames and text.
pub struct SidecarEngine {
    kind: EngineKind,
    name: &'static str,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl SidecarEngine {
    /// Spawn the configured command once and wait for its ready line.
    /// Device selection is resolved here, not per call.
    pub async fn spawn(
        kind: EngineKind,
        command: &str,
        args: &[String],
        device: Device,
    ) -> Result<Self, RecognitionError> {
        let t0 = Instant::now();
        let mut child = Command::new(command)
            .args(args)
            .arg("--device")
            .arg(device.as_arg())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::warn!(command, error = %e, "failed to spawn recognition sidecar");
                RecognitionError::BackendUnavailable
            })?;

        let stdin = child.stdin.take().ok_or(RecognitionError::BackendUnavailable)?;
        let stdout = child.stdout.take().ok_or(RecognitionError::BackendUnavailable)?;
        let mut stdout = BufReader::new(stdout).lines();

        // The sidecar prints one line once the model is loaded.
        match stdout.next_line().await {
            Ok(Some(_)) => {}
            _ => return Err(RecognitionError::BackendUnavailable),
        }

        let name = match kind {
            EngineKind::Lightweight => "Lightweight OCR",
            EngineKind::Vlm => "Vision-language OCR",
        };
        tracing::info!(
            engine = name,
            load_ms = t0.elapsed().as_millis() as u64,
            device = device.as_arg(),
            "recognition engine loaded"
        );

        Ok(Self {
            kind,
            name,
            child,
            stdin,
            stdout,
        })
    }

    async fn roundtrip(&mut self, request: &str) -> Result<String, RecognitionError> {
        self.stdin
            .write_all(request.as_bytes())
            .await
            .map_err(|_| RecognitionError::BackendUnavailable)?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|_| RecognitionError::BackendUnavailable)?;
        self.stdin
            .flush()
            .await
            .map_err(|_| RecognitionError::BackendUnavailable)?;

        let line = self
            .stdout
            .next_line()
            .await
            .map_err(|_| RecognitionError::BackendUnavailable)?
            .ok_or(RecognitionError::BackendUnavailable)?;

        let response: Response = serde_json::from_str(&line)
            .map_err(|e| RecognitionError::InferenceFailed(e.to_string()))?;
        if let Some(error) = response.error {
            return Err(RecognitionError::InferenceFailed(error));
        }
        Ok(response.text.unwrap_or_default())
    }
}

#[async_trait]
impl RecognitionEngine for SidecarEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        self.name
    }

    async fn recognize(
        &mut self,
        image: &DynamicImage,
        mode: RecognizeMode,
    ) -> Result<String, RecognitionError> {
        let path = frame_path();
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| RecognitionError::InferenceFailed(e.to_string()))?;
        tokio::fs::write(&path, &png)
            .await
            .map_err(|e| RecognitionError::InferenceFailed(e.to_string()))?;

        let mode_tag = match mode {
            RecognizeMode::Text => "text",
            RecognizeMode::DirectTranslate => "translate",
        };
        let request = serde_json::to_string(&Request {
            image: &path.to_string_lossy(),
            mode: mode_tag,
        })
        .map_err(|e| RecognitionError::InferenceFailed(e.to_string()))?;

        let result = self.roundtrip(&request).await;
        let _ = tokio::fs::remove_file(&path).await;
        result
    }
}

impl Drop for SidecarEngine {
    fn drop(&mut self) {
        // kill_on_drop covers the child; start_kill avoids a zombie
        // when the runtime is still alive.
        let _ = self.child.start_kill();
    }
}

fn frame_path() -> PathBuf {
    std::env::temp_dir().join(format!("mihari-{}.png", Uuid::new_v4().simple()))
}
