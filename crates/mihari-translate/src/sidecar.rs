use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use mihari_types::Device;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::{TranslationEngine, TranslationError};

#[derive(Serialize)]
struct Request<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Long-lived offline translation process, newline-delimited JSON over
/// stdin/stdout. The model is loaded once at spawn; device selection
/// is resolved here, never per call.
pub struct SidecarTranslator {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl SidecarTranslator {
    pub async fn spawn(
        command: &str,
        args: &[String],
        device: Device,
    ) -> Result<Self, TranslationError> {
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
                tracing::warn!(command, error = %e, "failed to spawn translator sidecar");
                TranslationError::BackendUnavailable
            })?;

        let stdin = child.stdin.take().ok_or(TranslationError::BackendUnavailable)?;
        let stdout = child.stdout.take().ok_or(TranslationError::BackendUnavailable)?;
        let mut stdout = BufReader::new(stdout).lines();

        match stdout.next_line().await {
            Ok(Some(_)) => {}
            _ => return Err(TranslationError::BackendUnavailable),
        }
        tracing::info!(
            load_ms = t0.elapsed().as_millis() as u64,
            device = device.as_arg(),
            "translator loaded"
        );

        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }
}

#[async_trait]
impl TranslationEngine for SidecarTranslator {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    async fn translate(&mut self, text: &str) -> Result<String, TranslationError> {
        // Empty input never reaches the backend.
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let request = serde_json::to_string(&Request { text })
            .map_err(|e| TranslationError::InferenceFailed(e.to_string()))?;

        self.stdin
            .write_all(request.as_bytes())
            .await
            .map_err(|_| TranslationError::BackendUnavailable)?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|_| TranslationError::BackendUnavailable)?;
        self.stdin
            .flush()
            .await
            .map_err(|_| TranslationError::BackendUnavailable)?;

        let line = self
            .stdout
            .next_line()
            .await
            .map_err(|_| TranslationError::BackendUnavailable)?
            .ok_or(TranslationError::BackendUnavailable)?;

        let response: Response = serde_json::from_str(&line)
            .map_err(|e| TranslationError::InferenceFailed(e.to_string()))?;
        if let Some(error) = response.error {
            return Err(TranslationError::InferenceFailed(error));
        }
        Ok(response.text.unwrap_or_default())
    }
}

impl Drop for SidecarTranslator {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}
