//! LLM session launcher contract and the child-process implementation.
//!
//! A launch opens one session, streams typed messages, projects each to a
//! `ProcessLogEntry` for the optional observer, and resolves to a
//! `SessionOutcome`. Two deadlines race the stream: the total timeout and
//! an optional idle timeout that resets on every message. Sessions never
//! outlive the call.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::injection::InjectionChannel;
use super::tracker::ProcessTracker;
use super::types::{ProcessLogEntry, SessionMessage};
use crate::error::PsycheError;

pub type LogCallback = Arc<dyn Fn(ProcessLogEntry) + Send + Sync>;

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub system_prompt: String,
    pub user_message: String,
}

#[derive(Clone)]
pub struct LaunchOptions {
    pub model: Option<String>,
    pub cwd: Option<PathBuf>,
    pub on_log: Option<LogCallback>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub injection: Option<Arc<InjectionChannel>>,
    pub cancel: Option<CancellationToken>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            model: None,
            cwd: None,
            on_log: None,
            max_retries: 0,
            retry_delay: Duration::from_millis(1000),
            timeout: DEFAULT_SESSION_TIMEOUT,
            idle_timeout: None,
            injection: None,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub raw_output: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub success: bool,
    /// The final result message's payload, when one was streamed.
    pub result: Option<String>,
    pub error: Option<String>,
}

impl SessionOutcome {
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            raw_output: String::new(),
            exit_code: None,
            duration_ms,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// The text a parser should work with: the result payload when present,
    /// otherwise the accumulated assistant text.
    pub fn text(&self) -> &str {
        self.result.as_deref().unwrap_or(&self.raw_output)
    }
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Open a session and drive it to completion. Failures are encoded in
    /// the outcome; this never panics and never returns early with half a
    /// stream unobserved.
    async fn launch(&self, request: SessionRequest, options: LaunchOptions) -> SessionOutcome;

    /// Whether in-flight message injection reaches the session. When false,
    /// injected messages are dropped with a debug log.
    fn supports_injection(&self) -> bool {
        true
    }
}

// ─── ProcessLauncher ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProcessLauncherConfig {
    /// Agent CLI binary. Speaks newline-delimited JSON on stdout and
    /// accepts user messages as JSON lines on stdin.
    pub program: String,
    pub args: Vec<String>,
    pub default_model: Option<String>,
    pub injection_supported: bool,
}

impl ProcessLauncherConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            default_model: None,
            injection_supported: true,
        }
    }
}

/// Drives an external agent CLI as a child process, one process per session.
pub struct ProcessLauncher {
    config: ProcessLauncherConfig,
    tracker: Arc<ProcessTracker>,
}

enum StreamEnd {
    Eof,
    TotalTimeout,
    IdleTimeout,
    Cancelled,
    ReadError(std::io::Error),
}

enum ReadOutcome {
    Line(std::io::Result<Option<String>>),
    Idle,
}

impl ProcessLauncher {
    pub fn new(config: ProcessLauncherConfig, tracker: Arc<ProcessTracker>) -> Self {
        Self { config, tracker }
    }

    pub fn tracker(&self) -> &Arc<ProcessTracker> {
        &self.tracker
    }

    async fn run_once(&self, request: &SessionRequest, options: &LaunchOptions) -> SessionOutcome {
        let started = Instant::now();
        let session_id = Uuid::new_v4();
        let elapsed_ms = |s: Instant| s.elapsed().as_millis() as u64;

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        if let Some(model) = options.model.as_deref().or(self.config.default_model.as_deref()) {
            cmd.arg("--model").arg(model);
        }
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return SessionOutcome::failure(
                    format!("failed to spawn {}: {e}", self.config.program),
                    elapsed_ms(started),
                )
            }
        };
        let pid = child.id();
        if let Some(pid) = pid {
            self.tracker.register(pid, format!("session-{session_id}"));
            debug!("session {session_id} spawned as pid {pid}");
        }

        let mut stdin = child.stdin.take();
        if let Some(sink) = stdin.as_mut() {
            let opening = format!(
                "{}\n",
                json!({
                    "system_prompt": request.system_prompt,
                    "user_message": request.user_message,
                })
            );
            if let Err(e) = sink.write_all(opening.as_bytes()).await {
                debug!("could not write opening request: {e}");
            }
            let _ = sink.flush().await;
        }

        let stdout = match child.stdout.take() {
            Some(out) => out,
            None => {
                let _ = child.kill().await;
                return SessionOutcome::failure("session stdout unavailable", elapsed_ms(started));
            }
        };
        let mut lines = LinesStream::new(BufReader::new(stdout).lines());

        let deadline = tokio::time::Instant::now() + options.timeout;
        let injection = options.injection.clone();
        let inject_ok = injection.is_some() && self.config.injection_supported;
        if injection.is_some() && !self.config.injection_supported {
            debug!("injection channel dropped: transport does not support streamed input");
        }
        let cancel = options.cancel.clone();
        let idle_timeout = options.idle_timeout;

        let mut raw_output = String::new();
        let mut result_payload: Option<String> = None;
        let mut result_error: Option<String> = None;
        let mut result_is_error = false;

        let end = loop {
            let read = async {
                match idle_timeout {
                    Some(idle) => match tokio::time::timeout(idle, lines.next()).await {
                        Ok(res) => ReadOutcome::Line(res.transpose()),
                        Err(_) => ReadOutcome::Idle,
                    },
                    None => ReadOutcome::Line(lines.next().await.transpose()),
                }
            };

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break StreamEnd::TotalTimeout,
                _ = async { cancel.as_ref().unwrap().cancelled().await }, if cancel.is_some() => {
                    break StreamEnd::Cancelled;
                }
                message = async { injection.as_ref().unwrap().recv().await }, if inject_ok => {
                    match stdin.as_mut() {
                        Some(sink) => {
                            let line = format!("{}\n", json!({ "type": "user", "message": message }));
                            if let Err(e) = sink.write_all(line.as_bytes()).await {
                                debug!("injection dropped, stdin closed: {e}");
                            }
                            let _ = sink.flush().await;
                        }
                        None => debug!("injection dropped, session has no input channel"),
                    }
                }
                outcome = read => match outcome {
                    ReadOutcome::Idle => break StreamEnd::IdleTimeout,
                    ReadOutcome::Line(Ok(None)) => break StreamEnd::Eof,
                    ReadOutcome::Line(Err(e)) => break StreamEnd::ReadError(e),
                    ReadOutcome::Line(Ok(Some(line))) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let message: SessionMessage = match serde_json::from_str(line) {
                            Ok(message) => message,
                            Err(e) => {
                                debug!("unparseable session message ignored: {e}");
                                continue;
                            }
                        };
                        if let Some(on_log) = &options.on_log {
                            for entry in message.log_entries() {
                                on_log(entry);
                            }
                        }
                        raw_output.push_str(&message.text());
                        if let SessionMessage::Result { result, error, is_error } = &message {
                            result_payload = result.clone();
                            result_error = error.clone();
                            result_is_error = *is_error;
                        }
                    }
                }
            }
        };

        // Close our end of stdin so a CLI draining it sees EOF and exits.
        drop(stdin);

        match end {
            StreamEnd::Eof => {
                let status = child.wait().await.ok();
                if let Some(pid) = pid {
                    self.tracker.exited(pid);
                }
                let exit_code = status.and_then(|s| s.code());
                let exited_cleanly = exit_code.map(|c| c == 0).unwrap_or(false);
                let success = exited_cleanly && !result_is_error && result_error.is_none();
                let error = if success {
                    None
                } else {
                    Some(result_error.clone().unwrap_or_else(|| {
                        format!("session exited with code {exit_code:?}")
                    }))
                };
                SessionOutcome {
                    raw_output,
                    exit_code,
                    duration_ms: elapsed_ms(started),
                    success,
                    result: result_payload,
                    error,
                }
            }
            StreamEnd::TotalTimeout => {
                let _ = child.kill().await;
                if let Some(pid) = pid {
                    self.tracker.exited(pid);
                }
                let ms = options.timeout.as_millis() as u64;
                SessionOutcome {
                    raw_output,
                    exit_code: None,
                    duration_ms: elapsed_ms(started),
                    success: false,
                    result: result_payload,
                    error: Some(PsycheError::Timeout(ms).to_string()),
                }
            }
            StreamEnd::IdleTimeout => {
                // Recorded as abandoned so external cleanup can account for
                // it; the handle teardown reaps the process itself.
                if let Some(pid) = pid {
                    self.tracker.abandon(pid);
                }
                let ms = idle_timeout.map(|d| d.as_millis() as u64).unwrap_or(0);
                SessionOutcome {
                    raw_output,
                    exit_code: None,
                    duration_ms: elapsed_ms(started),
                    success: false,
                    result: result_payload,
                    error: Some(PsycheError::IdleTimeout(ms).to_string()),
                }
            }
            StreamEnd::Cancelled => {
                let _ = child.kill().await;
                if let Some(pid) = pid {
                    self.tracker.exited(pid);
                }
                SessionOutcome {
                    raw_output,
                    exit_code: None,
                    duration_ms: elapsed_ms(started),
                    success: false,
                    result: result_payload,
                    error: Some("session cancelled".to_string()),
                }
            }
            StreamEnd::ReadError(e) => {
                let _ = child.kill().await;
                if let Some(pid) = pid {
                    self.tracker.exited(pid);
                }
                SessionOutcome {
                    raw_output,
                    exit_code: None,
                    duration_ms: elapsed_ms(started),
                    success: false,
                    result: result_payload,
                    error: Some(format!("session stream error: {e}")),
                }
            }
        }
    }
}

#[async_trait]
impl SessionLauncher for ProcessLauncher {
    async fn launch(&self, request: SessionRequest, options: LaunchOptions) -> SessionOutcome {
        let mut attempt = 0u32;
        loop {
            let outcome = self.run_once(&request, &options).await;
            if outcome.success || attempt >= options.max_retries {
                return outcome;
            }
            attempt += 1;
            warn!(
                "session attempt {attempt}/{} failed ({:?}), retrying in {:?}",
                options.max_retries, outcome.error, options.retry_delay
            );
            tokio::time::sleep(options.retry_delay).await;
        }
    }

    fn supports_injection(&self) -> bool {
        self.config.injection_supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = LaunchOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(600));
        assert_eq!(options.max_retries, 0);
        assert_eq!(options.retry_delay, Duration::from_millis(1000));
        assert!(options.idle_timeout.is_none());
    }

    #[test]
    fn test_outcome_text_prefers_result() {
        let outcome = SessionOutcome {
            raw_output: "streamed".to_string(),
            exit_code: Some(0),
            duration_ms: 5,
            success: true,
            result: Some("{\"action\":\"idle\"}".to_string()),
            error: None,
        };
        assert_eq!(outcome.text(), "{\"action\":\"idle\"}");

        let outcome = SessionOutcome {
            result: None,
            ..outcome
        };
        assert_eq!(outcome.text(), "streamed");
    }
}
