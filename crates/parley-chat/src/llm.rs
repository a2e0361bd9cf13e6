//! Text-generation capability.
//!
//! The pipeline treats generation as an opaque `prompt -> text` call with no
//! determinism or latency guarantee. `CommandGenerator` runs an external
//! program; `TimeoutGenerator` bounds any generator in time.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use parley_core::config::GenerationConfig;

use crate::error::ChatError;

/// Source of generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ChatError>;
}

// =============================================================================
// CommandGenerator
// =============================================================================

/// Generator backed by an external program.
///
/// The prompt is written to the program's stdin; its stdout is the result.
/// A non-zero exit status is reported as `ChatError::Generation`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from the `[generation]` config section.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, ChatError> {
        if config.command.trim().is_empty() {
            return Err(ChatError::Generation(
                "no generation command configured ([generation] command)".to_string(),
            ));
        }
        Ok(Self::new(config.command.clone(), config.args.clone()))
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        debug!(program = %self.program, prompt_len = prompt.len(), "Running generation command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChatError::Generation(format!("failed to start {}: {}", self.program, e)))?;

        // Write from a separate task so a program that fills its stdout pipe
        // before draining stdin cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = prompt.to_string();
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.shutdown().await;
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ChatError::Generation(format!("{} failed: {}", self.program, e)))?;

        if let Some(handle) = writer {
            let _ = handle.await;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(program = %self.program, status = %output.status, "Generation command failed");
            return Err(ChatError::Generation(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// =============================================================================
// TimeoutGenerator
// =============================================================================

/// Wraps a generator and fails with `GenerationTimeout` once `timeout` elapses.
pub struct TimeoutGenerator {
    inner: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl TimeoutGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl TextGenerator for TimeoutGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        match tokio::time::timeout(self.timeout, self.inner.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Generation timed out");
                Err(ChatError::GenerationTimeout(self.timeout.as_secs()))
            }
        }
    }
}
