use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{build_rewrite_instruction, RewriteError, Rewriter};

/// Rewriter backed by a model CLI such as `claude -p`.
///
/// The instruction is passed as the final argument and stdout is taken as
/// the rewritten prompt.
pub struct CommandRewriter {
    binary_path: PathBuf,
    args: Vec<String>,
}

impl CommandRewriter {
    pub fn new(binary_path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            args,
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl Default for CommandRewriter {
    fn default() -> Self {
        Self::new("claude", vec!["-p".to_string()])
    }
}

#[async_trait]
impl Rewriter for CommandRewriter {
    fn name(&self) -> &str {
        self.binary_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("rewriter")
    }

    async fn rewrite(&self, content: &str) -> Result<String, RewriteError> {
        let instruction = build_rewrite_instruction(content);
        let start = Instant::now();

        debug!(
            binary = %self.binary_path.display(),
            args = ?self.args,
            prompt_len = content.len(),
            "Spawning rewrite process"
        );

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .arg(&instruction)
            .stdin(Stdio::null())
            .output()
            .await?;

        info!(
            exit_code = output.status.code().unwrap_or(-1),
            duration_secs = start.elapsed().as_secs_f64(),
            "Rewrite completed"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RewriteError::Failed(if stderr.is_empty() {
                format!("{} exited with {}", self.name(), output.status)
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}
