use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while rewriting a prompt
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Failed to spawn rewrite process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Rewrite service unavailable: {0}")]
    Unavailable(String),

    #[error("Rewrite failed: {0}")]
    Failed(String),
}

/// A service that turns prompt text into improved prompt text
#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Human-readable name of the service
    fn name(&self) -> &str;

    /// Rewrite `content`. An empty answer means "no improvement".
    async fn rewrite(&self, content: &str) -> Result<String, RewriteError>;

    /// Check if the service can be reached
    async fn is_available(&self) -> bool;
}
