//! # talqena-rewrite
//!
//! The text-rewrite assistant used to "enhance" a prompt.
//!
//! - [`Rewriter`] - the boundary the library talks to
//! - [`CommandRewriter`] - runs an external model CLI non-interactively
//!   and takes its stdout as the improved prompt
//!
//! Nothing in persistence depends on a rewriter being available.

mod command;
mod traits;

pub use command::CommandRewriter;
pub use traits::{RewriteError, Rewriter};

/// Build the instruction sent to the model for `original`.
pub fn build_rewrite_instruction(original: &str) -> String {
    format!(
        "You are an expert Prompt Engineer. Rewrite the following prompt to be more effective, \
         clear, and structured for a Large Language Model. Keep the core intent but improve \
         the phrasing.\n\nOriginal Prompt: \"{}\"\n\nOutput ONLY the improved prompt text. \
         Do not add explanations.",
        original
    )
}
