//! Text-generation oracle
//!
//! The oracle is the only collaborator that turns prompts into text. It is
//! built once at process start and shared as an `Arc<dyn Oracle>` by the
//! schema, suggestion and query pipelines.

use async_trait::async_trait;

use crate::Result;

pub mod gemini;

pub use gemini::GeminiOracle;

/// A text-completion service
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Complete a prompt, returning the raw model text
    ///
    /// # Errors
    ///
    /// Returns `AskdbError::OracleError` if the service is unreachable,
    /// rejects the request, or replies without any text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier, used in logs
    fn name(&self) -> &str;
}
