pub mod azure_openai;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{CompletionRequest, CompletionResponse};

/// Trait for hosted chat-completion services.
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    /// Send a chat completion request and return the first choice.
    async fn chat(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Short name used in log lines.
    fn name(&self) -> &str;
}
