pub mod prompt;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::AppError;
use crate::provider::ChatCompletionProvider;
use crate::tool::appointment_tools;
use crate::types::{summarize_tool_calls, ChatReply, CompletionRequest, Message};
use crate::util::truncate_string;

pub use prompt::PromptVariant;

/// Prompt variant and sampling parameters bound to a chat route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayProfile {
    pub name: String,
    pub prompt: PromptVariant,
    /// Model id sent upstream; `None` uses the deployment's model.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl RelayProfile {
    pub fn assistant() -> Self {
        Self {
            name: "assistant".to_string(),
            prompt: PromptVariant::Guided,
            model: None,
            max_tokens: 800,
            temperature: 0.7,
            top_p: 0.95,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    pub fn strict() -> Self {
        Self {
            name: "strict".to_string(),
            prompt: PromptVariant::Strict,
            model: Some("gpt-35-turbo".to_string()),
            max_tokens: 800,
            temperature: 0.5,
            top_p: 0.7,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "assistant" => Some(Self::assistant()),
            "strict" => Some(Self::strict()),
            _ => None,
        }
    }
}

/// Check an inbound message; empty or whitespace-only counts as missing.
pub fn validate_message(message: Option<&str>) -> Result<&str, AppError> {
    match message {
        Some(m) if !m.trim().is_empty() => Ok(m),
        _ => Err(AppError::InvalidRequest("Please provide a message.".to_string())),
    }
}

/// Forwards one user message to the chat-completion service with the
/// appointment prompt and tools, and hands back the model's reply.
pub struct ChatRelay {
    provider: Arc<dyn ChatCompletionProvider>,
    profile: RelayProfile,
    timezone: Tz,
}

impl ChatRelay {
    pub fn new(provider: Arc<dyn ChatCompletionProvider>, profile: RelayProfile, timezone: Tz) -> Self {
        Self {
            provider,
            profile,
            timezone,
        }
    }

    pub fn profile(&self) -> &RelayProfile {
        &self.profile
    }

    /// Build the upstream request for `message` as of `now`.
    pub fn build_request(&self, message: &str, now: DateTime<Utc>) -> CompletionRequest {
        let today = prompt::format_now(now, &self.timezone);
        CompletionRequest {
            messages: vec![
                Message::system(self.profile.prompt.render(&today)),
                Message::user(message),
            ],
            tools: appointment_tools(),
            model: self.profile.model.clone(),
            max_tokens: self.profile.max_tokens,
            temperature: self.profile.temperature,
            top_p: self.profile.top_p,
            frequency_penalty: self.profile.frequency_penalty,
            presence_penalty: self.profile.presence_penalty,
        }
    }

    /// Relay one message. No retry: an upstream failure is logged and returned.
    pub async fn relay(&self, message: Option<&str>) -> Result<ChatReply, AppError> {
        let message = validate_message(message)?;
        info!(
            "Relaying message via {} ({} profile): {}",
            self.provider.name(),
            self.profile.name,
            truncate_string(message, 80, "...")
        );

        let request = self.build_request(message, Utc::now());
        let response = match self.provider.chat(&request).await {
            Ok(r) => r,
            Err(e) => {
                error!("Chat completion failed: {}", e);
                return Err(e.into());
            }
        };

        if response.has_tool_calls() {
            info!(
                "Model returned tool calls: {:?}",
                summarize_tool_calls(&response.tool_calls)
            );
        }
        info!(
            "Chat completion done: finish={:?}, tokens={}",
            response.finish_reason, response.usage.total_tokens
        );

        Ok(ChatReply::from(response))
    }
}
