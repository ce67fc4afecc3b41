use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::ChatServiceConfig;
use crate::error::ProviderError;
use crate::types::{
    CompletionRequest, CompletionResponse, FinishReason, Role, TokenUsage, ToolCall,
};
use crate::util::http;

use super::ChatCompletionProvider;

/// Azure-hosted OpenAI chat completions.
/// Requests go to `{endpoint}/openai/deployments/{deployment}/chat/completions`.
pub struct AzureOpenAiProvider {
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
}

impl AzureOpenAiProvider {
    pub fn new(config: &ChatServiceConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            deployment: config.deployment.clone(),
            api_version: config.api_version.clone(),
        }
    }

    pub fn chat_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl ChatCompletionProvider for AzureOpenAiProvider {
    async fn chat(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let url = self.chat_url();
        let body = build_request_body(request);

        debug!(
            "Azure OpenAI request to deployment {} ({} messages)",
            self.deployment,
            request.messages.len()
        );

        let response = http::client()
            .post(&url)
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let data: serde_json::Value = response.json().await?;
        parse_openai_response(&data)
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}

/// Build the chat-completions JSON body for a request.
pub fn build_request_body(request: &CompletionRequest) -> serde_json::Value {
    let msgs: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| {
            json!({
                "role": m.role,
                "content": m.content,
            })
        })
        .collect();

    let mut body = json!({
        "messages": msgs,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "top_p": request.top_p,
        "frequency_penalty": request.frequency_penalty,
        "presence_penalty": request.presence_penalty,
        "stop": null,
    });

    if let Some(ref model) = request.model {
        body["model"] = json!(model);
    }

    if !request.tools.is_empty() {
        body["tools"] = json!(request.tools);
        body["tool_choice"] = json!("auto");
    }

    body
}

/// Parse an OpenAI-format response into our CompletionResponse.
pub fn parse_openai_response(data: &serde_json::Value) -> Result<CompletionResponse, ProviderError> {
    let choice = data
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

    let message = choice
        .get("message")
        .ok_or_else(|| ProviderError::Parse("No message in choice".to_string()))?;

    let content = message.get("content").and_then(|v| v.as_str()).map(|s| s.to_string());

    let role = message
        .get("role")
        .and_then(|v| v.as_str())
        .unwrap_or("assistant")
        .parse::<Role>()
        .map_err(ProviderError::Parse)?;

    let finish_reason = match choice.get("finish_reason").and_then(|v| v.as_str()) {
        Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };

    let mut tool_calls = Vec::new();
    if let Some(tcs) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tcs {
            let id = tc
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let function = tc
                .get("function")
                .ok_or_else(|| ProviderError::Parse("Tool call without function".to_string()))?;
            let name = function
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ProviderError::Parse("Tool call without name".to_string()))?;
            // Arguments are relayed untouched; some gateways send an object instead of a string.
            let arguments = match function.get("arguments") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => "{}".to_string(),
                Some(other) => other.to_string(),
            };

            tool_calls.push(ToolCall::new(id, name, arguments));
        }
    }

    let usage = if let Some(u) = data.get("usage") {
        TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        }
    } else {
        TokenUsage::default()
    };

    Ok(CompletionResponse {
        content,
        role,
        tool_calls,
        finish_reason,
        usage,
    })
}
