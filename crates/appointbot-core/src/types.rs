use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Function name and JSON-encoded arguments chosen by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A tool call request from the model, kept in the upstream wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_tool_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: default_tool_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn tool(&self) -> AppointmentTool {
        AppointmentTool::from_name(&self.function.name)
    }

    /// Decode the arguments string into the appointment argument set.
    pub fn appointment_arguments(&self) -> Result<AppointmentArguments, serde_json::Error> {
        serde_json::from_str(&self.function.arguments)
    }
}

/// The tools declared to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentTool {
    Create,
    Delete,
    Unknown(String),
}

impl AppointmentTool {
    pub const CREATE: &'static str = "create_appointment";
    pub const DELETE: &'static str = "delete_appointment";

    pub fn from_name(name: &str) -> Self {
        match name {
            Self::CREATE => AppointmentTool::Create,
            Self::DELETE => AppointmentTool::Delete,
            other => AppointmentTool::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AppointmentTool::Create => Self::CREATE,
            AppointmentTool::Delete => Self::DELETE,
            AppointmentTool::Unknown(name) => name,
        }
    }
}

/// Arguments collected for `create_appointment` / `delete_appointment`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_message: Option<String>,
}

/// Inbound chat payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

/// Request to a chat-completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<serde_json::Value>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

/// Response from a chat-completion provider (first choice only).
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub role: Role,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

impl CompletionResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reply relayed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub content: Option<String>,
    pub role: Role,
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl From<CompletionResponse> for ChatReply {
    fn from(resp: CompletionResponse) -> Self {
        let tool_calls = if resp.tool_calls.is_empty() {
            None
        } else {
            Some(resp.tool_calls)
        };
        Self {
            content: resp.content,
            role: resp.role,
            tool_calls,
        }
    }
}

/// Body of a successful chat response: `{"response": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatEnvelope {
    pub response: ChatReply,
}

/// Summary of tool calls for log lines: tool name -> start argument.
pub fn summarize_tool_calls(calls: &[ToolCall]) -> HashMap<String, Option<String>> {
    calls
        .iter()
        .map(|tc| {
            let start = tc.appointment_arguments().ok().and_then(|a| a.start);
            (tc.tool().name().to_string(), start)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_and_parse() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("narrator".parse::<Role>().is_err());
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_tool_call_wire_shape() {
        let tc = ToolCall::new(
            "call_1",
            "create_appointment",
            r#"{"start":"2025-03-06T10:00:00","patientMessage":"Bring results"}"#,
        );
        let json = serde_json::to_value(&tc).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "create_appointment");
        assert!(json["function"]["arguments"].is_string());
    }

    #[test]
    fn test_appointment_arguments() {
        let tc = ToolCall::new(
            "call_1",
            "create_appointment",
            r#"{"start":"2025-03-06T10:00:00","patientMessage":"Bring results"}"#,
        );
        assert_eq!(tc.tool(), AppointmentTool::Create);
        let args = tc.appointment_arguments().unwrap();
        assert_eq!(args.start.as_deref(), Some("2025-03-06T10:00:00"));
        assert_eq!(args.patient_message.as_deref(), Some("Bring results"));

        let del = ToolCall::new("call_2", "delete_appointment", "{}");
        assert_eq!(del.tool(), AppointmentTool::Delete);
        assert_eq!(del.appointment_arguments().unwrap(), AppointmentArguments::default());
    }

    #[test]
    fn test_unknown_tool() {
        let tool = AppointmentTool::from_name("reschedule");
        assert_eq!(tool, AppointmentTool::Unknown("reschedule".into()));
        assert_eq!(tool.name(), "reschedule");
    }

    #[test]
    fn test_chat_reply_without_tool_calls_serializes_null() {
        let reply = ChatReply::from(CompletionResponse {
            content: Some("What time suits you?".into()),
            role: Role::Assistant,
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: TokenUsage::default(),
        });
        let json = serde_json::to_value(ChatEnvelope { response: reply }).unwrap();
        assert_eq!(json["response"]["content"], "What time suits you?");
        assert_eq!(json["response"]["role"], "assistant");
        assert!(json["response"]["tool_calls"].is_null());
    }

    #[test]
    fn test_chat_request_missing_message() {
        let req: ChatRequest = serde_json::from_str("{}").unwrap();
        assert!(req.message.is_none());
    }

    #[test]
    fn test_summarize_tool_calls() {
        let calls = vec![ToolCall::new(
            "1",
            "delete_appointment",
            r#"{"start":"2025-03-07T09:00:00"}"#,
        )];
        let summary = summarize_tool_calls(&calls);
        assert_eq!(
            summary.get("delete_appointment"),
            Some(&Some("2025-03-07T09:00:00".to_string()))
        );
    }

    #[test]
    fn test_summarize_keys_on_declared_tool_name() {
        let calls = vec![
            ToolCall::new("1", AppointmentTool::CREATE, r#"{"start":"2025-03-06T10:00:00"}"#),
            ToolCall::new("2", "reschedule", "not json"),
        ];
        let summary = summarize_tool_calls(&calls);
        assert_eq!(summary.len(), 2);
        assert_eq!(
            summary.get(AppointmentTool::CREATE),
            Some(&Some("2025-03-06T10:00:00".to_string()))
        );
        assert_eq!(summary.get("reschedule"), Some(&None));
    }
}
