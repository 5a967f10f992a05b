//! Core data models for the compliance agent

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-visible reply whenever a run aborts.
pub const APOLOGY: &str =
    "I apologize, but I encountered an internal error while trying to process your request.";

//
// ================= Content =================
//

/// One typed piece of a message. Order within a message is significant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        mime_type: String,
        /// `data:<mime>;base64,<payload>`
        data_uri: String,
    },
    Document {
        text: String,
        source_name: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Encode raw image bytes as a base64 data URI block.
    pub fn image(mime_type: &str, bytes: &[u8]) -> Self {
        ContentBlock::Image {
            mime_type: mime_type.to_string(),
            data_uri: format!("data:{};base64,{}", mime_type, BASE64.encode(bytes)),
        }
    }

    /// Split an image block's data URI into `(mime_type, base64_payload)`.
    pub fn image_payload(&self) -> Option<(&str, &str)> {
        let ContentBlock::Image { data_uri, .. } = self else {
            return None;
        };

        let rest = data_uri.strip_prefix("data:")?;
        let (mime, payload) = rest.split_once(";base64,")?;
        Some((mime, payload))
    }
}

//
// ================= Messages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub argument: String,
}

/// The textual answer to one [`ToolCallRequest`]. Failures are encoded in `text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Calls requested by an assistant turn; empty for every other role.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_blocks(Role::System, vec![ContentBlock::text(text)])
    }

    pub fn user(blocks: Vec<ContentBlock>) -> Self {
        Self::with_blocks(Role::User, blocks)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_blocks(Role::Assistant, vec![ContentBlock::text(text)])
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::with_blocks(Role::Assistant, Vec::new())
        }
    }

    pub fn tool_result(result: ToolCallResult) -> Self {
        Self {
            tool_call_id: Some(result.call_id),
            tool_name: Some(result.tool_name),
            ..Self::with_blocks(Role::ToolResult, vec![ContentBlock::text(result.text)])
        }
    }

    fn with_blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            blocks,
            tool_call_id: None,
            tool_name: None,
            tool_calls: Vec::new(),
        }
    }

    /// Concatenated text of all `Text` blocks.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Append-only transcript of one request. Always opens with exactly one system message.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_instruction)],
        }
    }

    /// Append a message. A second system message is demoted to user content.
    pub fn push(&mut self, mut message: Message) {
        if message.role == Role::System {
            message.role = Role::User;
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_instruction(&self) -> String {
        self.messages[0].text()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

//
// ================= Tools =================
//

/// Schema a tool exposes to the model: one named string argument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameter: String,
    pub parameter_description: String,
}

/// What a tool hands back: text for the model, plus any sources it drew on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub citations: Vec<String>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
        }
    }
}

//
// ================= Retrieval =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub text: String,
    pub source: String,
    pub score: f32,
}

//
// ================= Outcome =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    ModelUnavailable { detail: String },
    IterationLimit { limit: usize },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ModelUnavailable { .. } => write!(f, "model unavailable"),
            AbortReason::IterationLimit { limit } => {
                write!(f, "tool-call loop did not converge after {} model calls", limit)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrchestrationOutcome {
    Answer { text: String, citations: Vec<String> },
    Failed { reason: AbortReason },
}

impl OrchestrationOutcome {
    /// Render for the caller; aborts never expose internal detail.
    pub fn into_reply(self) -> ChatReply {
        match self {
            OrchestrationOutcome::Answer { text, citations } => ChatReply {
                reply: text,
                sources: citations,
            },
            OrchestrationOutcome::Failed { .. } => ChatReply {
                reply: APOLOGY.to_string(),
                sources: Vec::new(),
            },
        }
    }
}

//
// ================= Request / Reply =================
//

#[derive(Debug, Clone)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

/// Authenticated, already-parsed inbound request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub attachment: Option<Attachment>,
}

impl ChatRequest {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachment: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
    pub sources: Vec<String>,
}
