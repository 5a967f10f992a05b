//! Gemini API gateway
//!
//! Maps a [`Conversation`] onto `generateContent` with native function calling.
//! Uses a long-lived reqwest::Client for connection pooling. The API key
//! travels in a header so it never shows up in URLs or error strings.

use super::{ModelGateway, ModelTurn};
use crate::error::ComplianceError;
use crate::models::{ContentBlock, Conversation, Message, Role, ToolCallRequest, ToolDefinition};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiGateway {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiGateway {
    pub fn new(api_key: String, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!(
                "{}/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
        })
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn> {
        if self.api_key.is_empty() {
            return Err(ComplianceError::Gateway(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let request = build_request(conversation, tools);

        debug!(
            messages = conversation.len(),
            tools = tools.len(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e.to_string());
                ComplianceError::Gateway(format!("Gemini API request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response: {}", error_text);
            return Err(ComplianceError::Gateway(format!(
                "Gemini API returned {}",
                status
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            ComplianceError::Gateway(format!("Gemini parse error: {}", e))
        })?;

        let turn = parse_turn(gemini_response, tools)?;

        match &turn {
            ModelTurn::FinalText(text) => info!(chars = text.len(), "Gemini returned final answer"),
            ModelTurn::ToolCalls(calls) => info!(calls = calls.len(), "Gemini requested tool calls"),
        }

        Ok(turn)
    }
}

//
// ================= Request mapping =================
//

fn build_request(conversation: &Conversation, tools: &[ToolDefinition]) -> GeminiRequest {
    let mut contents: Vec<Content> = Vec::new();

    for message in conversation.messages().iter().skip(1) {
        let role = match message.role {
            Role::Assistant => "model",
            Role::System | Role::User | Role::ToolResult => "user",
        };
        let parts = message_parts(message, tools);
        if parts.is_empty() {
            continue;
        }

        // All responses to one model turn travel together in a single content.
        let merge = message.role == Role::ToolResult
            && contents.last().map_or(false, |c| {
                c.role == "user" && c.parts.iter().all(|p| p.function_response.is_some())
            });

        if merge {
            if let Some(last) = contents.last_mut() {
                last.parts.extend(parts);
            }
        } else {
            contents.push(Content {
                role: role.to_string(),
                parts,
            });
        }
    }

    let declarations: Vec<FunctionDeclaration> = tools
        .iter()
        .map(|tool| FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    tool.parameter.clone(): {
                        "type": "STRING",
                        "description": tool.parameter_description,
                    }
                },
                "required": [tool.parameter],
            }),
        })
        .collect();

    let (tools_field, tool_config) = if declarations.is_empty() {
        (None, None)
    } else {
        (
            Some(vec![ToolGroup {
                function_declarations: declarations,
            }]),
            Some(json!({ "functionCallingConfig": { "mode": "AUTO" } })),
        )
    };

    GeminiRequest {
        contents,
        system_instruction: SystemInstruction {
            parts: vec![Part::text(conversation.system_instruction())],
        },
        tools: tools_field,
        tool_config,
        generation_config: GenerationConfig {
            temperature: 0.0,
            top_p: 0.9,
            max_output_tokens: 2048,
        },
    }
}

fn message_parts(message: &Message, tools: &[ToolDefinition]) -> Vec<Part> {
    match message.role {
        Role::ToolResult => {
            let name = message.tool_name.clone().unwrap_or_default();
            vec![Part {
                function_response: Some(FunctionResponse {
                    id: message.tool_call_id.clone(),
                    name: name.clone(),
                    response: json!({ "name": name, "content": message.text() }),
                }),
                ..Part::default()
            }]
        }
        Role::Assistant if !message.tool_calls.is_empty() => message
            .tool_calls
            .iter()
            .map(|call| Part {
                function_call: Some(FunctionCall {
                    id: Some(call.call_id.clone()),
                    name: call.tool_name.clone(),
                    args: Some(json!({ parameter_for(tools, &call.tool_name): call.argument })),
                }),
                ..Part::default()
            })
            .collect(),
        _ => message
            .blocks
            .iter()
            .map(|block| block_part(message.role, block))
            .collect(),
    }
}

fn block_part(role: Role, block: &ContentBlock) -> Part {
    match block {
        ContentBlock::Text { text } if role == Role::User => {
            Part::text(format!("User Question: {}", text))
        }
        ContentBlock::Text { text } => Part::text(text.clone()),
        ContentBlock::Image { mime_type, .. } => match block.image_payload() {
            Some((mime, data)) => Part {
                inline_data: Some(InlineData {
                    mime_type: mime.to_string(),
                    data: data.to_string(),
                }),
                ..Part::default()
            },
            None => Part::text(format!("[Attached image of type {} could not be read]", mime_type)),
        },
        ContentBlock::Document { text, source_name } => Part::text(format!(
            "\n[Attached PDF Datasheet Name: {}]\n{}",
            source_name, text
        )),
    }
}

fn parameter_for(tools: &[ToolDefinition], tool_name: &str) -> String {
    tools
        .iter()
        .find(|t| t.name == tool_name)
        .map(|t| t.parameter.clone())
        .unwrap_or_else(|| "query".to_string())
}

//
// ================= Response mapping =================
//

fn parse_turn(response: GeminiResponse, tools: &[ToolDefinition]) -> Result<ModelTurn> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ComplianceError::Gateway("No response from Gemini API".to_string()))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let calls: Vec<ToolCallRequest> = parts
        .iter()
        .filter_map(|p| p.function_call.as_ref())
        .map(|call| ToolCallRequest {
            call_id: call
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
            tool_name: call.name.clone(),
            argument: extract_argument(call.args.as_ref(), &parameter_for(tools, &call.name)),
        })
        .collect();

    if !calls.is_empty() {
        return Ok(ModelTurn::ToolCalls(calls));
    }

    let text: String = parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(ComplianceError::Gateway(format!(
            "Empty response from Gemini (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(ModelTurn::FinalText(text))
}

/// The declared parameter if present, otherwise the first string argument.
fn extract_argument(args: Option<&Value>, parameter: &str) -> String {
    let Some(args) = args else {
        return String::new();
    };

    let value = args
        .get(parameter)
        .or_else(|| args.as_object().and_then(|o| o.values().find(|v| v.is_string())));

    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None if args.is_null() => String::new(),
        None => args.to_string(),
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolGroup {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}
