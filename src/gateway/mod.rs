//! Model gateway trait and implementations
//!
//! One call: conversation + tool definitions in, either a final answer or an
//! ordered list of tool calls out. Transport and backend faults are returned
//! as errors; the orchestrator treats them as fatal for the request.

use crate::error::ComplianceError;
use crate::models::{Conversation, ToolCallRequest, ToolDefinition};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiGateway;

/// What the model decided to do this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTurn {
    FinalText(String),
    ToolCalls(Vec<ToolCallRequest>),
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn>;
}

/// Replays a fixed script of turns. When the script runs out, the
/// fallback turn (if any) repeats forever; otherwise calls fail.
///
/// Used by tests and for running the service without a model backend.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<ModelTurn>>>,
    fallback: Option<ModelTurn>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<ModelTurn>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every call with the same turn.
    pub fn repeating(turn: ModelTurn) -> Self {
        Self {
            fallback: Some(turn),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(
        &self,
        _conversation: &Conversation,
        _tools: &[ToolDefinition],
    ) -> Result<ModelTurn> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(next) = self.script.lock().await.pop_front() {
            return next;
        }

        self.fallback
            .clone()
            .ok_or_else(|| ComplianceError::Gateway("script exhausted".to_string()))
    }
}
