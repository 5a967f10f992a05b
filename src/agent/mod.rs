//! Orchestrator - the bounded tool-calling loop
//!
//! ASSEMBLE → MODEL TURN → (DISPATCH TOOLS → MODEL TURN)* → ANSWER | ABORT
//!
//! Every tool call the model requests is answered, in request order, before
//! the next model call. The number of model calls per request is capped.

use crate::config::{LoopLimits, Settings};
use crate::gateway::{GeminiGateway, ModelGateway, ModelTurn};
use crate::models::{
    AbortReason, ChatReply, ChatRequest, Conversation, Message, OrchestrationOutcome,
    ToolCallRequest, ToolCallResult,
};
use crate::normalizer::ContentNormalizer;
use crate::retrieval::{GeminiEmbedder, InMemoryIndex, PgVectorIndex, RetrievalEngine, VectorIndex};
use crate::tools::{create_default_registry, ToolRegistry};
use crate::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod prompt;
pub use prompt::SYSTEM_INSTRUCTION;

/// Result of one run, with the transcript kept for inspection.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub request_id: Uuid,
    pub outcome: OrchestrationOutcome,
    pub conversation: Conversation,
    pub model_calls: usize,
}

/// Coordinates the model gateway and the tool registry for one request at a time.
/// Holds only shared, read-only collaborators, so one instance serves all requests.
pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<ToolRegistry>,
    normalizer: ContentNormalizer,
    limits: LoopLimits,
    system_instruction: String,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, tools: Arc<ToolRegistry>, limits: LoopLimits) -> Self {
        Self {
            gateway,
            tools,
            normalizer: ContentNormalizer::new(),
            limits,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        }
    }

    /// Wire the production stack: Gemini gateway, Gemini embeddings, and
    /// a pgvector index when `DATABASE_URL` is set, else the JSON export.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let gateway = GeminiGateway::new(
            settings.gemini_api_key.clone(),
            &settings.gemini_base_url,
            &settings.gemini_model,
            settings.model_timeout,
        )?;

        let embedder = GeminiEmbedder::new(
            settings.gemini_api_key.clone(),
            &settings.gemini_base_url,
            &settings.embedding_model,
        )?;

        let index: Arc<dyn VectorIndex> = match &settings.database_url {
            Some(url) => Arc::new(PgVectorIndex::connect(url, &settings.index_table).await?),
            None => Arc::new(InMemoryIndex::open_or_empty(&settings.index_path)?),
        };

        let engine = RetrievalEngine::new(Arc::new(embedder), index)
            .with_min_score(settings.retrieval_min_score);
        let registry = create_default_registry(Arc::new(engine), settings.retrieval_top_k)?;

        info!(tools = ?registry.list(), "Tool registry ready");

        Ok(Self::new(Arc::new(gateway), Arc::new(registry), settings.limits))
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    /// Run and render for the caller.
    pub async fn answer(&self, request: ChatRequest) -> ChatReply {
        self.run(request).await.outcome.into_reply()
    }

    /// Run the bounded loop for one request.
    pub async fn run(&self, request: ChatRequest) -> RunReport {
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        info!(
            request_id = %request_id,
            has_attachment = request.attachment.is_some(),
            "Orchestrator: starting request"
        );

        // === ASSEMBLE ===
        let mut conversation = self
            .normalizer
            .assemble(&self.system_instruction, &request)
            .await;
        let definitions = self.tools.definitions();
        let mut citations: Vec<String> = Vec::new();
        let mut model_calls = 0;

        let outcome = loop {
            if model_calls >= self.limits.max_iterations {
                warn!(
                    request_id = %request_id,
                    limit = self.limits.max_iterations,
                    "Tool-call loop did not converge"
                );
                break OrchestrationOutcome::Failed {
                    reason: AbortReason::IterationLimit {
                        limit: self.limits.max_iterations,
                    },
                };
            }

            // === MODEL TURN ===
            model_calls += 1;
            debug!(request_id = %request_id, iteration = model_calls, "Calling model");

            let turn = match self.gateway.complete(&conversation, &definitions).await {
                Ok(turn) => turn,
                Err(e) => {
                    error!(
                        request_id = %request_id,
                        iteration = model_calls,
                        error = %e,
                        "Model gateway failed"
                    );
                    break OrchestrationOutcome::Failed {
                        reason: AbortReason::ModelUnavailable {
                            detail: e.to_string(),
                        },
                    };
                }
            };

            match turn {
                ModelTurn::FinalText(text) => {
                    conversation.push(Message::assistant(text.clone()));
                    break OrchestrationOutcome::Answer {
                        text,
                        citations: citations.clone(),
                    };
                }
                ModelTurn::ToolCalls(calls) => {
                    conversation.push(Message::assistant_tool_calls(calls.clone()));

                    // No model call left to consume results.
                    if model_calls >= self.limits.max_iterations {
                        continue;
                    }

                    // === DISPATCH ===
                    // One citation per retrieved passage, in retrieval order.
                    for (result, sources) in self.dispatch_all(request_id, &calls).await {
                        citations.extend(sources);
                        conversation.push(Message::tool_result(result));
                    }
                }
            }
        };

        let label = match &outcome {
            OrchestrationOutcome::Answer { .. } => "answer".to_string(),
            OrchestrationOutcome::Failed { reason } => reason.to_string(),
        };
        info!(
            request_id = %request_id,
            model_calls,
            elapsed_ms = start.elapsed().as_millis() as u64,
            outcome = %label,
            "Orchestrator: request finished"
        );

        RunReport {
            request_id,
            outcome,
            conversation,
            model_calls,
        }
    }

    /// Run one turn's calls concurrently; results come back in request order.
    /// Calls beyond the per-turn limit are answered without being executed.
    async fn dispatch_all(
        &self,
        request_id: Uuid,
        calls: &[ToolCallRequest],
    ) -> Vec<(ToolCallResult, Vec<String>)> {
        let limit = self.limits.max_tool_calls_per_turn;
        if calls.len() > limit {
            warn!(
                request_id = %request_id,
                requested = calls.len(),
                limit,
                "Model requested more tool calls than allowed in one turn"
            );
        }

        let executed = join_all(
            calls
                .iter()
                .take(limit)
                .map(|call| self.tools.dispatch(call, self.limits.tool_timeout)),
        )
        .await;

        let skipped = calls.iter().skip(limit).map(|call| {
            (
                ToolCallResult {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    text: format!(
                        "Not executed: at most {} tool calls are allowed per turn. Request fewer calls.",
                        limit
                    ),
                },
                Vec::new(),
            )
        });

        executed.into_iter().chain(skipped).collect()
    }
}
