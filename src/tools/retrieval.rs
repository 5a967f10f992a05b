//! `search_compliance_rules`: vector search over the compliance library

use super::Tool;
use crate::models::{RetrievedDocument, ToolOutput};
use crate::retrieval::RetrievalEngine;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const NO_RULES_FOUND: &str =
    "I could not find any specific compliance rules related to this query in the database.";

pub struct SearchComplianceRulesTool {
    engine: Arc<RetrievalEngine>,
    top_k: usize,
}

impl SearchComplianceRulesTool {
    pub fn new(engine: Arc<RetrievalEngine>, top_k: usize) -> Self {
        Self { engine, top_k }
    }
}

#[async_trait::async_trait]
impl Tool for SearchComplianceRulesTool {
    fn name(&self) -> &'static str {
        "search_compliance_rules"
    }

    fn description(&self) -> &'static str {
        "Searches the official compliance database (NOMs, FCC rules, etc.) for legal text relevant to a user's question."
    }

    fn parameter(&self) -> &'static str {
        "query"
    }

    fn parameter_description(&self) -> &'static str {
        "Natural-language search query, e.g. a standard number or product requirement"
    }

    async fn invoke(&self, argument: &str) -> ToolOutput {
        info!(query = %argument, "Searching compliance database");

        match self.engine.search(argument, self.top_k).await {
            Ok(documents) if documents.is_empty() => ToolOutput::text(NO_RULES_FOUND),
            Ok(documents) => ToolOutput {
                text: format_documents(&documents),
                citations: documents.iter().map(|d| display_name(&d.source)).collect(),
            },
            Err(e) => {
                warn!(error = %e, "Compliance search failed");
                ToolOutput::text(format!(
                    "An error occurred while searching the database: {}",
                    e
                ))
            }
        }
    }
}

/// Number each passage and label it with its file name.
pub fn format_documents(documents: &[RetrievedDocument]) -> String {
    let mut out = String::from("Here are the official compliance rules found in the database:\n\n");

    for (i, doc) in documents.iter().enumerate() {
        out.push_str(&format!(
            "--- SOURCE {}: {} ---\n{}\n\n",
            i + 1,
            display_name(&doc.source),
            doc.text
        ));
    }

    out
}

/// Last path component of a stored source, handling both separator styles.
pub fn display_name(source: &str) -> String {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return "Unknown Document".to_string();
    }

    let normalized = trimmed.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string())
}
