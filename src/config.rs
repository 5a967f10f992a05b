//! Runtime settings
//!
//! Read once at startup from the process environment (after `.env` is loaded
//! by the binary). `from_lookup` is the pure core so tests never touch the
//! real environment.

use crate::error::ComplianceError;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub embedding_model: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub index_table: String,
    pub index_path: PathBuf,
    pub retrieval_top_k: usize,
    pub retrieval_min_score: Option<f32>,
    pub limits: LoopLimits,
    pub model_timeout: Duration,
}

/// Bounds on one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_iterations: usize,
    pub max_tool_calls_per_turn: usize,
    pub tool_timeout: Duration,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            max_tool_calls_per_turn: 8,
            tool_timeout: Duration::from_secs(20),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let limits = LoopLimits {
            max_iterations: parse_or(&get, "MAX_ITERATIONS", 6)?,
            max_tool_calls_per_turn: parse_or(&get, "MAX_TOOL_CALLS_PER_TURN", 8)?,
            tool_timeout: Duration::from_secs(parse_or(&get, "TOOL_TIMEOUT_SECS", 20)?),
        };

        if limits.max_iterations == 0 {
            return Err(ComplianceError::Config(
                "MAX_ITERATIONS must be at least 1".to_string(),
            ));
        }

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                ComplianceError::Config(format!("PORT is not a valid port: {}", raw))
            })?,
            None => 8080,
        };

        let retrieval_min_score = get("RETRIEVAL_MIN_SCORE")
            .map(|raw| {
                raw.trim().parse::<f32>().map_err(|_| {
                    ComplianceError::Config(format!("RETRIEVAL_MIN_SCORE is not a number: {}", raw))
                })
            })
            .transpose()?;

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            embedding_model: get("GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            port,
            database_url: get("DATABASE_URL"),
            index_table: get("COMPLIANCE_INDEX_TABLE")
                .unwrap_or_else(|| "compliance_chunks".to_string()),
            index_path: get("COMPLIANCE_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/compliance_index.json")),
            retrieval_top_k: parse_or(&get, "RETRIEVAL_TOP_K", 3)?,
            retrieval_min_score,
            limits,
            model_timeout: Duration::from_secs(parse_or(&get, "MODEL_TIMEOUT_SECS", 60)?),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ComplianceError::Config(format!("{} has an invalid value: {}", key, raw))
        }),
        None => Ok(default),
    }
}
