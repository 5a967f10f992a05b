//! Compliance Agent
//!
//! A product-compliance Q&A agent that:
//! - Accepts a question with an optional image or PDF datasheet
//! - Lets the model decide when to search the compliance library or read a live page
//! - Answers from retrieved rule text and cites the documents it used
//! - Bounds every request by model-call, fan-out and timeout limits
//!
//! LOOP:
//! INPUT → NORMALIZE → MODEL → (TOOLS → MODEL)* → ANSWER | ABORT

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod normalizer;
pub mod retrieval;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use agent::Orchestrator;
pub use config::Settings;
pub use models::*;
