//! Financial Research Agent
//!
//! Answers free-form financial questions (often in Turkish) with a bounded
//! reason / act / reflect loop:
//! - an LLM reasons and requests tool calls
//! - tools fetch live market data, news and web results
//! - an entity resolver maps colloquial names to ticker symbols
//! - a reviewer approves the draft report or sends it back for revision
//!
//! LOOP:
//! REASONING → EXECUTING_TOOLS → REASONING → ... → REFLECTING → DONE

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod normalizer;
pub mod reflection;
pub mod report;
pub mod resolver;
pub mod state;
pub mod tools;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use models::*;
