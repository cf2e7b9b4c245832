//! Conversation engine of the family calendar assistant.
//!
//! One inbound chat message flows through [`runtime::AgentRuntime`]:
//! 1. **Dedup**: the message id is recorded before any side effect.
//! 2. **Pending answer**: an open question is answered by keyword
//!    classification of the raw text (`classifier`), without the model.
//! 3. **Intent extraction** (`conversation`): the model is forced into a
//!    single `parse_calendar_intent` tool call whose input is validated.
//! 4. **Clarification guard** (`guardrails`) and **resolution** (`resolver`)
//!    against the calendar gateway, including conflict checks.
//! 5. **Reply** (`replies`) and state persistence.
//!
//! The model only translates text into an intent. Dates, conflicts and
//! every calendar write are decided deterministically here.

pub mod anthropic;
pub mod classifier;
pub mod commands;
pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod replies;
pub mod resolver;
pub mod runtime;
pub mod tools;

pub use anthropic::AnthropicClient;
pub use conversation::{IntentExtractionError, IntentExtractor};
pub use llm::{LlmClient, LlmError, ScriptedLlmClient};
pub use resolver::{IntentResolver, Resolution};
pub use runtime::{AgentRuntime, AgentSettings, MessageOutcome};
