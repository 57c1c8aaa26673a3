//! Conversational layer: per-session memory, heuristic intent
//! extraction, and the per-turn state machine that routes intents to
//! registered tools and composes a reply from the outcome.

pub mod conversation;
pub mod memory;
pub mod runtime;

pub use conversation::{Intent, IntentExtractor, ProductQuery};
pub use memory::ConversationMemory;
pub use runtime::{AgentRuntime, RuntimeOptions};
