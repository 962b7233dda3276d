//! The Lumi conversation pipeline.
//!
//! Each chat turn either resolves a pending yes/no confirmation without
//! calling the LLM, or runs the full path:
//!
//! 1. **Gather** reference documents (two-pass retrieval plus an optional
//!    specialized topic), the family profile, and recent history
//! 2. **Assemble** the layered prompt
//! 3. **Call** the LLM once
//! 4. **Detect** a routine or knowledge worth saving in the user's message
//!    and, if found, ask the user to confirm it on the next turn

pub mod confirmation;
pub mod context;
pub mod detection;
pub mod orchestrator;
pub mod request;

pub use confirmation::{PendingConfirmation, PendingConfirmationStore, classify_response};
pub use context::{
    AssembledPrompt, ContextAggregator, DevelopmentalStage, HistoryLoader, ProfileContext,
    ProfileContextBuilder, PromptAssembler, PromptLayers, SpecializedTopics,
};
pub use detection::{KeywordKnowledgeDetector, KeywordRoutineDetector, NoDetection};
pub use orchestrator::ConversationOrchestrator;
pub use request::{ChatReply, ChatRequest, RequestProfile};

#[cfg(test)]
pub(crate) mod test_helpers;
