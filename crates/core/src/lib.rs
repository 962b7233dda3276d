//! # Lumi Core
//!
//! Domain types, traits, and error definitions for the Lumi parenting
//! assistant. Everything external (the LLM, the similarity engine, the
//! relational store, the detection heuristics, caller identity) is a
//! trait here; implementations live in their own crates.
//!
//! All other crates depend inward on this one.

pub mod detection;
pub mod error;
pub mod family;
pub mod identity;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use detection::{DetectionOutcome, KnowledgeDetector, RoutineDetector};
pub use error::{DetectionError, Error, ProviderError, Result, RetrievalError, StoreError};
pub use family::{
    ChildProfile, ConversationTurn, KnowledgeItem, KnowledgeRecord, ParentProfile,
    RoutineActivity, RoutineProposal, SavedRoutine, StoredKnowledge, StoredRoutine,
};
pub use identity::{IdentityResolver, StaticTokenResolver};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use retrieval::{DocumentChunk, SearchFilter, SimilaritySource};
pub use store::{ConversationStore, KnowledgeStore, ProfileStore, RoutineStore, Stores};
