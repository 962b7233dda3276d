//! Datastore traits. The relational store is an external collaborator.
//!
//! Each trait covers one group of tables. Implementations: SQLite and
//! in-memory (for testing), both in `lumi-store`.

use crate::error::StoreError;
use crate::family::{
    ChildProfile, ConversationTurn, KnowledgeRecord, ParentProfile, RoutineProposal, SavedRoutine,
    StoredKnowledge, StoredRoutine,
};
use crate::message::Role;
use async_trait::async_trait;
use std::sync::Arc;

/// `profiles` and `babies` tables.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Caregiver profile rows for a user.
    async fn profiles_for_user(&self, user_id: &str) -> Result<Vec<ParentProfile>, StoreError>;

    /// Children registered by a user, in insertion order.
    async fn babies_for_user(&self, user_id: &str) -> Result<Vec<ChildProfile>, StoreError>;

    /// Resolve a child's name (case-insensitive, trimmed) to its id.
    async fn find_baby_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<String>, StoreError>;
}

/// `conversations` table.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The `limit` most recent turns with the given role, newest first.
    async fn recent_turns(
        &self,
        user_id: &str,
        role: Role,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError>;
}

/// Structured per-child knowledge.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// All knowledge for all of the user's children.
    async fn knowledge_for_user(&self, user_id: &str) -> Result<Vec<StoredKnowledge>, StoreError>;

    /// Persist one record for a child.
    async fn save_knowledge(
        &self,
        user_id: &str,
        baby_id: &str,
        record: KnowledgeRecord,
    ) -> Result<StoredKnowledge, StoreError>;
}

/// Routines and their activities.
#[async_trait]
pub trait RoutineStore: Send + Sync {
    /// All routines for all of the user's children.
    async fn routines_for_user(&self, user_id: &str) -> Result<Vec<StoredRoutine>, StoreError>;

    /// Persist a routine and its activities for a child.
    async fn save_routine(
        &self,
        user_id: &str,
        baby_id: &str,
        routine: &RoutineProposal,
    ) -> Result<SavedRoutine, StoreError>;
}

/// The set of datastore services the orchestrator depends on.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub routines: Arc<dyn RoutineStore>,
}

impl Stores {
    /// Use one backend for every table group.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ProfileStore + ConversationStore + KnowledgeStore + RoutineStore + 'static,
    {
        Self {
            profiles: backend.clone(),
            conversations: backend.clone(),
            knowledge: backend.clone(),
            routines: backend,
        }
    }
}
