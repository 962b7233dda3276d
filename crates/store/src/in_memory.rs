//! In-memory backends: useful for testing and demos.

use crate::text::search_terms;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumi_core::error::{RetrievalError, StoreError};
use lumi_core::family::{
    ChildProfile, ConversationTurn, KnowledgeRecord, ParentProfile, RoutineProposal, SavedRoutine,
    StoredKnowledge, StoredRoutine,
};
use lumi_core::message::Role;
use lumi_core::retrieval::{DocumentChunk, SearchFilter, SimilaritySource};
use lumi_core::store::{ConversationStore, KnowledgeStore, ProfileStore, RoutineStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    profiles: Vec<(String, ParentProfile)>,
    babies: Vec<ChildProfile>,
    turns: Vec<(String, ConversationTurn)>,
    knowledge: Vec<(String, StoredKnowledge)>,
    routines: Vec<(String, StoredRoutine)>,
}

/// Datastore held in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, user_id: &str, profile: ParentProfile) {
        self.tables
            .write()
            .await
            .profiles
            .push((user_id.to_string(), profile));
    }

    pub async fn insert_baby(&self, baby: ChildProfile) {
        self.tables.write().await.babies.push(baby);
    }

    /// Append a stored conversation turn.
    pub async fn push_turn(
        &self,
        user_id: &str,
        role: Role,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) {
        self.tables.write().await.turns.push((
            user_id.to_string(),
            ConversationTurn {
                role,
                content: content.into(),
                created_at,
            },
        ));
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn profiles_for_user(&self, user_id: &str) -> Result<Vec<ParentProfile>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn babies_for_user(&self, user_id: &str) -> Result<Vec<ChildProfile>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .babies
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_baby_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<String>, StoreError> {
        let wanted = name.trim().to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .babies
            .iter()
            .find(|b| b.user_id == user_id && b.name.trim().to_lowercase() == wanted)
            .map(|b| b.id.clone()))
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn recent_turns(
        &self,
        user_id: &str,
        role: Role,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let tables = self.tables.read().await;
        // Reverse first so equal timestamps keep "last inserted is newest".
        let mut turns: Vec<ConversationTurn> = tables
            .turns
            .iter()
            .rev()
            .filter(|(owner, t)| owner == user_id && t.role == role)
            .map(|(_, t)| t.clone())
            .collect();
        turns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        turns.truncate(limit);
        Ok(turns)
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn knowledge_for_user(&self, user_id: &str) -> Result<Vec<StoredKnowledge>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .knowledge
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn save_knowledge(
        &self,
        user_id: &str,
        baby_id: &str,
        record: KnowledgeRecord,
    ) -> Result<StoredKnowledge, StoreError> {
        let stored = StoredKnowledge {
            id: Uuid::new_v4().to_string(),
            baby_id: baby_id.to_string(),
            record,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .knowledge
            .push((user_id.to_string(), stored.clone()));
        Ok(stored)
    }
}

#[async_trait]
impl RoutineStore for InMemoryStore {
    async fn routines_for_user(&self, user_id: &str) -> Result<Vec<StoredRoutine>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .routines
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn save_routine(
        &self,
        user_id: &str,
        baby_id: &str,
        routine: &RoutineProposal,
    ) -> Result<SavedRoutine, StoreError> {
        let stored = StoredRoutine {
            id: Uuid::new_v4().to_string(),
            baby_id: baby_id.to_string(),
            routine_name: routine.routine_name.clone(),
            context_summary: routine.context_summary.clone(),
            activities: routine.activities.clone(),
            created_at: Utc::now(),
        };
        let saved = SavedRoutine {
            routine_id: stored.id.clone(),
            activities_count: stored.activities.len(),
        };
        self.tables
            .write()
            .await
            .routines
            .push((user_id.to_string(), stored));
        Ok(saved)
    }
}

/// Keyword-overlap similarity over an in-memory chunk list.
///
/// A chunk's score is the number of distinct query terms it contains;
/// chunks with no overlap are never returned.
pub struct InMemorySimilaritySource {
    chunks: RwLock<Vec<DocumentChunk>>,
    report_scores: bool,
}

impl InMemorySimilaritySource {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            report_scores: true,
        }
    }

    /// Return chunks without relevance scores.
    pub fn without_scores(mut self) -> Self {
        self.report_scores = false;
        self
    }

    pub async fn add(&self, source_id: &str, text: &str) {
        self.chunks
            .write()
            .await
            .push(DocumentChunk::new(text, source_id));
    }
}

impl Default for InMemorySimilaritySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimilaritySource for InMemorySimilaritySource {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        let terms = search_terms(query);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;
        let mut scored: Vec<(usize, &DocumentChunk)> = chunks
            .iter()
            .filter(|c| match filter.and_then(|f| f.source_id.as_deref()) {
                Some(source) => c.source_id == source,
                None => true,
            })
            .map(|c| {
                let text = c.text.to_lowercase();
                (terms.iter().filter(|t| text.contains(t.as_str())).count(), c)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(hits, c)| {
                let chunk = DocumentChunk::new(c.text.clone(), c.source_id.clone());
                if self.report_scores {
                    chunk.with_score(hits as f32)
                } else {
                    chunk
                }
            })
            .collect())
    }
}
