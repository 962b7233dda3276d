//! Shared test doubles for the agent crate.

use async_trait::async_trait;
use lumi_core::detection::{KnowledgeDetector, RoutineDetector};
use lumi_core::error::{DetectionError, ProviderError, RetrievalError, StoreError};
use lumi_core::family::{
    ChildProfile, ConversationTurn, KnowledgeItem, KnowledgeRecord, ParentProfile,
    RoutineProposal, SavedRoutine, StoredKnowledge, StoredRoutine,
};
use lumi_core::message::{Message, Role};
use lumi_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use lumi_core::retrieval::{DocumentChunk, SearchFilter, SimilaritySource};
use lumi_core::store::{ConversationStore, KnowledgeStore, ProfileStore, RoutineStore, Stores};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ── Provider ──────────────────────────────────────────────────────────────

/// A provider that always gives the same answer (or error) and records requests.
pub struct ScriptedProvider {
    reply: Result<String, ProviderError>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn answering(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status_code: u16, body: &str) -> Self {
        Self {
            reply: Err(ProviderError::ApiError {
                status_code,
                message: body.to_string(),
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let text = self.reply.clone()?;
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(test_usage()),
            model,
        })
    }
}

pub fn test_usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

// ── Similarity ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub query: String,
    pub k: usize,
    pub filter: Option<String>,
}

/// A similarity source with fixed answers for the broad and per-source searches.
pub struct ScriptedSimilaritySource {
    broad: Vec<DocumentChunk>,
    per_source: HashMap<String, Vec<DocumentChunk>>,
    filtering: bool,
    fail: bool,
    calls: Mutex<Vec<SearchCall>>,
}

impl ScriptedSimilaritySource {
    pub fn new(broad: Vec<DocumentChunk>) -> Self {
        Self {
            broad,
            per_source: HashMap::new(),
            filtering: true,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every search fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_source(mut self, source_id: &str, chunks: Vec<DocumentChunk>) -> Self {
        self.per_source.insert(source_id.to_string(), chunks);
        self
    }

    /// Filtered searches report that filtering is unsupported.
    pub fn without_filtering(mut self) -> Self {
        self.filtering = false;
        self
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SimilaritySource for ScriptedSimilaritySource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        let source_id = filter.and_then(|f| f.source_id.clone());
        self.calls.lock().unwrap().push(SearchCall {
            query: query.to_string(),
            k,
            filter: source_id.clone(),
        });

        if self.fail {
            return Err(RetrievalError::SearchFailed("scripted failure".into()));
        }
        match source_id {
            None => Ok(self.broad.iter().take(k).cloned().collect()),
            Some(_) if !self.filtering => Err(RetrievalError::FilterUnsupported("scripted".into())),
            Some(id) => Ok(self
                .per_source
                .get(&id)
                .map(|chunks| chunks.iter().take(k).cloned().collect())
                .unwrap_or_default()),
        }
    }
}

// ── Stores ────────────────────────────────────────────────────────────────

fn broken() -> StoreError {
    StoreError::QueryFailed("datastore unavailable".into())
}

/// Every datastore call fails.
pub struct FailingStore;

#[async_trait]
impl ProfileStore for FailingStore {
    async fn profiles_for_user(&self, _user_id: &str) -> Result<Vec<ParentProfile>, StoreError> {
        Err(broken())
    }

    async fn babies_for_user(&self, _user_id: &str) -> Result<Vec<ChildProfile>, StoreError> {
        Err(broken())
    }

    async fn find_baby_by_name(
        &self,
        _user_id: &str,
        _name: &str,
    ) -> Result<Option<String>, StoreError> {
        Err(broken())
    }
}

#[async_trait]
impl ConversationStore for FailingStore {
    async fn recent_turns(
        &self,
        _user_id: &str,
        _role: Role,
        _limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        Err(broken())
    }
}

#[async_trait]
impl KnowledgeStore for FailingStore {
    async fn knowledge_for_user(&self, _user_id: &str) -> Result<Vec<StoredKnowledge>, StoreError> {
        Err(broken())
    }

    async fn save_knowledge(
        &self,
        _user_id: &str,
        _baby_id: &str,
        _record: KnowledgeRecord,
    ) -> Result<StoredKnowledge, StoreError> {
        Err(broken())
    }
}

#[async_trait]
impl RoutineStore for FailingStore {
    async fn routines_for_user(&self, _user_id: &str) -> Result<Vec<StoredRoutine>, StoreError> {
        Err(broken())
    }

    async fn save_routine(
        &self,
        _user_id: &str,
        _baby_id: &str,
        _routine: &RoutineProposal,
    ) -> Result<SavedRoutine, StoreError> {
        Err(broken())
    }
}

pub fn failing_stores() -> Stores {
    Stores::from_backend(Arc::new(FailingStore))
}

/// Reads from `inner`, but every knowledge write fails.
pub struct ReadOnlyKnowledge<K> {
    pub inner: Arc<K>,
}

#[async_trait]
impl<K: KnowledgeStore + 'static> KnowledgeStore for ReadOnlyKnowledge<K> {
    async fn knowledge_for_user(&self, user_id: &str) -> Result<Vec<StoredKnowledge>, StoreError> {
        self.inner.knowledge_for_user(user_id).await
    }

    async fn save_knowledge(
        &self,
        _user_id: &str,
        _baby_id: &str,
        _record: KnowledgeRecord,
    ) -> Result<StoredKnowledge, StoreError> {
        Err(StoreError::Storage("knowledge table is read-only".into()))
    }
}

// ── Detectors ─────────────────────────────────────────────────────────────

/// A detector whose analysis always errors.
pub struct FailingDetector;

fn detector_failure() -> DetectionError {
    DetectionError::Failed {
        detector: "failing".into(),
        reason: "analysis crashed".into(),
    }
}

#[async_trait]
impl KnowledgeDetector for FailingDetector {
    fn name(&self) -> &str {
        "failing"
    }

    async fn analyze(
        &self,
        _message: &str,
        _babies: &[ChildProfile],
    ) -> Result<Option<Vec<KnowledgeItem>>, DetectionError> {
        Err(detector_failure())
    }

    fn should_confirm(&self, _detected: &[KnowledgeItem]) -> bool {
        true
    }

    fn confirmation_prompt(&self, _detected: &[KnowledgeItem]) -> String {
        "unreachable".into()
    }
}

#[async_trait]
impl RoutineDetector for FailingDetector {
    fn name(&self) -> &str {
        "failing"
    }

    async fn analyze(
        &self,
        _message: &str,
        _babies: &[ChildProfile],
    ) -> Result<Option<RoutineProposal>, DetectionError> {
        Err(detector_failure())
    }

    fn should_confirm(&self, _detected: &RoutineProposal) -> bool {
        true
    }

    fn confirmation_prompt(&self, _detected: &RoutineProposal) -> String {
        "unreachable".into()
    }
}
