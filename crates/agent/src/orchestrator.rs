//! Per-request conversation handling.
//!
//! # Flow
//!
//! 1. Reject an empty message
//! 2. If the message is a yes/no reply and a knowledge proposal is pending, resolve it and stop
//! 3. Same for a pending routine proposal
//! 4. Gather documents, family context, and history concurrently
//! 5. Assemble the prompt and call the LLM once
//! 6. Run routine detection, then knowledge detection, on the user's message;
//!    the first one that stages a proposal appends its question to the answer

use crate::confirmation::{PendingConfirmation, PendingConfirmationStore, classify_response};
use crate::context::topics::combine;
use crate::context::{
    ContextAggregator, HistoryLoader, ProfileContextBuilder, PromptAssembler, PromptLayers,
    SpecializedTopics,
};
use crate::detection::NoDetection;
use crate::request::{ChatReply, ChatRequest};
use chrono::Local;
use futures::TryFutureExt;
use lumi_config::AppConfig;
use lumi_core::detection::{DetectionOutcome, KnowledgeDetector, RoutineDetector};
use lumi_core::error::{Error, StoreError};
use lumi_core::family::{ChildProfile, KnowledgeItem, KnowledgeRecord, RoutineProposal, SavedRoutine};
use lumi_core::provider::{Provider, ProviderRequest};
use lumi_core::retrieval::SimilaritySource;
use lumi_core::store::Stores;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const KNOWLEDGE_REJECTED: &str = "👌 Entendido, no guardaré esa información.";
pub const KNOWLEDGE_SAVE_FAILED: &str =
    "❌ Hubo un error guardando la información. Por favor intenta de nuevo.";
pub const ROUTINE_REJECTED: &str = "👌 Entendido, no guardaré esa rutina.";
pub const ROUTINE_CHILD_NOT_FOUND: &str =
    "❌ No pude encontrar el bebé mencionado. Por favor intenta de nuevo.";
pub const ROUTINE_SAVE_FAILED: &str =
    "❌ Hubo un error guardando la rutina. Por favor intenta de nuevo.";

const DEFAULT_ROUTINE_NAME: &str = "Rutina";
const DEFAULT_ROUTINE_SUMMARY: &str = "Rutina establecida";

fn knowledge_saved(count: usize) -> String {
    format!(
        "✅ ¡Perfecto! He guardado {count} elemento(s) en el perfil. Ahora podré darte respuestas más personalizadas considerando esta información."
    )
}

fn routine_saved(name: &str, activities: usize) -> String {
    format!(
        "✅ ¡Excelente! He guardado la rutina **{name}** con {activities} actividades en el sistema de rutinas y también como conocimiento general. Ahora podré ayudarte mejor con horarios y sugerencias personalizadas."
    )
}

/// Append a confirmation question to an answer.
pub fn with_confirmation(answer: &str, prompt: &str) -> String {
    format!("{answer}\n\n💬 {prompt}")
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

/// The knowledge record mirrored from a saved routine.
pub fn routine_mirror_record(routine: &RoutineProposal) -> KnowledgeRecord {
    KnowledgeRecord {
        category: "rutinas".into(),
        subcategory: Some("estructura diaria".into()),
        title: non_empty_or(&routine.routine_name, DEFAULT_ROUTINE_NAME).to_string(),
        description: non_empty_or(&routine.context_summary, DEFAULT_ROUTINE_SUMMARY).to_string(),
        importance_level: 3,
    }
}

/// The top-level chat handler.
pub struct ConversationOrchestrator {
    provider: Arc<dyn Provider>,
    stores: Stores,
    aggregator: ContextAggregator,
    topics: SpecializedTopics,
    profiles: ProfileContextBuilder,
    history: HistoryLoader,
    assembler: PromptAssembler,
    knowledge_detector: Arc<dyn KnowledgeDetector>,
    routine_detector: Arc<dyn RoutineDetector>,
    knowledge_pending: PendingConfirmationStore<Vec<KnowledgeItem>>,
    routine_pending: PendingConfirmationStore<RoutineProposal>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ConversationOrchestrator {
    /// Build from configuration. Detection is off until [`with_detectors`](Self::with_detectors).
    pub fn new(
        provider: Arc<dyn Provider>,
        similarity: Arc<dyn SimilaritySource>,
        stores: Stores,
        config: &AppConfig,
    ) -> Self {
        Self {
            provider,
            aggregator: ContextAggregator::from_config(similarity, &config.retrieval),
            topics: SpecializedTopics::new(config.topics.clone()),
            profiles: ProfileContextBuilder::new(stores.clone()),
            history: HistoryLoader::new(stores.conversations.clone(), config.history.limit_per_role),
            assembler: PromptAssembler::new(config.retrieval.max_context_chars),
            knowledge_detector: Arc::new(NoDetection),
            routine_detector: Arc::new(NoDetection),
            knowledge_pending: PendingConfirmationStore::from_config("knowledge", &config.confirmation),
            routine_pending: PendingConfirmationStore::from_config("routine", &config.confirmation),
            stores,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn with_detectors(
        mut self,
        knowledge: Arc<dyn KnowledgeDetector>,
        routine: Arc<dyn RoutineDetector>,
    ) -> Self {
        self.knowledge_detector = knowledge;
        self.routine_detector = routine;
        self
    }

    /// Replace the built-in system prompt template.
    pub fn with_system_prompt(mut self, template: impl Into<String>) -> Self {
        self.assembler = self.assembler.with_system_template(template);
        self
    }

    pub fn knowledge_confirmations(&self) -> &PendingConfirmationStore<Vec<KnowledgeItem>> {
        &self.knowledge_pending
    }

    pub fn routine_confirmations(&self) -> &PendingConfirmationStore<RoutineProposal> {
        &self.routine_pending
    }

    /// Handle one chat turn for `user_id`.
    pub async fn handle(&self, user_id: &str, request: &ChatRequest) -> Result<ChatReply, Error> {
        let message = request.message.as_str();
        if message.trim().is_empty() {
            return Err(Error::InvalidRequest("message required".into()));
        }

        if let Some(accepted) = classify_response(message) {
            if let Some(pending) = self.knowledge_pending.take_pending(user_id) {
                info!(user_id, accepted, "Resolving knowledge confirmation");
                return Ok(self.resolve_knowledge(user_id, pending, accepted).await);
            }
            if let Some(pending) = self.routine_pending.take_pending(user_id) {
                info!(user_id, accepted, "Resolving routine confirmation");
                return Ok(self.resolve_routine(user_id, pending, accepted).await);
            }
        }

        let now = Local::now().naive_local();
        let topic = self.topics.select(message);
        let specialized = async {
            match topic {
                Some(topic) => {
                    info!(topic = %topic.name, "Specialized retrieval");
                    self.aggregator.aggregate(&topic.query).await
                }
                None => Ok(String::new()),
            }
        };

        let (base, specialized, family, history) = futures::try_join!(
            self.aggregator.aggregate(message).map_err(Error::from),
            specialized.map_err(Error::from),
            self.profiles.build(user_id, now.date()).map_err(Error::from),
            self.history.load(user_id).map_err(Error::from),
        )?;
        let documents = combine(&base, &specialized);

        let prompt = self.assembler.assemble(&PromptLayers {
            now,
            user_context: &family.user_context,
            request_profile: request.profile.as_ref(),
            routines: &family.routines,
            documents: &documents,
            history: &history,
            user_message: message,
        });
        debug!(
            estimated_tokens = prompt.metadata.total_tokens,
            documents_truncated = prompt.metadata.documents_truncated,
            history = history.len(),
            "Prompt assembled"
        );

        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                messages: prompt.messages,
                temperature: self.temperature,
                max_tokens: Some(self.max_tokens),
            })
            .await?;

        let answer = self
            .propose(user_id, message, &family.babies, response.message.content)
            .await;

        info!(user_id, provider = self.provider.name(), "Chat turn answered");
        Ok(ChatReply {
            answer,
            usage: response.usage,
        })
    }

    /// Stage at most one proposal from the user's message and ask about it.
    async fn propose(
        &self,
        user_id: &str,
        message: &str,
        babies: &[ChildProfile],
        answer: String,
    ) -> String {
        let routine = DetectionOutcome::from_result(
            self.routine_detector.analyze(message, babies).await,
            |r| self.routine_detector.should_confirm(r),
        );
        match routine {
            DetectionOutcome::Detected(proposal) => {
                let question = self.routine_detector.confirmation_prompt(&proposal);
                self.routine_pending.set_pending(user_id, proposal, message);
                // one open question per user
                if self.knowledge_pending.clear_pending(user_id) {
                    debug!(user_id, "Superseded pending knowledge proposal");
                }
                return with_confirmation(&answer, &question);
            }
            DetectionOutcome::Failed(reason) => {
                warn!(detector = self.routine_detector.name(), %reason, "Routine detection failed");
            }
            DetectionOutcome::NotDetected => {}
        }

        let knowledge = DetectionOutcome::from_result(
            self.knowledge_detector.analyze(message, babies).await,
            |items| self.knowledge_detector.should_confirm(items),
        );
        match knowledge {
            DetectionOutcome::Detected(items) => {
                let question = self.knowledge_detector.confirmation_prompt(&items);
                self.knowledge_pending.set_pending(user_id, items, message);
                if self.routine_pending.clear_pending(user_id) {
                    debug!(user_id, "Superseded pending routine proposal");
                }
                with_confirmation(&answer, &question)
            }
            DetectionOutcome::Failed(reason) => {
                warn!(detector = self.knowledge_detector.name(), %reason, "Knowledge detection failed");
                answer
            }
            DetectionOutcome::NotDetected => answer,
        }
    }

    async fn resolve_knowledge(
        &self,
        user_id: &str,
        pending: PendingConfirmation<Vec<KnowledgeItem>>,
        accepted: bool,
    ) -> ChatReply {
        if !accepted {
            return ChatReply::local(KNOWLEDGE_REJECTED);
        }
        match self.persist_knowledge(user_id, &pending.payload).await {
            Ok(saved) => {
                info!(user_id, saved, proposed = pending.payload.len(), "Knowledge saved");
                ChatReply::local(knowledge_saved(saved))
            }
            Err(e) => {
                error!(user_id, error = %e, "Saving confirmed knowledge failed");
                ChatReply::local(KNOWLEDGE_SAVE_FAILED)
            }
        }
    }

    /// Save each item whose child resolves; returns how many were saved.
    async fn persist_knowledge(
        &self,
        user_id: &str,
        items: &[KnowledgeItem],
    ) -> Result<usize, StoreError> {
        let mut saved = 0;
        for item in items {
            let baby_id = self
                .stores
                .profiles
                .find_baby_by_name(user_id, &item.baby_name)
                .await?;
            match baby_id {
                Some(baby_id) => {
                    self.stores
                        .knowledge
                        .save_knowledge(user_id, &baby_id, item.record())
                        .await?;
                    saved += 1;
                }
                None => warn!(baby = %item.baby_name, "Child not found, knowledge item skipped"),
            }
        }
        Ok(saved)
    }

    async fn resolve_routine(
        &self,
        user_id: &str,
        pending: PendingConfirmation<RoutineProposal>,
        accepted: bool,
    ) -> ChatReply {
        if !accepted {
            return ChatReply::local(ROUTINE_REJECTED);
        }
        let routine = &pending.payload;
        match self.persist_routine(user_id, routine).await {
            Ok(Some(saved)) => {
                info!(user_id, routine_id = %saved.routine_id, "Routine saved");
                ChatReply::local(routine_saved(
                    non_empty_or(&routine.routine_name, DEFAULT_ROUTINE_NAME),
                    saved.activities_count,
                ))
            }
            Ok(None) => {
                warn!(user_id, baby = %routine.baby_name, "Child not found, routine discarded");
                ChatReply::local(ROUTINE_CHILD_NOT_FOUND)
            }
            Err(e) => {
                error!(user_id, error = %e, "Saving confirmed routine failed");
                ChatReply::local(ROUTINE_SAVE_FAILED)
            }
        }
    }

    /// Save the routine, then mirror it as knowledge. A failed mirror is
    /// logged and does not undo the routine.
    async fn persist_routine(
        &self,
        user_id: &str,
        routine: &RoutineProposal,
    ) -> Result<Option<SavedRoutine>, StoreError> {
        let Some(baby_id) = self
            .stores
            .profiles
            .find_baby_by_name(user_id, &routine.baby_name)
            .await?
        else {
            return Ok(None);
        };

        let saved = self
            .stores
            .routines
            .save_routine(user_id, &baby_id, routine)
            .await?;

        if let Err(e) = self
            .stores
            .knowledge
            .save_knowledge(user_id, &baby_id, routine_mirror_record(routine))
            .await
        {
            warn!(user_id, error = %e, "Routine saved but knowledge mirror failed");
        }
        Ok(Some(saved))
    }
}
