//! Detection heuristics: pluggable collaborators that look at the user's
//! message and propose knowledge or a routine worth saving.
//!
//! Detectors return `Result`; the orchestrator folds that into a
//! [`DetectionOutcome`] and always keeps the base answer whatever the tag.

use crate::error::DetectionError;
use crate::family::{ChildProfile, KnowledgeItem, RoutineProposal};
use async_trait::async_trait;

/// Finds facts about children worth persisting.
#[async_trait]
pub trait KnowledgeDetector: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        message: &str,
        babies: &[ChildProfile],
    ) -> Result<Option<Vec<KnowledgeItem>>, DetectionError>;

    /// Whether the detected items warrant asking the user.
    fn should_confirm(&self, detected: &[KnowledgeItem]) -> bool;

    /// The question appended to the answer.
    fn confirmation_prompt(&self, detected: &[KnowledgeItem]) -> String;
}

/// Finds daily routines worth persisting.
#[async_trait]
pub trait RoutineDetector: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        message: &str,
        babies: &[ChildProfile],
    ) -> Result<Option<RoutineProposal>, DetectionError>;

    fn should_confirm(&self, detected: &RoutineProposal) -> bool;

    fn confirmation_prompt(&self, detected: &RoutineProposal) -> String;
}

/// Tagged result of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome<T> {
    /// Something was found and should be proposed to the user.
    Detected(T),
    /// Nothing worth proposing.
    NotDetected,
    /// The detector failed; the reason is logged and otherwise ignored.
    Failed(String),
}

impl<T> DetectionOutcome<T> {
    /// Fold a detector result and its confirmation gate into an outcome.
    pub fn from_result(
        result: Result<Option<T>, DetectionError>,
        should_confirm: impl FnOnce(&T) -> bool,
    ) -> Self {
        match result {
            Ok(Some(found)) if should_confirm(&found) => Self::Detected(found),
            Ok(_) => Self::NotDetected,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Detected(_))
    }
}
