//! Family domain records: caregiver profiles, children, structured
//! knowledge about each child, routines, and stored conversation turns.
//!
//! Optional fields are explicit `Option`s. Renderers show a missing value
//! as [`NOT_AVAILABLE`] rather than dropping the field.

use crate::message::Role;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Marker rendered in place of a missing optional field.
pub const NOT_AVAILABLE: &str = "N/A";

/// Render an optional value, falling back to [`NOT_AVAILABLE`].
pub fn or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// The caregiver's own profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub feeding: Option<String>,
}

/// A child registered by the caregiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildProfile {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub birthdate: NaiveDate,
    #[serde(default)]
    pub feeding_mode: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub height_cm: Option<f64>,
}

/// Fields persisted for one piece of structured knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default = "default_importance")]
    pub importance_level: u8,
}

fn default_importance() -> u8 {
    1
}

/// A detected fact about a child, awaiting confirmation.
///
/// `baby_name` is resolved to a child id only when the fact is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default = "default_importance")]
    pub importance_level: u8,
    pub baby_name: String,
}

impl KnowledgeItem {
    /// The persistable part of this item.
    pub fn record(&self) -> KnowledgeRecord {
        KnowledgeRecord {
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            importance_level: self.importance_level,
        }
    }
}

/// A knowledge row as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredKnowledge {
    pub id: String,
    pub baby_id: String,
    #[serde(flatten)]
    pub record: KnowledgeRecord,
    pub created_at: DateTime<Utc>,
}

/// One step of a routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineActivity {
    /// Clock time, `HH:MM`.
    pub time: String,
    pub activity: String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// A detected routine, awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineProposal {
    pub baby_name: String,
    pub routine_name: String,
    pub context_summary: String,
    #[serde(default)]
    pub activities: Vec<RoutineActivity>,
}

/// A routine as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRoutine {
    pub id: String,
    pub baby_id: String,
    pub routine_name: String,
    pub context_summary: String,
    pub activities: Vec<RoutineActivity>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of persisting a routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRoutine {
    pub routine_id: String,
    pub activities_count: usize,
}

/// One stored chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
