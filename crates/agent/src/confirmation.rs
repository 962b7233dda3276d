//! Propose-then-confirm workflow state.
//!
//! A [`PendingConfirmationStore`] holds at most one proposal per user.
//! A new proposal overwrites the previous one. A yes/no reply consumes it
//! through [`PendingConfirmationStore::take_pending`], which reads and clears
//! the slot under one lock so a reply is never applied twice.
//!
//! Proposals older than the configured TTL are treated as absent and
//! dropped on access.

use chrono::{DateTime, Duration, Utc};
use lumi_config::ConfirmationConfig;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// A staged proposal awaiting a yes/no answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation<T> {
    pub user_id: String,
    pub payload: T,
    /// The user message that triggered the proposal.
    pub originating_message: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user single-slot store of proposals of one kind.
pub struct PendingConfirmationStore<T> {
    kind: &'static str,
    slots: Mutex<HashMap<String, PendingConfirmation<T>>>,
    ttl: Option<Duration>,
}

impl<T: Clone> PendingConfirmationStore<T> {
    /// A store whose proposals expire after 30 minutes.
    pub fn new(kind: &'static str) -> Self {
        Self::from_config(kind, &ConfirmationConfig::default())
    }

    pub fn from_config(kind: &'static str, config: &ConfirmationConfig) -> Self {
        let ttl = match config.ttl_minutes {
            0 => None,
            minutes => i64::try_from(minutes).ok().and_then(Duration::try_minutes),
        };
        Self {
            kind,
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Override the expiry. `None` keeps proposals until answered.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Stage a proposal, replacing any existing one for this user.
    pub fn set_pending(&self, user_id: &str, payload: T, originating_message: &str) {
        self.set_pending_at(user_id, payload, originating_message, Utc::now());
    }

    /// Stage a proposal with an explicit creation time.
    pub fn set_pending_at(
        &self,
        user_id: &str,
        payload: T,
        originating_message: &str,
        created_at: DateTime<Utc>,
    ) {
        let mut slots = self.lock();
        let replaced = slots
            .insert(
                user_id.to_string(),
                PendingConfirmation {
                    user_id: user_id.to_string(),
                    payload,
                    originating_message: originating_message.to_string(),
                    created_at,
                },
            )
            .is_some();
        debug!(kind = self.kind, user_id, replaced, "Confirmation staged");
    }

    pub fn has_pending(&self, user_id: &str) -> bool {
        self.get_pending(user_id).is_some()
    }

    /// A copy of the live proposal, if any.
    pub fn get_pending(&self, user_id: &str) -> Option<PendingConfirmation<T>> {
        let mut slots = self.lock();
        self.live_entry(&mut slots, user_id).cloned()
    }

    /// Drop the proposal. Returns whether one was live.
    pub fn clear_pending(&self, user_id: &str) -> bool {
        self.take_pending(user_id).is_some()
    }

    /// Remove and return the live proposal in one step.
    pub fn take_pending(&self, user_id: &str) -> Option<PendingConfirmation<T>> {
        let mut slots = self.lock();
        self.live_entry(&mut slots, user_id)?;
        slots.remove(user_id)
    }

    /// Number of live proposals.
    pub fn len(&self) -> usize {
        let mut slots = self.lock();
        let now = Utc::now();
        slots.retain(|_, entry| !self.is_expired(entry, now));
        slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingConfirmation<T>>> {
        // slots hold plain data, so a poisoned map is still consistent
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live_entry<'a>(
        &self,
        slots: &'a mut HashMap<String, PendingConfirmation<T>>,
        user_id: &str,
    ) -> Option<&'a PendingConfirmation<T>> {
        let expired = slots
            .get(user_id)
            .is_some_and(|entry| self.is_expired(entry, Utc::now()));
        if expired {
            slots.remove(user_id);
            debug!(kind = self.kind, user_id, "Expired confirmation dropped");
            return None;
        }
        slots.get(user_id)
    }

    fn is_expired(&self, entry: &PendingConfirmation<T>, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| now - entry.created_at > ttl)
    }
}

// ── Reply classification ──────────────────────────────────────────────────

/// Replies longer than this are ordinary chat, not an answer.
const MAX_REPLY_WORDS: usize = 6;

const AFFIRMATIVE: &[&str] = &[
    "si", "yes", "yep", "yeah", "dale", "ok", "okay", "vale", "claro", "correcto", "afirmativo",
    "guardalo", "guardala", "sim", "perfecto", "exacto", "acuerdo", "bueno", "supuesto", "sure",
];

const NEGATIVE: &[&str] = &["no", "nunca", "nope", "nah", "nao", "jamas", "negativo"];

/// Words allowed around a yes/no without changing its meaning.
const FILLER: &[&str] = &[
    "gracias", "por", "favor", "porfa", "de", "please", "thanks", "thank", "you", "mejor", "lo",
    "la", "guardes", "obrigado", "obrigada", "que",
];

/// Classify a free-text reply as yes (`Some(true)`), no (`Some(false)`),
/// or not an answer at all (`None`).
///
/// Only short replies made entirely of yes-words (or entirely of
/// no-words), optionally padded with courtesy words, count as answers.
pub fn classify_response(text: &str) -> Option<bool> {
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() || words.len() > MAX_REPLY_WORDS {
        return None;
    }

    let affirmative = words.iter().filter(|w| AFFIRMATIVE.contains(*w)).count();
    let negative = words.iter().filter(|w| NEGATIVE.contains(*w)).count();
    let filler = words.iter().filter(|w| FILLER.contains(*w)).count();

    if affirmative + negative + filler != words.len() {
        return None;
    }
    match (affirmative > 0, negative > 0) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// Lowercase, fold accents, and turn punctuation into spaces.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' | 'ü' => 'u',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect()
}
