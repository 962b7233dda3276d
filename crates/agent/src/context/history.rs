//! Recent conversation history.
//!
//! The most recent `limit_per_role` user turns and the most recent
//! `limit_per_role` assistant turns are fetched separately, then merged
//! into one oldest-first sequence. The two roles are not interleaved by
//! count, so a chatty user never crowds out the assistant's replies.

use lumi_core::error::StoreError;
use lumi_core::family::ConversationTurn;
use lumi_core::message::{Message, Role};
use lumi_core::store::ConversationStore;
use std::sync::Arc;

pub struct HistoryLoader {
    store: Arc<dyn ConversationStore>,
    limit_per_role: usize,
}

impl HistoryLoader {
    pub fn new(store: Arc<dyn ConversationStore>, limit_per_role: usize) -> Self {
        Self {
            store,
            limit_per_role,
        }
    }

    /// Up to `2 * limit_per_role` messages, ascending by creation time.
    pub async fn load(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let (mut user, assistant) = futures::try_join!(
            self.store
                .recent_turns(user_id, Role::User, self.limit_per_role),
            self.store
                .recent_turns(user_id, Role::Assistant, self.limit_per_role),
        )?;

        user.extend(assistant);
        Ok(merge(user))
    }
}

fn merge(mut turns: Vec<ConversationTurn>) -> Vec<Message> {
    // stable: equal timestamps keep user turns ahead of assistant turns
    turns.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    turns
        .into_iter()
        .map(|turn| {
            let mut message = Message::new(turn.role, turn.content);
            message.timestamp = turn.created_at;
            message
        })
        .collect()
}
