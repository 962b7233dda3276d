//! Specialized-topic query rewriting.
//!
//! Some subjects are poorly served by the user's literal wording. When a
//! message mentions one of a topic's keywords, a second retrieval runs
//! with the topic's expanded query and its text is appended to the base
//! document context.

use lumi_config::TopicConfig;

/// Header placed between base and specialized document text.
pub const SPECIALIZED_HEADER: &str = "--- CONTEXTO ESPECIALIZADO ---";

/// Ordered list of topics; the first whose keywords match wins.
#[derive(Debug, Clone, Default)]
pub struct SpecializedTopics {
    topics: Vec<TopicConfig>,
}

impl SpecializedTopics {
    pub fn new(topics: Vec<TopicConfig>) -> Self {
        let topics = topics
            .into_iter()
            .map(|mut t| {
                t.keywords = t.keywords.iter().map(|k| k.to_lowercase()).collect();
                t
            })
            .collect();
        Self { topics }
    }

    /// The first topic with a keyword contained in the lowercased message.
    pub fn select(&self, message: &str) -> Option<&TopicConfig> {
        let lowered = message.to_lowercase();
        self.topics
            .iter()
            .find(|t| t.keywords.iter().any(|k| lowered.contains(k.as_str())))
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Append specialized text to the base context when there is any.
pub fn combine(base: &str, specialized: &str) -> String {
    if specialized.is_empty() {
        base.to_string()
    } else {
        format!("{base}\n\n{SPECIALIZED_HEADER}\n{specialized}")
    }
}
