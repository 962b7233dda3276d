//! Prompt assembly.
//!
//! Builds the ordered message list sent to the LLM from five system
//! layers, the conversation history, and the current user message:
//!
//! | # | Layer | Header |
//! |---|-------|--------|
//! | 1 | System template | (template, `{today}` substituted) |
//! | 2 | Family context | `INFORMACIÓN ESPECÍFICA DEL USUARIO:` |
//! | 3 | Request profile | `PERFIL ENVIADO EN ESTA CONSULTA:` |
//! | 4 | Routines | `CONTEXTO DE RUTINAS:` |
//! | 5 | Document knowledge | `CONOCIMIENTO ESPECIALIZADO DE EXPERTOS - USAR OBLIGATORIAMENTE:` |
//!
//! Empty layers still render their header, so layer positions are fixed.
//!
//! # Determinism
//!
//! Identical inputs always produce identical message contents. The
//! current time is an input, never read here.

use crate::context::token;
use crate::request::RequestProfile;
use chrono::NaiveDateTime;
use lumi_core::message::Message;
use serde::{Deserialize, Serialize};

/// Built-in system prompt template.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = include_str!("../../prompts/system.md");

/// Instructions appended after the document knowledge.
pub const DEFAULT_KNOWLEDGE_GUIDANCE: &str = include_str!("../../prompts/knowledge_guidance.md");

/// Placeholder in the system template replaced by the current date and time.
pub const TODAY_PLACEHOLDER: &str = "{today}";

pub const USER_CONTEXT_HEADER: &str = "INFORMACIÓN ESPECÍFICA DEL USUARIO:";
pub const REQUEST_PROFILE_HEADER: &str = "PERFIL ENVIADO EN ESTA CONSULTA:";
pub const ROUTINES_HEADER: &str = "CONTEXTO DE RUTINAS:";
pub const KNOWLEDGE_HEADER: &str = "CONOCIMIENTO ESPECIALIZADO DE EXPERTOS - USAR OBLIGATORIAMENTE:";

/// All inputs for a single LLM call.
pub struct PromptLayers<'a> {
    pub now: NaiveDateTime,
    pub user_context: &'a str,
    pub request_profile: Option<&'a RequestProfile>,
    pub routines: &'a str,
    /// Combined document text (base plus specialized).
    pub documents: &'a str,
    /// Oldest first.
    pub history: &'a [Message],
    pub user_message: &'a str,
}

/// Size of one rendered layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
}

/// Metadata about an assembled prompt, used for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub total_tokens: usize,
    pub per_layer: Vec<LayerStats>,
    /// Whether the document layer hit `max_context_chars`.
    pub documents_truncated: bool,
}

/// The assembled prompt.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub messages: Vec<Message>,
    pub metadata: AssemblyMetadata,
}

/// Stateless prompt builder. Create one and reuse it.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_template: String,
    knowledge_guidance: String,
    max_context_chars: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(24_000)
    }
}

impl PromptAssembler {
    pub fn new(max_context_chars: usize) -> Self {
        Self {
            system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
            knowledge_guidance: DEFAULT_KNOWLEDGE_GUIDANCE.trim().to_string(),
            max_context_chars,
        }
    }

    /// Replace the built-in system template. `{today}` is still substituted.
    pub fn with_system_template(mut self, template: impl Into<String>) -> Self {
        self.system_template = template.into();
        self
    }

    pub fn with_knowledge_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.knowledge_guidance = guidance.into();
        self
    }

    /// Build the message list: five system layers, history, user message.
    pub fn assemble(&self, layers: &PromptLayers<'_>) -> AssembledPrompt {
        let today = layers.now.format("%d/%m/%Y %H:%M").to_string();
        let system = self.system_template.replace(TODAY_PLACEHOLDER, &today);

        let profile_text = layers
            .request_profile
            .map(RequestProfile::render)
            .unwrap_or_default();

        let (documents, documents_truncated) =
            token::truncate_chars(layers.documents, self.max_context_chars);

        let system_layers = [
            ("system", system),
            (
                "user_context",
                format!("{USER_CONTEXT_HEADER}\n{}", layers.user_context),
            ),
            (
                "request_profile",
                format!("{REQUEST_PROFILE_HEADER}\n{profile_text}"),
            ),
            ("routines", format!("{ROUTINES_HEADER}\n{}", layers.routines)),
            (
                "documents",
                format!(
                    "{KNOWLEDGE_HEADER}\n\n{documents}\n\n{}",
                    self.knowledge_guidance
                ),
            ),
        ];

        let mut per_layer = Vec::with_capacity(system_layers.len() + 2);
        let mut messages = Vec::with_capacity(system_layers.len() + layers.history.len() + 1);

        for (name, content) in system_layers {
            let message = Message::system(content);
            per_layer.push(LayerStats {
                name: name.into(),
                tokens: token::estimate_message_tokens(&message),
            });
            messages.push(message);
        }

        per_layer.push(LayerStats {
            name: "history".into(),
            tokens: token::estimate_messages_tokens(layers.history),
        });
        messages.extend(layers.history.iter().cloned());

        let user = Message::user(layers.user_message);
        per_layer.push(LayerStats {
            name: "user_message".into(),
            tokens: token::estimate_message_tokens(&user),
        });
        messages.push(user);

        AssembledPrompt {
            messages,
            metadata: AssemblyMetadata {
                total_tokens: per_layer.iter().map(|l| l.tokens).sum(),
                per_layer,
                documents_truncated,
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
