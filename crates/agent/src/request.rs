//! Chat request and reply shapes shared by the orchestrator and the gateway.

use lumi_core::family::or_na;
use lumi_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Profile data sent along with a single request. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestProfile {
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub feeding: Option<String>,
}

impl RequestProfile {
    /// The text injected into the prompt for this profile.
    pub fn render(&self) -> String {
        format!(
            "Perfil actual:\n- Fecha de nacimiento: {}\n- Alimentación: {}\n",
            or_na(self.dob.as_deref()),
            or_na(self.feeding.as_deref()),
        )
    }
}

/// One chat turn from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub profile: Option<RequestProfile>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: RequestProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// The answer returned to the caller.
///
/// `usage` is absent for confirmation replies, which never reach the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub usage: Option<Usage>,
}

impl ChatReply {
    pub fn local(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            usage: None,
        }
    }
}
