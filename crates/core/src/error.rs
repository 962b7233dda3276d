//! Error types for the Lumi domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Lumi operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Client errors ---
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // --- Provider (LLM) errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Datastore errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Similarity search errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is the caller's fault (maps to a 400-class response).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }

    /// Whether this error came from the upstream LLM (maps to a 502-class response).
    pub fn is_upstream_error(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Upstream HTTP status, when the provider answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// The body (or description) to surface to the caller.
    pub fn upstream_body(&self) -> String {
        match self {
            Self::ApiError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Similarity search failed: {0}")]
    SearchFailed(String),

    #[error("Source filtering not supported by {0}")]
    FilterUnsupported(String),
}

#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    #[error("Detection failed in {detector}: {reason}")]
    Failed { detector: String, reason: String },
}
