//! HTTP API gateway for Lumi.
//!
//! Routes:
//! - `POST /api/chat` (bearer token required)
//! - `GET /api` service banner
//! - `GET /health`
//!
//! Built on Axum. The chat route resolves the caller through an
//! [`IdentityResolver`] and hands the turn to the
//! [`ConversationOrchestrator`].

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::{get, post},
};
use lumi_agent::{ConversationOrchestrator, KeywordKnowledgeDetector, KeywordRoutineDetector};
use lumi_config::{AppConfig, GatewayConfig};
use lumi_core::identity::{IdentityResolver, StaticTokenResolver, bearer_token};
use lumi_core::store::Stores;
use lumi_providers::OpenAiCompatProvider;
use lumi_store::SqliteStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::api::{ApiError, detail};

/// Shared application state for the gateway.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            orchestrator,
            identity,
        }
    }
}

/// The authenticated user id, inserted by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CallerId(pub String);

/// Build the router with all gateway routes and layers.
///
/// Layers applied:
/// - Bearer token authentication on `/api/chat`
/// - Request body size limit
/// - Per-caller rate limiting (disabled when the limit is 0)
/// - Permissive CORS
/// - HTTP trace logging
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    let chat = Router::new()
        .route("/api/chat", post(api::chat_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    let mut router = Router::new()
        .route("/api", get(api::banner_handler))
        .route("/health", get(health_handler))
        .merge(chat)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes));

    if config.rate_limit_per_minute > 0 {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_per_minute as usize,
            std::time::Duration::from_secs(60),
        ));
        router = router.layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire the SQLite store, the LLM provider, and the detectors, then serve.
///
/// Fails before binding when the configuration is unusable for serving.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate_for_serving()?;

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let store = Arc::new(SqliteStore::new(&config.store.path).await?);
    let provider = Arc::new(OpenAiCompatProvider::from_config(&config)?);

    let mut orchestrator = ConversationOrchestrator::new(
        provider,
        store.clone(),
        Stores::from_backend(store),
        &config,
    )
    .with_detectors(
        Arc::new(KeywordKnowledgeDetector::new()?),
        Arc::new(KeywordRoutineDetector::new()?),
    );
    if let Some(path) = &config.system_prompt_path {
        let template = std::fs::read_to_string(path)?;
        info!(path = %path.display(), "Using custom system prompt");
        orchestrator = orchestrator.with_system_prompt(template);
    }

    let identity = StaticTokenResolver::new(config.auth.tokens.clone());
    if identity.is_empty() {
        warn!("No bearer tokens configured; every /api/chat request will be rejected");
    }

    let state = AppState::new(Arc::new(orchestrator), Arc::new(identity));
    let app = build_router(state, &config.gateway);

    info!(addr = %addr, model = %config.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key.
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: std::time::Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: std::time::Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the client is within its limit.
    fn check(&self, client_key: &str) -> bool {
        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Keys on the Authorization header, falling back to "anonymous".
/// `/health` is exempt.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, ApiError> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let client_key = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if !limiter.check(&client_key) {
        warn!(client = client_label(&client_key), "Rate limit exceeded");
        return Err(detail(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"));
    }

    Ok(next.run(req).await)
}

/// A loggable description of a rate-limit key; never includes the credential.
fn client_label(client_key: &str) -> &'static str {
    if client_key == "anonymous" {
        "anonymous"
    } else if bearer_token(client_key).is_some() {
        "bearer"
    } else {
        "other"
    }
}

/// Resolve `Authorization: Bearer <token>` to a user id.
///
/// Rejects with 401 when the header is missing or the token is unknown.
async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, ApiError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string);

    let Some(token) = token else {
        warn!("Chat request without bearer token");
        return Err(detail(StatusCode::UNAUTHORIZED, "not authenticated"));
    };

    match state.identity.resolve(&token).await {
        Some(user_id) => {
            req.extensions_mut().insert(CallerId(user_id));
            Ok(next.run(req).await)
        }
        None => {
            warn!("Chat request with unknown bearer token");
            Err(detail(StatusCode::UNAUTHORIZED, "invalid token"))
        }
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
