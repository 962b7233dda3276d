//! End-to-end tests for the Lumi chat pipeline.
//!
//! These drive the HTTP router with real stores, the real orchestrator,
//! and the keyword detectors. The LLM is either scripted or a throwaway
//! upstream server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::Router;
use chrono::NaiveDate;
use http_body_util::BodyExt;
use lumi_agent::{ConversationOrchestrator, KeywordKnowledgeDetector, KeywordRoutineDetector};
use lumi_config::AppConfig;
use lumi_core::error::ProviderError;
use lumi_core::family::{ChildProfile, ParentProfile};
use lumi_core::identity::StaticTokenResolver;
use lumi_core::message::{Message, Role};
use lumi_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use lumi_core::store::{KnowledgeStore, RoutineStore, Stores};
use lumi_gateway::{AppState, build_router};
use lumi_providers::OpenAiCompatProvider;
use lumi_store::{InMemorySimilaritySource, InMemoryStore};
use serde_json::{Value, json};
use tower::ServiceExt;

const TOKEN: &str = "tok-maria";
const USER: &str = "user-maria";

// ── Mock Provider ────────────────────────────────────────────────────────

/// Answers every request with the same text and records what it was sent.
struct ScriptedProvider {
    answer: String,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn text(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            message: Message::assistant(&self.answer),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

async fn family_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_profile(
            USER,
            ParentProfile {
                id: "p-1".into(),
                name: Some("María".into()),
                birthdate: Some("1990-03-02".into()),
                feeding: None,
            },
        )
        .await;
    store
        .insert_baby(ChildProfile {
            id: "b-leo".into(),
            user_id: USER.into(),
            name: "Leo".into(),
            birthdate: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            feeding_mode: Some("lactancia materna".into()),
            weight_kg: Some(9.1),
            height_cm: None,
        })
        .await;
    store
}

async fn documents() -> Arc<InMemorySimilaritySource> {
    let docs = Arc::new(InMemorySimilaritySource::new());
    docs.add(
        "sueno_infantil",
        "La siesta de la tarde no debería terminar después de las 17:00.",
    )
    .await;
    docs.add(
        "alimentacion",
        "La alimentación complementaria comienza alrededor de los seis meses.",
    )
    .await;
    docs
}

fn app(provider: Arc<dyn Provider>, store: Arc<InMemoryStore>, docs: Arc<InMemorySimilaritySource>) -> Router {
    let config = AppConfig::default();
    let orchestrator =
        ConversationOrchestrator::new(provider, docs, Stores::from_backend(store), &config)
            .with_detectors(
                Arc::new(KeywordKnowledgeDetector::new().unwrap()),
                Arc::new(KeywordRoutineDetector::new().unwrap()),
            );
    let identity = StaticTokenResolver::default().with_token(TOKEN, USER);
    build_router(
        AppState::new(Arc::new(orchestrator), Arc::new(identity)),
        &config.gateway,
    )
}

async fn chat(app: &Router, message: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {TOKEN}"))
        .body(Body::from(json!({ "message": message }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ── Plain chat ───────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_message_returns_raw_llm_answer() {
    let provider = Arc::new(ScriptedProvider::text("Prueba acortar la siesta de la tarde."));
    let app = app(provider.clone(), family_store().await, documents().await);

    let (status, body) = chat(&app, "¿Por qué Leo no quiere dormir la siesta?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Prueba acortar la siesta de la tarde.");
    assert_eq!(body["usage"]["total_tokens"], 15);
    assert_eq!(provider.calls(), 1);

    let request = provider.last_request();
    assert_eq!(request.model, "gpt-4o");
    assert_eq!(request.max_tokens, Some(1200));

    let last = request.messages.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "¿Por qué Leo no quiere dormir la siesta?");

    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(system.len(), 5);
    assert!(system.iter().any(|s| s.contains("Leo")));
    assert!(system.iter().any(|s| s.contains("17:00")));
}

#[tokio::test]
async fn ordinary_message_has_no_suffix_and_no_writes() {
    let provider = Arc::new(ScriptedProvider::text("Acompáñala hasta que se duerma."));
    let store = family_store().await;
    let app = app(provider.clone(), store.clone(), documents().await);

    let (status, body) = chat(&app, "Mi hija Ana no quiere dormir sola").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Acompáñala hasta que se duerma.");
    assert!(store.knowledge_for_user(USER).await.unwrap().is_empty());
    assert!(store.routines_for_user(USER).await.unwrap().is_empty());
}

// ── Knowledge proposals ──────────────────────────────────────────────────

#[tokio::test]
async fn confirmed_knowledge_is_saved_without_llm_call() {
    let provider = Arc::new(ScriptedProvider::text("Evita el huevo y consulta al pediatra."));
    let store = family_store().await;
    let app = app(provider.clone(), store.clone(), documents().await);

    let (status, body) = chat(&app, "Leo es alérgico al huevo").await;
    assert_eq!(status, StatusCode::OK);
    let answer = body["answer"].as_str().unwrap();
    assert!(answer.starts_with("Evita el huevo y consulta al pediatra.\n\n💬 "));
    assert!(answer.contains("Leo"));
    assert_eq!(provider.calls(), 1);
    assert!(store.knowledge_for_user(USER).await.unwrap().is_empty());

    let (status, body) = chat(&app, "sí").await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["answer"]
            .as_str()
            .unwrap()
            .starts_with("✅ ¡Perfecto! He guardado 1 elemento(s)")
    );
    assert_eq!(body["usage"], json!({}));
    assert_eq!(provider.calls(), 1, "confirmation must not reach the LLM");

    let saved = store.knowledge_for_user(USER).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].baby_id, "b-leo");
    assert_eq!(saved[0].record.title, "Alergia a huevo");

    // The slot is consumed: a second "sí" is ordinary chat.
    let (_, body) = chat(&app, "sí").await;
    assert_eq!(body["answer"], "Evita el huevo y consulta al pediatra.");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn rejected_knowledge_is_discarded() {
    let provider = Arc::new(ScriptedProvider::text("Entendido."));
    let store = family_store().await;
    let app = app(provider.clone(), store.clone(), documents().await);

    chat(&app, "Leo es alérgico al maní").await;
    let (status, body) = chat(&app, "No, gracias").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "👌 Entendido, no guardaré esa información.");
    assert_eq!(provider.calls(), 1);
    assert!(store.knowledge_for_user(USER).await.unwrap().is_empty());
}

// ── Routine proposals ────────────────────────────────────────────────────

#[tokio::test]
async fn confirmed_routine_is_saved_and_mirrored() {
    let provider = Arc::new(ScriptedProvider::text("¡Qué buena rutina!"));
    let store = family_store().await;
    let app = app(provider.clone(), store.clone(), documents().await);

    let (_, body) = chat(
        &app,
        "La rutina de noche de Leo: 19:00 baño, a las 19:30 cuento y a las 20:00 a dormir",
    )
    .await;
    let answer = body["answer"].as_str().unwrap();
    assert!(answer.starts_with("¡Qué buena rutina!\n\n💬 "));
    assert!(answer.contains("Rutina de noche"));

    let (status, body) = chat(&app, "dale").await;
    assert_eq!(status, StatusCode::OK);
    let answer = body["answer"].as_str().unwrap();
    assert!(answer.contains("Rutina de noche"));
    assert!(answer.contains("3 actividades"));
    assert_eq!(provider.calls(), 1);

    let routines = store.routines_for_user(USER).await.unwrap();
    assert_eq!(routines.len(), 1);
    assert_eq!(routines[0].baby_id, "b-leo");
    assert_eq!(routines[0].activities.len(), 3);

    let knowledge = store.knowledge_for_user(USER).await.unwrap();
    assert_eq!(knowledge.len(), 1);
    assert_eq!(knowledge[0].record.category, "rutinas");
    assert_eq!(knowledge[0].record.title, "Rutina de noche");
}

// ── Upstream failure ─────────────────────────────────────────────────────

async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

#[tokio::test]
async fn llm_server_error_becomes_bad_gateway() {
    let upstream = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "{\"error\":\"overloaded\"}") }),
    );
    let base = spawn_upstream(upstream).await;
    let provider = Arc::new(
        OpenAiCompatProvider::new("upstream", base, "sk-test", Duration::from_secs(5)).unwrap(),
    );
    let app = app(provider, family_store().await, documents().await);

    let (status, body) = chat(&app, "¿Cuántas siestas necesita Leo?").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["detail"]["status"], 500);
    assert_eq!(body["detail"]["upstream_error"], "{\"error\":\"overloaded\"}");
    assert!(body.get("answer").is_none());
}

#[tokio::test]
async fn llm_success_through_http_provider() {
    let upstream = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            axum::Json(json!({
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Dos siestas al día."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 100, "completion_tokens": 6, "total_tokens": 106}
            }))
        }),
    );
    let base = spawn_upstream(upstream).await;
    let provider = Arc::new(
        OpenAiCompatProvider::new("upstream", base, "sk-test", Duration::from_secs(5)).unwrap(),
    );
    let app = app(provider, family_store().await, documents().await);

    let (status, body) = chat(&app, "¿Cuántas siestas necesita Leo?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Dos siestas al día.");
    assert_eq!(body["usage"]["total_tokens"], 106);
}
