//! HTTP surface for the chat widget, operators, and the reseed scheduler.
//!
//! [`app`] builds the axum router over an [`AppState`]; [`serve`] is the
//! composition root that opens the store, wires the collaborators, seeds an
//! empty database, starts the [`AutoTrainer`], and listens until ctrl-c.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::chat::{ChatRequest, ChatService};
use crate::config::KoaConfig;
use crate::db::{self, Db};
use crate::error::KoaError;
use crate::knowledge::answer::compose_answer;
use crate::knowledge::seed::{self, GITBOOK_URL, TWITTER_URL};
use crate::knowledge::{store, KnowledgeBase, ScoredSnippet};
use crate::llm::{self, CompletionClient};
use crate::quota::{self, QuotaPolicy, QuotaTracker};
use crate::scheduler::{AutoTrainer, KnowledgeReseeder, ReseedJob};
use crate::training::{session, CaptureRequest, TrainingCapture, TrainingOutcome};

/// Everything a handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub quota: QuotaTracker,
    pub knowledge: KnowledgeBase,
    pub training: TrainingCapture,
    pub chat: ChatService,
    pub trainer: Arc<AutoTrainer>,
    auth_secret: Option<String>,
    max_results: usize,
    post_results: usize,
}

impl AppState {
    pub fn new(
        db: Db,
        config: &KoaConfig,
        completion: Arc<dyn CompletionClient>,
        job: Arc<dyn ReseedJob>,
    ) -> Self {
        Self::with_quota_policy(db, config, completion, job, QuotaPolicy::default())
    }

    fn with_quota_policy(
        db: Db,
        config: &KoaConfig,
        completion: Arc<dyn CompletionClient>,
        job: Arc<dyn ReseedJob>,
        policy: QuotaPolicy,
    ) -> Self {
        let quota = QuotaTracker::new(db.clone(), policy);
        let knowledge = KnowledgeBase::new(db.clone());
        let training = TrainingCapture::new(db.clone(), config.training.clone());
        let chat = ChatService::new(
            quota.clone(),
            knowledge.clone(),
            training.clone(),
            completion,
            config.retrieval.clone(),
            config.completion.clone(),
        );
        let trainer = Arc::new(AutoTrainer::from_config(job, &config.scheduler));

        Self {
            db,
            quota,
            knowledge,
            training,
            chat,
            trainer,
            auth_secret: config.scheduler.auth_secret.clone(),
            max_results: config.retrieval.max_results,
            post_results: config.retrieval.post_results,
        }
    }
}

// ── Request bodies ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientQuery {
    client_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    client_id: String,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    query: String,
}

#[derive(Debug, Deserialize)]
struct TestSearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretTrainingRequest {
    message: String,
    user_id: String,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RankedTitle {
    title: String,
    section: String,
    score: u32,
    matched: Vec<&'static str>,
    is_training: bool,
}

impl From<&ScoredSnippet> for RankedTitle {
    fn from(scored: &ScoredSnippet) -> Self {
        Self {
            title: scored.snippet.title.clone(),
            section: scored.snippet.section.clone(),
            score: scored.score,
            matched: scored.matched.clone(),
            is_training: scored.snippet.is_user_training(),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

fn header_str(headers: &HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First hop of `X-Forwarded-For`, if present.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
}

/// Accept `Authorization: Bearer <secret>`. An unset secret rejects everything.
fn authorize(headers: &HeaderMap, secret: Option<&str>) -> Result<(), KoaError> {
    let Some(secret) = secret.filter(|s| !s.trim().is_empty()) else {
        return Err(KoaError::Unauthorized);
    };
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(secret) {
        Ok(())
    } else {
        Err(KoaError::Unauthorized)
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Result<Json<Value>, KoaError> {
    let report =
        db::with_conn(&state.db, |conn| Ok(db::check_database_health(conn)?)).await?;
    Ok(Json(json!({
        "status": if report.integrity_ok { "ok" } else { "degraded" },
        "database": report,
    })))
}

async fn client_status(
    State(state): State<AppState>,
    Query(q): Query<ClientQuery>,
) -> Result<Json<Value>, KoaError> {
    let status = state.quota.status_or_deny(&q.client_id).await?;
    Ok(ok(status))
}

async fn register_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Value>, KoaError> {
    let ip = req.ip_address.or_else(|| forwarded_ip(&headers));
    let ua = req.user_agent.or_else(|| header_str(&headers, USER_AGENT));
    let status = state.quota.register_or_deny(&req.client_id, ip, ua).await?;
    Ok(ok(status))
}

async fn increment(
    State(state): State<AppState>,
    Json(q): Json<ClientQuery>,
) -> Result<Json<Value>, KoaError> {
    let status = state.quota.record_message(&q.client_id).await?;
    Ok(ok(status))
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut req): Json<ChatRequest>,
) -> Result<Json<Value>, KoaError> {
    if req.ip_address.is_none() {
        req.ip_address = forwarded_ip(&headers);
    }
    if req.user_agent.is_none() {
        req.user_agent = header_str(&headers, USER_AGENT);
    }
    let reply = state.chat.exchange(req).await?;
    Ok(ok(reply))
}

async fn knowledge_search(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<Value>, KoaError> {
    let results = match state.knowledge.search(&body.query, state.max_results).await {
        Err(KoaError::StoreUnavailable(e)) => {
            tracing::warn!(error = %e, "knowledge search failed, answering with fallback");
            Vec::new()
        }
        other => other?,
    };
    let answer = compose_answer(body.query.trim(), &results);
    tracing::info!(query = %body.query, results = results.len(), "knowledge search");

    Ok(Json(json!({
        "success": true,
        "message": answer.message,
        "data": {
            "results": results,
            "hasTrainingData": answer.has_training_data,
            "trainingDataCount": answer.training_data_count,
            "officialContentCount": answer.official_content_count,
        },
        "links": { "gitbook": GITBOOK_URL, "twitter": TWITTER_URL },
    })))
}

async fn test_search(
    State(state): State<AppState>,
    Query(q): Query<TestSearchQuery>,
) -> Result<Json<Value>, KoaError> {
    let snippets = state.knowledge.active_snippets().await?;
    let results = state.knowledge.search(&q.q, state.max_results).await?;
    let ranked: Vec<RankedTitle> = results.iter().map(RankedTitle::from).collect();
    Ok(ok(json!({
        "query": q.q,
        "totalSnippets": snippets.len(),
        "results": ranked,
    })))
}

async fn secret_training(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SecretTrainingRequest>,
) -> Result<Json<Value>, KoaError> {
    let outcome = state
        .training
        .process(CaptureRequest {
            user_id: req.user_id,
            message: req.message,
            user_agent: req.user_agent.or_else(|| header_str(&headers, USER_AGENT)),
            ip_address: req.ip_address.or_else(|| forwarded_ip(&headers)),
        })
        .await?;

    let message = match &outcome {
        TrainingOutcome::NotHandled => "Message processed normally",
        other => other.reply().unwrap_or_default(),
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "trainingMode": outcome.training_mode(),
        "sessionId": outcome.session_id(),
        "data": outcome,
    })))
}

async fn x_search(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<Value>, KoaError> {
    let posts = state
        .knowledge
        .search_posts(&body.query, state.post_results)
        .await?;
    Ok(ok(json!({ "query": body.query.trim(), "posts": posts })))
}

async fn auto_train_status(State(state): State<AppState>) -> Json<Value> {
    ok(state.trainer.status().await)
}

async fn auto_train_force(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, KoaError> {
    authorize(&headers, state.auth_secret.as_deref())?;
    let result = state.trainer.force().await?;
    Ok(ok(json!({ "run": result, "status": state.trainer.status().await })))
}

async fn admin_clients(State(state): State<AppState>) -> Result<Json<Value>, KoaError> {
    let clients = db::with_conn(&state.db, |conn| quota::list_active_clients(conn)).await?;
    let statistics = quota::client_statistics(&clients, Utc::now(), state.quota.policy());
    Ok(ok(json!({ "clients": clients, "statistics": statistics })))
}

async fn admin_training_data(State(state): State<AppState>) -> Result<Json<Value>, KoaError> {
    let sessions = db::with_conn(&state.db, |conn| session::list_active_sessions(conn)).await?;
    Ok(ok(json!({ "count": sessions.len(), "sessions": sessions })))
}

async fn admin_delete_training_data(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<Value>, KoaError> {
    let id = q.id.clone();
    let removed =
        db::with_conn(&state.db, move |conn| session::deactivate_session(conn, &id)).await?;
    if !removed {
        return Err(KoaError::NotFound(format!("training session {}", q.id)));
    }
    tracing::info!(session_id = %q.id, "training session deactivated by admin");
    Ok(ok(json!({ "id": q.id })))
}

async fn admin_training_knowledge(
    State(state): State<AppState>,
) -> Result<Json<Value>, KoaError> {
    let snippets = state.knowledge.training_snippets().await?;
    Ok(ok(json!({ "count": snippets.len(), "snippets": snippets })))
}

async fn admin_delete_training_knowledge(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<Value>, KoaError> {
    state.knowledge.remove_training_snippet(&q.id).await?;
    Ok(ok(json!({ "id": q.id })))
}

// ── Router ──────────────────────────────────────────────────────

/// Build the router. CORS is left to the caller (see [`serve`]).
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/client/status", get(client_status).post(register_client))
        .route("/api/client/increment", post(increment))
        .route("/api/chat", post(chat))
        .route("/api/knowledge/search", post(knowledge_search))
        .route("/api/test-search", get(test_search))
        .route("/api/training/secret-training", post(secret_training))
        .route("/api/training/x-search", post(x_search))
        .route(
            "/api/training/auto-train",
            get(auto_train_status).post(auto_train_force),
        )
        .route("/api/admin/clients", get(admin_clients))
        .route(
            "/api/admin/training-data",
            get(admin_training_data).delete(admin_delete_training_data),
        )
        .route(
            "/api/admin/training-knowledge",
            get(admin_training_knowledge).delete(admin_delete_training_knowledge),
        )
        .with_state(state)
}

/// Seed the official knowledge when the store has no active snippets.
pub async fn seed_if_empty(db: &Db) -> Result<(), KoaError> {
    db::with_conn(db, |conn| {
        if store::count_active_snippets(conn)? > 0 {
            return Ok(());
        }
        let report = seed::reseed(conn, Utc::now())?;
        tracing::info!(snippets = report.snippets.inserted, "seeded empty knowledge store");
        Ok(())
    })
    .await
}

/// Start the HTTP server and the reseed scheduler.
pub async fn serve(config: KoaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let db = db::shared(db::open_database(&db_path)?);
    tracing::info!(db = %db_path.display(), "database ready");

    seed_if_empty(&db).await?;

    let completion = llm::client_from_config(&config.completion);
    let job: Arc<dyn ReseedJob> = Arc::new(KnowledgeReseeder::new(db.clone()));
    let state = AppState::new(db, &config, completion, job);

    let trainer = config
        .scheduler
        .enabled
        .then(|| Arc::clone(&state.trainer).spawn());

    let router = app(state).layer(cors_layer(&config.server.allowed_origins));
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "koa listening at http://{bind_addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    if let Some(handle) = trainer {
        handle.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionRequest;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Echoes a canned reply and keeps the prompts it was sent.
    #[derive(Default)]
    struct FakeCompletion {
        fail: bool,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionClient for FakeCompletion {
        async fn complete(&self, request: CompletionRequest) -> Result<String, KoaError> {
            self.seen.lock().unwrap().push(request);
            if self.fail {
                Err(KoaError::Completion("upstream down".into()))
            } else {
                Ok("Koã here! Voice chat is on the roadmap.".into())
            }
        }
    }

    fn test_config() -> KoaConfig {
        let mut config = KoaConfig::default();
        config.training.secret_code = Some("open sesame".into());
        config.training.exit_code = Some("close sesame".into());
        config.scheduler.auth_secret = Some("s3cret".into());
        config
    }

    /// Small allowance so limit tests stay short.
    fn small_quota() -> QuotaPolicy {
        QuotaPolicy {
            daily_limit: 4,
            ..QuotaPolicy::default()
        }
    }

    async fn seeded_db() -> Db {
        let db = db::shared(db::open_memory_database().unwrap());
        seed_if_empty(&db).await.unwrap();
        db
    }

    async fn test_app(config: &KoaConfig, completion: Arc<FakeCompletion>) -> (Router, Db) {
        let db = seeded_db().await;
        let job: Arc<dyn ReseedJob> = Arc::new(KnowledgeReseeder::new(db.clone()));
        let state = AppState::with_quota_policy(db.clone(), config, completion, job, small_quota());
        (app(state), db)
    }

    fn poison(shared: &Db) {
        let handle = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = handle.lock().unwrap();
            panic!("poisoning the store lock");
        })
        .join();
        assert!(db::lock(shared).is_err());
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send_with(router, method, uri, body, None).await
    }

    async fn send_with(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_reports_seeded_store() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let (status, body) = send(&router, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["database"]["activeSnippetCount"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_get_status_does_not_register() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let (status, body) =
            send(&router, Method::GET, "/api/client/status?clientId=visitor-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isNewClient"], true);
        assert_eq!(body["data"]["canSend"], true);

        let (_, clients) = send(&router, Method::GET, "/api/admin/clients", None).await;
        assert_eq!(clients["data"]["statistics"]["totalClients"], 0);

        let (_, body) = send(
            &router,
            Method::POST,
            "/api/client/status",
            Some(json!({ "clientId": "visitor-1" })),
        )
        .await;
        assert_eq!(body["data"]["isNewClient"], false);
        let (_, clients) = send(&router, Method::GET, "/api/admin/clients", None).await;
        assert_eq!(clients["data"]["statistics"]["totalClients"], 1);
    }

    #[tokio::test]
    async fn test_increment_stops_at_limit() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let body = json!({ "clientId": "visitor-2" });
        for expected in 1..=4 {
            let (status, resp) =
                send(&router, Method::POST, "/api/client/increment", Some(body.clone())).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(resp["data"]["messageCount"], expected);
        }
        let (status, resp) =
            send(&router, Method::POST, "/api/client/increment", Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp["data"]["messageCount"], 4);
        assert_eq!(resp["data"]["canSend"], false);
    }

    #[tokio::test]
    async fn test_quota_is_fixed_regardless_of_config_file() {
        let config: KoaConfig =
            toml::from_str("[quota]\ndaily_limit = 5\nwindow_hours = 0\n").unwrap();
        let db = seeded_db().await;
        let job: Arc<dyn ReseedJob> = Arc::new(KnowledgeReseeder::new(db.clone()));
        let state = AppState::new(db, &config, Arc::new(FakeCompletion::default()), job);
        assert_eq!(state.quota.policy().daily_limit, quota::DAILY_LIMIT);
        assert_eq!(state.quota.policy().window, chrono::Duration::hours(24));

        let router = app(state);
        let body = json!({ "clientId": "visitor-fixed" });
        for _ in 0..quota::DAILY_LIMIT {
            let (status, _) =
                send(&router, Method::POST, "/api/client/increment", Some(body.clone())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, resp) =
            send(&router, Method::POST, "/api/client/increment", Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp["data"]["messageCount"], 100);
        assert!(resp["data"]["timeUntilResetMs"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_status_denies_when_store_unreachable() {
        let (router, db) = test_app(&test_config(), Arc::default()).await;
        poison(&db);

        let (status, body) =
            send(&router, Method::GET, "/api/client/status?clientId=visitor-6", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["canSend"], false);

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/client/status",
            Some(json!({ "clientId": "visitor-6" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["canSend"], false);
    }

    #[tokio::test]
    async fn test_knowledge_search_falls_back_when_store_unreachable() {
        let (router, db) = test_app(&test_config(), Arc::default()).await;
        poison(&db);

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/knowledge/search",
            Some(json!({ "query": "Jupiter integration" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], crate::knowledge::answer::NO_INFO_MESSAGE);
        assert!(body["data"]["results"].as_array().unwrap().is_empty());
        assert_eq!(body["data"]["hasTrainingData"], false);
    }

    #[tokio::test]
    async fn test_chat_grounds_and_charges_twice() {
        let completion = Arc::new(FakeCompletion::default());
        let (router, _db) = test_app(&test_config(), completion.clone()).await;

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/chat",
            Some(json!({ "clientId": "visitor-3", "message": "Tell me about voice chat" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reply"], "Koã here! Voice chat is on the roadmap.");
        assert_eq!(body["data"]["degraded"], false);
        assert_eq!(body["data"]["status"]["messageCount"], 2);
        assert!(!body["data"]["sources"].as_array().unwrap().is_empty());

        let seen = completion.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].messages[1].content.contains("Relevant Koasync knowledge"));
    }

    #[tokio::test]
    async fn test_chat_degrades_on_completion_failure() {
        let completion = Arc::new(FakeCompletion {
            fail: true,
            ..Default::default()
        });
        let (router, _db) = test_app(&test_config(), completion).await;
        let (status, body) = send(
            &router,
            Method::POST,
            "/api/chat",
            Some(json!({ "clientId": "visitor-4", "message": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["degraded"], true);
        assert_eq!(body["data"]["reply"], crate::chat::APOLOGY_REPLY);
    }

    #[tokio::test]
    async fn test_chat_rejected_over_quota() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let msg = json!({ "clientId": "visitor-5", "message": "hi" });
        for _ in 0..2 {
            let (status, _) = send(&router, Method::POST, "/api/chat", Some(msg.clone())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = send(&router, Method::POST, "/api/chat", Some(msg)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_chat_secret_code_skips_completion() {
        let completion = Arc::new(FakeCompletion::default());
        let (router, _db) = test_app(&test_config(), completion.clone()).await;
        let (_, body) = send(
            &router,
            Method::POST,
            "/api/chat",
            Some(json!({ "clientId": "trainer", "message": "open sesame" })),
        )
        .await;
        assert_eq!(body["data"]["reply"], crate::training::ACTIVATED_REPLY);
        assert_eq!(body["data"]["trainingMode"], true);
        assert!(completion.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_knowledge_search_composes_answer() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let (status, body) = send(
            &router,
            Method::POST,
            "/api/knowledge/search",
            Some(json!({ "query": "Jupiter integration" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("not live yet"));
        assert!(message.contains(GITBOOK_URL));
        assert_eq!(body["links"]["twitter"], TWITTER_URL);

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/knowledge/search",
            Some(json!({ "query": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_debug_lists_scores() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let (status, body) =
            send(&router, Method::GET, "/api/test-search?q=voice%20chat", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["totalSnippets"].as_u64().unwrap() > 0);
        let first = &body["data"]["results"][0];
        assert!(first["score"].as_u64().unwrap() > 0);
        assert!(first["matched"].as_array().is_some());
    }

    #[tokio::test]
    async fn test_training_capture_round_trip() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let url = "/api/training/secret-training";

        let (_, body) = send(
            &router,
            Method::POST,
            url,
            Some(json!({ "userId": "op", "message": "just chatting" })),
        )
        .await;
        assert_eq!(body["trainingMode"], false);
        assert_eq!(body["message"], "Message processed normally");

        let (_, body) = send(
            &router,
            Method::POST,
            url,
            Some(json!({ "userId": "op", "message": "open sesame" })),
        )
        .await;
        assert_eq!(body["trainingMode"], true);

        let (_, body) = send(
            &router,
            Method::POST,
            url,
            Some(json!({ "userId": "op", "message": "Koa can remember your favourite tokens" })),
        )
        .await;
        assert_eq!(body["data"]["outcome"], "recorded");

        let (_, knowledge) =
            send(&router, Method::GET, "/api/admin/training-knowledge", None).await;
        assert_eq!(knowledge["data"]["count"], 1);
        let (_, sessions) = send(&router, Method::GET, "/api/admin/training-data", None).await;
        assert_eq!(sessions["data"]["count"], 1);

        let (_, body) = send(
            &router,
            Method::POST,
            url,
            Some(json!({ "userId": "op", "message": "close sesame" })),
        )
        .await;
        assert_eq!(body["message"], crate::training::DEACTIVATED_REPLY);
        let (_, sessions) = send(&router, Method::GET, "/api/admin/training-data", None).await;
        assert_eq!(sessions["data"]["count"], 0);
    }

    #[tokio::test]
    async fn test_admin_delete_missing_is_not_found() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let (status, _) = send(
            &router,
            Method::DELETE,
            "/api/admin/training-knowledge?id=nope",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) =
            send(&router, Method::DELETE, "/api/admin/training-data?id=nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_x_search_returns_at_most_configured_posts() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let (status, body) = send(
            &router,
            Method::POST,
            "/api/training/x-search",
            Some(json!({ "query": "koasync" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let posts = body["data"]["posts"].as_array().unwrap();
        assert!(!posts.is_empty());
        assert!(posts.len() <= 3);
    }

    #[tokio::test]
    async fn test_auto_train_requires_bearer() {
        let (router, _db) = test_app(&test_config(), Arc::default()).await;
        let url = "/api/training/auto-train";

        let (status, body) = send(&router, Method::GET, url, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["healthStatus"].is_string());

        let (status, _) = send(&router, Method::POST, url, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send_with(&router, Method::POST, url, None, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send_with(&router, Method::POST, url, None, Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["run"]["result"], "completed");
        assert_eq!(body["data"]["status"]["healthStatus"], "healthy");
    }

    #[tokio::test]
    async fn test_auto_train_locked_without_secret() {
        let mut config = test_config();
        config.scheduler.auth_secret = None;
        let (router, _db) = test_app(&config, Arc::default()).await;
        let (status, _) =
            send_with(&router, Method::POST, "/api/training/auto-train", None, Some("")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_forwarded_ip_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("203.0.113.7"));
        assert_eq!(forwarded_ip(&HeaderMap::new()), None);
    }
}
