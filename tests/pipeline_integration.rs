//! End-to-end tests against a mock provider and document store.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_test::TestServer;
use rag_chat_relay::config::{
    AppConfig, LoggingConfig, ResilienceConfig, RetrievalConfig, SearchConfig, ServerConfig,
    UpstreamConfig,
};
use rag_chat_relay::server::{build_router, build_state};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// What the mock upstream saw.
#[derive(Clone, Default)]
struct Upstream {
    chat_requests: Arc<Mutex<Vec<Value>>>,
    embedding_inputs: Arc<Mutex<Vec<String>>>,
    analysis_rows: Arc<Mutex<Vec<Value>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

impl Upstream {
    fn record_auth(&self, headers: &HeaderMap) {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.auth_headers.lock().unwrap().push(auth);
    }
}

async fn embeddings(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    up.record_auth(&headers);
    up.embedding_inputs
        .lock()
        .unwrap()
        .push(body["input"].as_str().unwrap_or_default().to_string());
    Json(json!({
        "object": "list",
        "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
        "model": body["model"],
    }))
}

async fn chat_completions(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    up.record_auth(&headers);
    if headers.get(header::AUTHORIZATION) == Some(&HeaderValue::from_static("Bearer bad-key")) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": {
                    "message": "Incorrect API key provided: bad-key. You can find your API key at https://platform.openai.com/account/api-keys.",
                    "type": "invalid_request_error"
                }
            })),
        )
            .into_response();
    }
    up.chat_requests.lock().unwrap().push(body);

    let events = [
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    ]
    .concat();
    ([(header::CONTENT_TYPE, "text/event-stream")], events).into_response()
}

async fn list_models(State(up): State<Upstream>, headers: HeaderMap) -> Json<Value> {
    up.record_auth(&headers);
    Json(json!({"object": "list", "data": [{"id": "gpt-3.5-turbo", "object": "model"}]}))
}

async fn match_documents(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["query_embedding"], json!([0.1, 0.2, 0.3]));
    assert_eq!(body["match_count"], 5);
    Json(json!([
        {"content": "X is a reporting tool.", "url": "https://example.com/x", "similarity": 0.91},
        {"content": "X exports to PDF.", "url": "https://example.com/x/export", "similarity": 0.85}
    ]))
}

async fn insert_analysis(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    assert_eq!(headers.get("apikey").unwrap(), "service-key");
    up.analysis_rows.lock().unwrap().push(body);
    StatusCode::CREATED
}

async fn spawn_upstream() -> (SocketAddr, Upstream) {
    let up = Upstream::default();
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/rest/v1/rpc/match_documents", post(match_documents))
        .route("/rest/v1/documents_v2_analysis", post(insert_analysis))
        .with_state(up.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, up)
}

fn test_config(addr: SocketAddr) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        upstream: UpstreamConfig {
            protocol: "http".to_string(),
            host: addr.to_string(),
            api_key: Some("sk-default".to_string()),
            embedding_model: "text-embedding-ada-002".to_string(),
            chat_path: "v1/chat/completions".to_string(),
        },
        retrieval: RetrievalConfig {
            trigger_prefix: "fr".to_string(),
            similarity_threshold: 0.1,
            match_count: 5,
            context_token_budget: 3000,
            tokenizer: "r50k_base".to_string(),
            question_scope: None,
        },
        search: SearchConfig {
            provider: "supabase".to_string(),
            supabase_url: Some(format!("http://{addr}")),
            supabase_key: Some("service-key".to_string()),
            database_url: None,
            analysis_table: "documents_v2_analysis".to_string(),
        },
        resilience: ResilienceConfig {
            rate_limit_enabled: false,
            requests_per_second: 5.0,
            burst_size: 10.0,
            body_limit_bytes: 10 * 1024 * 1024,
        },
        logging: LoggingConfig { json: false },
    }
}

async fn test_server(config: AppConfig) -> TestServer {
    let state = build_state(Arc::new(config)).unwrap();
    TestServer::new(build_router(state)).unwrap()
}

fn token(value: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("token"),
        HeaderValue::from_static(value),
    )
}

#[tokio::test]
async fn test_augmented_chat_stream() {
    let (addr, up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;

    let response = server
        .post("/api/chat-stream")
        .json(&json!({
            "model": "gpt-3.5-turbo",
            "stream": true,
            "messages": [{"role": "user", "content": "fr what is X?", "date": "2026-01-01"}]
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "Hello world");
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        "text/plain; charset=utf-8"
    );
    assert_eq!(response.header(header::CACHE_CONTROL), "no-cache");

    assert_eq!(
        *up.embedding_inputs.lock().unwrap(),
        vec!["what is X?".to_string()]
    );

    let chat = up.chat_requests.lock().unwrap();
    assert_eq!(chat.len(), 1);
    let sent = &chat[0];
    assert_eq!(sent["model"], "gpt-3.5-turbo");
    assert_eq!(sent["stream"], true);

    let messages = sent["messages"].as_array().unwrap();
    let roles: Vec<&str> = messages
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, ["system", "user", "assistant", "user"]);
    assert!(messages.iter().all(|m| m.get("date").is_none()));

    let last = messages[3]["content"].as_str().unwrap();
    assert!(last.starts_with("CONTEXT:\n"));
    assert!(last.contains("X is a reporting tool.\nSOURCE: https://example.com/x\n---\n"));
    assert!(last.contains("USER QUESTION:\nwhat is X?"));
    assert!(!last.contains("fr what is X?"));

    assert!(
        up.auth_headers
            .lock()
            .unwrap()
            .iter()
            .all(|a| a == "Bearer sk-default")
    );
}

#[tokio::test]
async fn test_plain_chat_stream_uses_token_header() {
    let (addr, up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;
    let (name, value) = token("sk-user");

    let response = server
        .post("/api/chat-stream")
        .add_header(name, value)
        .json(&json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "from the top"}
            ]
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "Hello world");
    assert!(up.embedding_inputs.lock().unwrap().is_empty());

    let chat = up.chat_requests.lock().unwrap();
    assert_eq!(
        chat[0]["messages"],
        json!([
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello"},
            {"role": "user", "content": "from the top"}
        ])
    );
    assert_eq!(*up.auth_headers.lock().unwrap(), vec!["Bearer sk-user".to_string()]);
}

#[tokio::test]
async fn test_upstream_error_is_redacted() {
    let (addr, _up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;
    let (name, value) = token("bad-key");

    let response = server
        .post("/api/chat-stream")
        .add_header(name, value)
        .json(&json!({"messages": [{"role": "user", "content": "hello"}]}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body = response.text();
    assert!(body.starts_with("```json\n"));
    assert!(body.ends_with("```"));
    assert!(body.contains("provided: ***. You"));
    assert!(!body.contains("bad-key"));
}

#[tokio::test]
async fn test_empty_conversation_is_rejected() {
    let (addr, up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;

    let response = server
        .post("/api/chat-stream")
        .json(&json!({"messages": []}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.text().contains("\"name\": \"InvalidRequest\""));
    assert!(up.chat_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_body_renders_error_block() {
    let (addr, _up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;

    let response = server
        .post("/api/chat-stream")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    assert!(response.status_code().is_client_error());
    assert!(response.text().starts_with("```json\n"));
}

#[tokio::test]
async fn test_search_failure_fails_request() {
    let (addr, up) = spawn_upstream().await;
    let mut config = test_config(addr);
    config.search.supabase_url = Some(format!("http://{addr}/missing"));
    let server = test_server(config).await;

    let response = server
        .post("/api/chat-stream")
        .json(&json!({"messages": [{"role": "user", "content": "fr what is X?"}]}))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert!(response.text().contains("SearchError"));
    assert!(up.chat_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_message_returns_chain() {
    let (addr, _up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;

    let response = server
        .post("/api/chat-message")
        .json(&json!({
            "userMessage": {"role": "user", "content": "fr what is X?"},
            "recentMessages": []
        }))
        .await;

    response.assert_status_ok();
    let built: Value = response.json();
    let recent = built["recentMessages"].as_array().unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0]["role"], "system");
    assert!(recent[2]["content"].as_str().unwrap().contains("SOURCES"));

    let user = built["userMessage"]["content"].as_str().unwrap();
    assert!(user.contains("CONTEXT:"));
    assert!(user.contains("what is X?"));
    assert!(built["userMessage"]["date"].is_string());
}

#[tokio::test]
async fn test_openai_proxy_forwards_path() {
    let (addr, up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;

    let response = server
        .post("/api/openai")
        .add_header(
            HeaderName::from_static("path"),
            HeaderValue::from_static("v1/embeddings"),
        )
        .json(&json!({"input": "hello", "model": "text-embedding-ada-002"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"][0]["embedding"], json!([0.1, 0.2, 0.3]));
    assert_eq!(*up.embedding_inputs.lock().unwrap(), vec!["hello".to_string()]);

    let models = server
        .get("/api/openai")
        .add_header(
            HeaderName::from_static("path"),
            HeaderValue::from_static("v1/models"),
        )
        .await;
    models.assert_status_ok();
    assert_eq!(models.json::<Value>()["data"][0]["id"], "gpt-3.5-turbo");

    let missing = server
        .post("/api/openai")
        .json(&json!({"input": "hello"}))
        .await;
    missing.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analysis_is_recorded() {
    let (addr, up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;

    let response = server
        .post("/api/analysis")
        .json(&json!({
            "userMessage": {"role": "user", "content": "what is X?"},
            "botMessage": {"role": "assistant", "content": "X is a reporting tool."}
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<String>(), "success");
    assert_eq!(
        *up.analysis_rows.lock().unwrap(),
        vec![json!({"question": "what is X?", "answer": "X is a reporting tool.", "type": 1})]
    );
}

#[tokio::test]
async fn test_health() {
    let (addr, _up) = spawn_upstream().await;
    let server = test_server(test_config(addr)).await;

    let response = server.get("/api/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({"status": "ok"}));
}
