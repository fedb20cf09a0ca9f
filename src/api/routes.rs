use axum::{
    Json,
    body::{Body, Bytes},
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::{ApiError, PipelineError};
use crate::llm::relay::{self, Relayed};
use crate::llm::{ApiCredential, ChatCompletionRequest, Message, ProxyRequest};
use crate::rag::{AnalysisRecord, CHAT_ANALYSIS_TYPE, SessionMsg};

/// Header carrying a per-request provider credential.
pub const TOKEN_HEADER: &str = "token";
/// Header naming the provider path to forward to.
pub const PATH_HEADER: &str = "path";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn credential(state: &AppState, headers: &HeaderMap) -> Option<ApiCredential> {
    state
        .proxy
        .settings()
        .resolve_credential(header_str(headers, TOKEN_HEADER))
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    ApiError(PipelineError::InvalidRequest(rejection.body_text()))
}

/// Plain text stream response, unbuffered by proxies.
fn text_stream_response(body: Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}

/// POST /api/chat-stream - build the chain, forward it and relay the text.
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload.map_err(invalid_body)?;
    let request_id = Uuid::new_v4();
    let credential = credential(&state, &headers);
    let path = header_str(&headers, PATH_HEADER)
        .unwrap_or(state.proxy.settings().chat_path.as_str())
        .to_string();

    tracing::info!(
        name: "api.chat_stream.received",
        request_id = %request_id,
        path = %path,
        messages = req.messages.len(),
        "Received chat stream request"
    );

    let ChatCompletionRequest { messages, params } = req;
    let session = SessionMsg::from_messages(messages)?;
    let session = state.chain.build(session, credential.as_ref()).await?;

    let upstream = ChatCompletionRequest {
        messages: session.into_messages(),
        params,
    }
    .into_upstream();

    let proxy_req =
        ProxyRequest::post_json(path, credential, &upstream).map_err(PipelineError::from)?;
    let resp = state
        .proxy
        .forward(proxy_req)
        .await
        .map_err(PipelineError::from)?;
    let status = resp.status();

    match relay::relay(resp).await.map_err(PipelineError::from)? {
        Relayed::ErrorBlock(block) => {
            tracing::warn!(
                name: "api.chat_stream.upstream_error",
                request_id = %request_id,
                status = %status,
                "Relaying upstream error block"
            );
            Ok((status, block).into_response())
        }
        Relayed::Stream(stream) => Ok(text_stream_response(Body::from_stream(stream))),
    }
}

/// POST /api/chat-message - return the chain that would be sent upstream.
pub async fn chat_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SessionMsg>, JsonRejection>,
) -> Result<Json<SessionMsg>, ApiError> {
    let Json(session) = payload.map_err(invalid_body)?;
    let credential = credential(&state, &headers);
    let built = state.chain.build(session, credential.as_ref()).await?;
    Ok(Json(built))
}

/// ANY /api/openai - forward any provider path and method unchanged.
pub async fn openai_proxy(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let path = header_str(&headers, PATH_HEADER)
        .ok_or_else(|| PipelineError::InvalidRequest("missing `path` header".to_string()))?
        .to_string();

    let req = ProxyRequest {
        method,
        path,
        credential: credential(&state, &headers),
        body: reqwest::Body::from(body),
    };
    let resp = state.proxy.forward(req).await.map_err(PipelineError::from)?;

    let status = resp.status();
    let content_type = resp.headers().get(header::CONTENT_TYPE).cloned();

    let mut out = Response::new(Body::from_stream(resp.bytes_stream()));
    *out.status_mut() = status;
    if let Some(ct) = content_type {
        out.headers_mut().insert(header::CONTENT_TYPE, ct);
    }
    Ok(out)
}

/// Body of an analysis submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    pub user_message: Message,
    pub bot_message: Message,
}

/// POST /api/analysis - store a question/answer pair.
pub async fn analysis(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisPayload>, JsonRejection>,
) -> (StatusCode, Json<&'static str>) {
    let Ok(Json(payload)) = payload else {
        return (StatusCode::BAD_REQUEST, Json("error"));
    };

    let record = AnalysisRecord {
        question: payload.user_message.content,
        answer: payload.bot_message.content,
        kind: CHAT_ANALYSIS_TYPE,
    };

    match state.analysis.record(&record).await {
        Ok(()) => (StatusCode::OK, Json("success")),
        Err(e) => {
            tracing::error!(
                name: "api.analysis.failed",
                error = %e,
                "Failed to store analysis record"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json("error"))
        }
    }
}

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
