//! Path-forwarding proxy to the provider.
//!
//! The caller names the provider endpoint in a header instead of the URL,
//! so one function forwards completions, embeddings and anything else the
//! provider exposes. Responses are returned as-is, including non-2xx ones;
//! interpreting error bodies is the relay's job.

use axum::http::Method;

use super::upstream::{ApiCredential, UpstreamSettings};

/// A request to forward upstream.
#[derive(Debug)]
pub struct ProxyRequest {
    /// HTTP method of the inbound request.
    pub method: Method,
    /// Provider path, e.g. `v1/chat/completions`.
    pub path: String,
    /// Credential to send as a bearer token.
    pub credential: Option<ApiCredential>,
    /// Request body.
    pub body: reqwest::Body,
}

impl ProxyRequest {
    /// A JSON `POST` to `path`.
    pub fn post_json<T: serde::Serialize>(
        path: impl Into<String>,
        credential: Option<ApiCredential>,
        body: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            credential,
            body: reqwest::Body::from(serde_json::to_vec(body)?),
        })
    }
}

/// Forwards requests to `{protocol}://{host}/{path}`.
#[derive(Clone)]
pub struct CompletionProxy {
    http: reqwest::Client,
    settings: UpstreamSettings,
}

impl std::fmt::Debug for CompletionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionProxy")
            .field("settings", &self.settings)
            .finish()
    }
}

impl CompletionProxy {
    /// Create a proxy sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, settings: UpstreamSettings) -> Self {
        Self { http, settings }
    }

    /// Upstream settings.
    pub fn settings(&self) -> &UpstreamSettings {
        &self.settings
    }

    /// Forward a request. Only transport failures are errors.
    pub async fn forward(&self, req: ProxyRequest) -> reqwest::Result<reqwest::Response> {
        let url = self.settings.url_for(&req.path);
        tracing::info!(
            name: "proxy.forward",
            method = %req.method,
            path = %req.path,
            has_credential = req.credential.is_some(),
            "Forwarding request upstream"
        );

        let mut rb = self
            .http
            .request(req.method, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(req.body);
        if let Some(cred) = &req.credential {
            rb = rb.bearer_auth(cred.expose());
        }

        let resp = rb.send().await?;
        tracing::debug!(
            path = %req.path,
            status = %resp.status(),
            content_type = ?resp.headers().get(reqwest::header::CONTENT_TYPE),
            "Upstream responded"
        );
        Ok(resp)
    }
}
