//! Upstream provider location and credential resolution.
//!
//! The provider is addressed as `{protocol}://{host}/{path}`; the path is
//! chosen per request, which is what lets a single forwarding function serve
//! completions, embeddings and any other provider endpoint.

use std::fmt;

/// Default provider host.
pub const DEFAULT_HOST: &str = "api.openai.com";
/// Default provider protocol.
pub const DEFAULT_PROTOCOL: &str = "https";
/// Default path for chat completions.
pub const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";
/// Path for embeddings.
pub const EMBEDDINGS_PATH: &str = "v1/embeddings";

/// Provider API credential.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential(String);

impl ApiCredential {
    /// Wrap a credential, ignoring blank values.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        let trimmed = secret.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The raw secret, for building the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(***)")
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Where and how to reach the provider.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// `http` or `https`.
    pub protocol: String,
    /// Host (and optional port), e.g. `api.openai.com`.
    pub host: String,
    /// Credential used when a request carries no `token` header.
    pub default_credential: Option<ApiCredential>,
    /// Model identifier sent to the embeddings endpoint.
    pub embedding_model: String,
    /// Path used by the chat-stream route when no `path` header is given.
    pub chat_path: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            host: DEFAULT_HOST.to_string(),
            default_credential: None,
            embedding_model: "text-embedding-ada-002".to_string(),
            chat_path: CHAT_COMPLETIONS_PATH.to_string(),
        }
    }
}

impl UpstreamSettings {
    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}",
            self.protocol.trim_end_matches("://"),
            self.host.trim_end_matches('/')
        )
    }

    /// Full URL for a provider path such as `v1/embeddings`.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    /// Pick the per-request credential, falling back to the configured one.
    #[must_use]
    pub fn resolve_credential(&self, header: Option<&str>) -> Option<ApiCredential> {
        header
            .and_then(ApiCredential::new)
            .or_else(|| self.default_credential.clone())
    }
}
