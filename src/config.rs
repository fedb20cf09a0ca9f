//! Application configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. Config file (`--config` / `CONFIG_FILE`, else `./config.{yaml,toml,json}` if present)
//! 3. `RAG__`-prefixed environment, e.g. `RAG__SERVER__PORT=8000`
//! 4. Legacy variables: `PROTOCOL`, `BASE_URL`, `OPENAI_API_KEY`,
//!    `SUPABASE_URL`, `SUPABASE_KEY`, `DATABASE_URL`
//! 5. CLI flags (and their clap env vars such as `PORT`)

use crate::llm::{ApiCredential, UpstreamSettings};
use crate::rag::analysis::DEFAULT_ANALYSIS_TABLE;
use crate::rag::{RetrievalSettings, SearchParams};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Similarity search backend: auto, supabase, postgres or disabled
    #[arg(long, env = "SEARCH_PROVIDER")]
    pub search_provider: Option<String>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub retrieval: RetrievalConfig,
    pub search: SearchConfig,
    pub resilience: ResilienceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    pub protocol: String,
    pub host: String,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub chat_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    pub trigger_prefix: String,
    pub similarity_threshold: f32,
    pub match_count: usize,
    pub context_token_budget: usize,
    pub tokenizer: String,
    pub question_scope: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub provider: String,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub database_url: Option<String>,
    pub analysis_table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub requests_per_second: f32,
    pub burst_size: f32,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

/// Resolved similarity-search backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchBackend {
    Supabase { url: String, key: String },
    Postgres { database_url: String },
    Disabled,
}

/// Legacy environment variables and the keys they set.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("PROTOCOL", "upstream.protocol"),
    ("BASE_URL", "upstream.host"),
    ("OPENAI_API_KEY", "upstream.api_key"),
    ("SUPABASE_URL", "search.supabase_url"),
    ("SUPABASE_KEY", "search.supabase_key"),
    ("DATABASE_URL", "search.database_url"),
];

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("upstream.protocol", "https")?
            .set_default("upstream.host", "api.openai.com")?
            .set_default("upstream.embedding_model", "text-embedding-ada-002")?
            .set_default("upstream.chat_path", "v1/chat/completions")?
            .set_default("retrieval.trigger_prefix", "fr")?
            .set_default("retrieval.similarity_threshold", 0.1)?
            .set_default("retrieval.match_count", 5)?
            .set_default("retrieval.context_token_budget", 3000)?
            .set_default("retrieval.tokenizer", "r50k_base")?
            .set_default("search.provider", "auto")?
            .set_default("search.analysis_table", DEFAULT_ANALYSIS_TABLE)?
            .set_default("resilience.rate_limit_enabled", false)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)?
            .set_default("resilience.body_limit_bytes", 10 * 1024 * 1024)?
            .set_default("logging.json", false)?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix("RAG")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in LEGACY_ENV {
            if let Ok(val) = env::var(var) {
                if !val.trim().is_empty() {
                    builder = builder.set_override(*key, val)?;
                }
            }
        }
        if let Ok(val) = env::var("SUPABASE_SERVICE_ROLE_KEY") {
            if env::var("SUPABASE_KEY").is_err() && !val.trim().is_empty() {
                builder = builder.set_override("search.supabase_key", val)?;
            }
        }

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(provider) = cli.search_provider {
            builder = builder.set_override("search.provider", provider)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("logging.json", json)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let protocol = self.upstream.protocol.as_str();
        if protocol != "http" && protocol != "https" {
            return Err(config::ConfigError::Message(format!(
                "upstream.protocol must be http or https, got {protocol}"
            )));
        }

        let base = self.upstream_settings().base_url();
        url::Url::parse(&base).map_err(|e| {
            config::ConfigError::Message(format!("invalid upstream base URL {base}: {e}"))
        })?;

        if self.retrieval.match_count == 0 {
            return Err(config::ConfigError::Message(
                "retrieval.match_count must be positive".to_string(),
            ));
        }

        self.search_backend()?;
        Ok(())
    }

    /// Provider location and default credential.
    pub fn upstream_settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            protocol: self.upstream.protocol.clone(),
            host: self.upstream.host.clone(),
            default_credential: self.upstream.api_key.clone().and_then(ApiCredential::new),
            embedding_model: self.upstream.embedding_model.clone(),
            chat_path: self.upstream.chat_path.clone(),
        }
    }

    /// Tunables for the augmented path.
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            trigger_prefix: self.retrieval.trigger_prefix.clone(),
            search: SearchParams {
                similarity_threshold: self.retrieval.similarity_threshold,
                match_count: self.retrieval.match_count,
            },
            context_token_budget: self.retrieval.context_token_budget,
            tokenizer: self.retrieval.tokenizer.clone(),
            question_scope: self
                .retrieval
                .question_scope
                .clone()
                .filter(|s| !s.is_empty()),
        }
    }

    /// Pick the similarity-search backend.
    ///
    /// `auto` prefers Supabase when its URL and key are set, then Postgres
    /// when a database URL is set, and otherwise disables retrieval.
    pub fn search_backend(&self) -> Result<SearchBackend, config::ConfigError> {
        let supabase = match (&self.search.supabase_url, &self.search.supabase_key) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
                Some(SearchBackend::Supabase {
                    url: url.clone(),
                    key: key.clone(),
                })
            }
            _ => None,
        };
        let postgres = self
            .search
            .database_url
            .clone()
            .filter(|u| !u.is_empty())
            .map(|database_url| SearchBackend::Postgres { database_url });

        let missing = |what: &str| {
            config::ConfigError::Message(format!(
                "search.provider is {} but {what} is not set",
                self.search.provider
            ))
        };

        match self.search.provider.to_lowercase().as_str() {
            "auto" => Ok(supabase.or(postgres).unwrap_or(SearchBackend::Disabled)),
            "supabase" => supabase.ok_or_else(|| missing("search.supabase_url/supabase_key")),
            "postgres" => postgres.ok_or_else(|| missing("search.database_url")),
            "disabled" => Ok(SearchBackend::Disabled),
            other => Err(config::ConfigError::Message(format!(
                "unknown search.provider: {other}"
            ))),
        }
    }
}
