//! Settings structures for scholar-relay configuration

use crate::dispatch::RetryOn;
use crate::error::RelayError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Main settings structure, loaded from `relay.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub outgoing: OutgoingSettings,
    pub completion: CompletionSettings,
    pub search: SearchSettings,
    pub providers: Vec<ProviderConfig>,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Merge with environment variables (RELAY_* prefix)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("RELAY_COMPLETION_BACKEND") {
            match val.parse() {
                Ok(backend) => self.completion.backend = backend,
                Err(e) => warn!("ignoring RELAY_COMPLETION_BACKEND: {}", e),
            }
        }
        if let Ok(val) = std::env::var("RELAY_COMPLETION_API_URL") {
            self.completion.api_url = val;
        }
        if let Ok(val) = std::env::var("RELAY_COMPLETION_API_KEY") {
            self.completion.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("RELAY_COMPLETION_MODEL") {
            self.completion.model = val;
        }
        if let Ok(val) = std::env::var("RELAY_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                self.completion.concurrency = n;
            }
        }
        if let Ok(val) = std::env::var("RELAY_SEARCH_API_KEY") {
            for provider in &mut self.providers {
                if provider.kind.requires_api_key() && provider.api_key.is_none() {
                    provider.api_key = Some(val.clone());
                }
            }
        }
    }

    /// Check URLs and numeric bounds
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.completion.api_url)
            .map_err(|e| anyhow::anyhow!("completion.api_url: {}", e))?;
        if self.completion.concurrency == 0 {
            anyhow::bail!("completion.concurrency must be at least 1");
        }
        self.completion.timeout()?;
        seconds("search.timeout", self.search.timeout)?;
        for provider in &self.providers {
            provider.validate()?;
        }
        Ok(())
    }

    /// Get provider config by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Get all enabled providers, in declaration order
    pub fn enabled_providers(&self) -> Vec<&ProviderConfig> {
        self.providers.iter().filter(|p| !p.disabled).collect()
    }
}

/// Outgoing HTTP settings shared by every provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Pool max idle connections per host
    pub pool_maxsize: usize,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// User agent override
    pub user_agent: Option<String>,
    /// Proxy settings
    pub proxies: ProxySettings,
    /// Extra headers to send
    pub extra_headers: HashMap<String, String>,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            pool_maxsize: 20,
            verify_ssl: true,
            user_agent: None,
            proxies: ProxySettings::default(),
            extra_headers: HashMap::new(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Chat completion endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// Wire format spoken by `api_url`
    pub backend: CompletionBackend,
    /// Full URL of the chat completions endpoint; for Gemini, the models base
    pub api_url: String,
    /// Bearer token; local servers usually need none
    pub api_key: Option<String>,
    /// Default model identifier
    pub model: String,
    /// Default sampling temperature
    pub temperature: f64,
    /// Maximum in-flight requests per model
    pub concurrency: usize,
    /// Total attempts per request
    pub max_tries: u32,
    /// Linear backoff unit in milliseconds
    pub base_delay_ms: u64,
    /// Per-call timeout in seconds. `None` means no client-side timeout:
    /// the call waits as long as the provider keeps the connection open.
    pub timeout: Option<f64>,
    /// Which provider errors are retried
    pub retry_on: RetryOn,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            backend: CompletionBackend::OpenAi,
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 1.0,
            concurrency: crate::DEFAULT_CONCURRENCY,
            max_tries: crate::DEFAULT_MAX_TRIES,
            base_delay_ms: crate::DEFAULT_BASE_DELAY_MS,
            timeout: None,
            retry_on: RetryOn::default(),
        }
    }
}

impl CompletionSettings {
    /// Settings for an OpenAI-compatible server on localhost
    pub fn local(port: u16, model: impl Into<String>) -> Self {
        Self {
            api_url: format!("http://127.0.0.1:{}/v1/chat/completions", port),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Settings for Google's Gemini API
    pub fn gemini(model: impl Into<String>) -> Self {
        Self {
            backend: CompletionBackend::Gemini,
            api_url: GEMINI_API_BASE.to_string(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Per-call timeout; rejects non-positive or non-finite seconds
    pub fn timeout(&self) -> crate::error::Result<Option<Duration>> {
        self.timeout
            .map(|secs| seconds("completion.timeout", secs))
            .transpose()
    }
}

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Chat completion wire format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionBackend {
    /// `/chat/completions` with bearer auth (remote or local server)
    #[default]
    OpenAi,
    /// `{model}:generateContent` with an `x-goog-api-key` header
    Gemini,
}

impl std::str::FromStr for CompletionBackend {
    type Err = RelayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" | "local" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(RelayError::Config(format!(
                "unknown completion backend: {}",
                other
            ))),
        }
    }
}

/// Defaults applied to every search provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Default per-request timeout in seconds
    pub timeout: f64,
    /// Linear backoff unit for page retries, in milliseconds
    pub base_delay_ms: u64,
    /// Deduplicate aggregated results by url
    pub dedup: bool,
    /// Maximum in-flight requests per provider; `None` disables the gate
    pub concurrency: Option<usize>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            timeout: crate::DEFAULT_SEARCH_TIMEOUT,
            base_delay_ms: crate::DEFAULT_BASE_DELAY_MS,
            dedup: false,
            concurrency: None,
        }
    }
}

/// Closed set of supported search backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Arxiv,
    Scholar,
    Web,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Arxiv => "http://export.arxiv.org/api/query",
            Self::Scholar => "https://google.serper.dev/scholar",
            Self::Web => "https://google.serper.dev/search",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Scholar | Self::Web)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::Scholar => "scholar",
            Self::Web => "web",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = crate::RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arxiv" => Ok(Self::Arxiv),
            "scholar" | "google_scholar" => Ok(Self::Scholar),
            "web" | "google" => Ok(Self::Web),
            other => Err(crate::RelayError::Config(format!(
                "unknown provider kind: {}",
                other
            ))),
        }
    }
}

/// Individual search provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name (unique identifier, also the gate key)
    pub name: String,
    /// Backend implementation to use
    pub kind: ProviderKind,
    /// Whether the provider is skipped at load time
    pub disabled: bool,
    /// Endpoint override
    pub base_url: Option<String>,
    /// API key if required
    pub api_key: Option<String>,
    /// Request timeout in seconds; falls back to `search.timeout`
    pub timeout: Option<f64>,
    /// Items requested per page
    pub page_size: usize,
    /// Count used when the query does not ask for one
    pub max_results: usize,
    /// Upper bound on results returned by one search
    pub result_cap: usize,
    /// Default sort criterion name
    pub sort_by: Option<String>,
    /// Total attempts per page request
    pub max_tries: u32,
    /// Delay between sequential page requests, in milliseconds
    pub page_delay_ms: u64,
    /// Additional provider-specific parameters (hl, gl, as_sdt, ...)
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ProviderKind::default(),
            disabled: false,
            base_url: None,
            api_key: None,
            timeout: None,
            page_size: 10,
            max_results: 10,
            result_cap: 10,
            sort_by: None,
            max_tries: 1,
            page_delay_ms: 1000,
            params: serde_json::Map::new(),
        }
    }
}

impl ProviderConfig {
    /// Config for `kind` with its default name and endpoint
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            name: kind.as_str().to_string(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = cap;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }

    /// Request timeout, falling back to `default` seconds
    pub fn timeout_or(&self, default: f64) -> crate::error::Result<Duration> {
        match self.timeout {
            Some(secs) => seconds(&format!("{}.timeout", self.name), secs),
            None => seconds("search.timeout", default),
        }
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// String parameter lookup with a fallback
    pub fn param_str(&self, key: &str, default: &str) -> String {
        match self.params.get(key) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => default.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("provider without a name");
        }
        Url::parse(self.endpoint()).map_err(|e| anyhow::anyhow!("{}: base_url: {}", self.name, e))?;
        if self.page_size == 0 || self.result_cap == 0 {
            anyhow::bail!("{}: page_size and result_cap must be positive", self.name);
        }
        if let Some(secs) = self.timeout {
            seconds(&format!("{}.timeout", self.name), secs)?;
        }
        Ok(())
    }
}

/// Convert a configured number of seconds into a `Duration`
pub fn seconds(field: &str, secs: f64) -> crate::error::Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(RelayError::Config(format!(
            "{} must be a positive number of seconds, got {}",
            field, secs
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| RelayError::Config(format!("{}: {}", field, e)))
}
