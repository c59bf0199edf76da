//! Configuration authorities that answer "which rule serves this request".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use process_plugin_core::{select_mapping, ClockSource, MappingQuery, ProcessMapping, SystemClock};
use reqwest::StatusCode;

use crate::config::ResolutionConfig;

/// Errors from a [`MappingSource`]. The resolution service absorbs all of
/// them and falls back to the default mapping.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("configuration authority answered with status {status}")]
    UnexpectedStatus { status: u16 },
    #[error("malformed mapping response: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("mapping response has an empty process id")]
    EmptyProcessId,
    #[error("mapping source unavailable: {0}")]
    Unavailable(String),
}

/// Remote (or in-memory) authority resolving a [`MappingQuery`] to a rule.
///
/// `Ok(None)` means no rule matches, which is a valid answer, not an error.
#[async_trait]
pub trait MappingSource: Send + Sync {
    async fn resolve(&self, query: &MappingQuery) -> Result<Option<ProcessMapping>, SourceError>;
}

// ---------------------------------------------------------------------------
// HttpMappingSource
// ---------------------------------------------------------------------------

/// Queries `GET {base_url}{resolve_path}?tenantId=&operationId=&productId=&channelType=`.
///
/// Absent query fields are omitted. `404`, `204`, an empty body, or JSON
/// `null` all mean "no rule".
#[derive(Debug, Clone)]
pub struct HttpMappingSource {
    client: reqwest::Client,
    url: String,
}

impl HttpMappingSource {
    /// Builds a client whose per-request timeout is the configured resolve timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &ResolutionConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.resolve_url(),
        })
    }

    /// Uses an existing client, e.g. one shared with other callers.
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MappingSource for HttpMappingSource {
    async fn resolve(&self, query: &MappingQuery) -> Result<Option<ProcessMapping>, SourceError> {
        let response = self.client.get(&self.url).query(query).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let mapping: Option<ProcessMapping> =
            serde_json::from_slice(&body).map_err(SourceError::Malformed)?;
        match mapping {
            Some(m) if m.process_id.trim().is_empty() => Err(SourceError::EmptyProcessId),
            other => Ok(other),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticMappingSource
// ---------------------------------------------------------------------------

/// In-memory rule set applying the specificity policy of
/// [`select_mapping`]. Serves bootstrap configurations and tests, and is the
/// reference behaviour expected of a remote authority.
pub struct StaticMappingSource {
    rules: RwLock<Vec<ProcessMapping>>,
    clock: Arc<dyn ClockSource>,
    lookups: AtomicU64,
}

impl StaticMappingSource {
    #[must_use]
    pub fn new(rules: Vec<ProcessMapping>) -> Self {
        Self::with_clock(rules, Arc::new(SystemClock))
    }

    /// Uses `clock` to evaluate effective windows.
    #[must_use]
    pub fn with_clock(rules: Vec<ProcessMapping>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            rules: RwLock::new(rules),
            clock,
            lookups: AtomicU64::new(0),
        }
    }

    pub fn add_rule(&self, rule: ProcessMapping) {
        self.rules.write().push(rule);
    }

    pub fn replace_rules(&self, rules: Vec<ProcessMapping>) {
        *self.rules.write() = rules;
    }

    #[must_use]
    pub fn rules(&self) -> Vec<ProcessMapping> {
        self.rules.read().clone()
    }

    /// Number of `resolve` calls served so far.
    #[must_use]
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Default for StaticMappingSource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl MappingSource for StaticMappingSource {
    async fn resolve(&self, query: &MappingQuery) -> Result<Option<ProcessMapping>, SourceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let rules = self.rules.read();
        Ok(select_mapping(rules.iter(), query, now).cloned())
    }
}
