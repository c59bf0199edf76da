use std::time::Duration;

/// Configuration of the mapping resolution service.
///
/// Usable on its own via `Default`, or flattened into a host binary's CLI
/// (`#[command(flatten)]`), where every field can also come from the
/// environment.
#[derive(Debug, Clone, clap::Args)]
pub struct ResolutionConfig {
    /// Base URL of the configuration authority serving mapping rules.
    #[arg(long, env = "PROCESS_MAPPING_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,
    /// Path of the resolve endpoint, appended to `base_url`.
    #[arg(long, env = "PROCESS_MAPPING_RESOLVE_PATH", default_value = "/resolve")]
    pub resolve_path: String,
    /// Timeout for one remote resolve call in milliseconds.
    #[arg(long, env = "PROCESS_MAPPING_TIMEOUT_MS", default_value_t = 5_000)]
    pub request_timeout_ms: u64,
    /// Whether resolved mappings are cached.
    #[arg(long, env = "PROCESS_MAPPING_CACHE_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub cache_enabled: bool,
    /// Time-to-live of a cached mapping in milliseconds, measured from write.
    #[arg(long, env = "PROCESS_MAPPING_CACHE_TTL_MS", default_value_t = 300_000)]
    pub cache_ttl_ms: u64,
    /// Refresh entries in the background once they are older than half the TTL.
    #[arg(long, env = "PROCESS_MAPPING_BACKGROUND_REFRESH", default_value_t = true, action = clap::ArgAction::Set)]
    pub background_refresh: bool,
    /// Upper bound on cached mappings.
    #[arg(long, env = "PROCESS_MAPPING_MAX_CACHE_ENTRIES", default_value_t = 10_000)]
    pub max_cache_entries: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            resolve_path: "/resolve".to_string(),
            request_timeout_ms: 5_000,
            cache_enabled: true,
            cache_ttl_ms: 300_000,
            background_refresh: true,
            max_cache_entries: 10_000,
        }
    }
}

impl ResolutionConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Age after which a cached entry is refreshed in the background.
    #[must_use]
    pub fn refresh_after(&self) -> Duration {
        self.cache_ttl() / 2
    }

    /// Full URL of the resolve endpoint.
    #[must_use]
    pub fn resolve_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.resolve_path.trim_start_matches('/')
        )
    }

    /// Checks that the values can drive a resolution service.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.cache_enabled && self.cache_ttl_ms == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        if self.cache_enabled && self.max_cache_entries == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        Ok(())
    }
}

/// Invalid [`ResolutionConfig`] values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
    #[error("cache TTL must be greater than zero when caching is enabled")]
    ZeroTtl,
    #[error("cache capacity must be greater than zero when caching is enabled")]
    ZeroCapacity,
    #[error("base URL of the configuration authority is empty")]
    MissingBaseUrl,
}
