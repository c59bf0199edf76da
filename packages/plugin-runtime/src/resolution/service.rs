//! Per-request mapping resolution with caching and default fallback.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use process_plugin_core::{MappingQuery, ProcessMapping};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::cache::{CacheStats, Lookup, MappingCache};
use super::source::{HttpMappingSource, MappingSource, SourceError};
use crate::config::ResolutionConfig;

/// Why a remote lookup produced no rule.
#[derive(Debug, thiserror::Error)]
enum FetchFailure {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("resolve call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// A load in progress and the cache generation it started under.
#[derive(Clone)]
struct InFlight {
    generation: u64,
    cell: Arc<OnceCell<ProcessMapping>>,
}

impl InFlight {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            cell: Arc::new(OnceCell::new()),
        }
    }
}

/// Drops the in-flight slot of a load when its caller finishes or is
/// cancelled. A slot already replaced by a newer load is left alone.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<MappingQuery, InFlight>,
    query: &'a MappingQuery,
    cell: Arc<OnceCell<ProcessMapping>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(self.query, |_, current| Arc::ptr_eq(&current.cell, &self.cell));
    }
}

struct Inner {
    source: Arc<dyn MappingSource>,
    cache: Option<MappingCache>,
    timeout: Duration,
    /// Loads in progress, so concurrent misses on one key share a fetch.
    /// Callers never join a load that started before an invalidation.
    in_flight: DashMap<MappingQuery, InFlight>,
}

impl Inner {
    async fn fetch(&self, query: &MappingQuery) -> Result<Option<ProcessMapping>, FetchFailure> {
        match tokio::time::timeout(self.timeout, self.source.resolve(query)).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(FetchFailure::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Remote lookup that never fails: no rule, errors, and timeouts all
    /// degrade to [`ProcessMapping::default_for`].
    async fn fetch_or_default(&self, query: &MappingQuery) -> ProcessMapping {
        match self.fetch(query).await {
            Ok(Some(mapping)) => {
                debug!(
                    operation_id = %query.operation_id,
                    tenant_id = ?query.tenant_id,
                    process_id = %mapping.process_id,
                    process_version = ?mapping.process_version,
                    "Mapping resolved"
                );
                mapping
            }
            Ok(None) => {
                debug!(
                    operation_id = %query.operation_id,
                    tenant_id = ?query.tenant_id,
                    "No mapping rule, using default"
                );
                ProcessMapping::default_for(&query.operation_id)
            }
            Err(e) => {
                warn!(
                    operation_id = %query.operation_id,
                    tenant_id = ?query.tenant_id,
                    error = %e,
                    "Mapping resolution failed, using default"
                );
                ProcessMapping::default_for(&query.operation_id)
            }
        }
    }
}

/// Decides which plugin id/version serves a request.
///
/// Cheap to clone; clones share the cache and the source.
#[derive(Clone)]
pub struct MappingResolutionService {
    inner: Arc<Inner>,
}

impl MappingResolutionService {
    /// Service over `source`, with caching as configured.
    #[must_use]
    pub fn new(source: Arc<dyn MappingSource>, config: &ResolutionConfig) -> Self {
        let cache = config.cache_enabled.then(|| {
            MappingCache::new(
                config.cache_ttl(),
                config.background_refresh.then(|| config.refresh_after()),
                config.max_cache_entries,
            )
        });
        Self {
            inner: Arc::new(Inner {
                source,
                cache,
                timeout: config.request_timeout(),
                in_flight: DashMap::new(),
            }),
        }
    }

    /// Service backed by the HTTP configuration authority in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &ResolutionConfig) -> Result<Self, SourceError> {
        let source = HttpMappingSource::new(config)?;
        Ok(Self::new(Arc::new(source), config))
    }

    /// Resolves the mapping for `(tenant, operation, product, channel)`.
    /// Never fails; see [`resolve`](Self::resolve).
    pub async fn resolve_mapping(
        &self,
        tenant_id: Option<&str>,
        operation_id: &str,
        product_id: Option<&str>,
        channel_type: Option<&str>,
    ) -> ProcessMapping {
        let query = MappingQuery {
            tenant_id: tenant_id.map(str::to_string),
            operation_id: operation_id.to_string(),
            product_id: product_id.map(str::to_string),
            channel_type: channel_type.map(str::to_string),
        };
        self.resolve(query).await
    }

    /// Resolves `query`, serving from cache when possible. When the remote
    /// authority has no rule, fails, or times out, the result is the default
    /// mapping whose process id is the operation id.
    pub async fn resolve(&self, query: MappingQuery) -> ProcessMapping {
        let Some(cache) = &self.inner.cache else {
            return self.inner.fetch_or_default(&query).await;
        };

        match cache.lookup(&query) {
            Lookup::Fresh(mapping) => {
                debug!(operation_id = %query.operation_id, tenant_id = ?query.tenant_id, "Mapping cache hit");
                mapping
            }
            Lookup::Stale(mapping) => {
                self.spawn_refresh(query);
                mapping
            }
            Lookup::Miss => self.load(cache, query).await,
        }
    }

    async fn load(&self, cache: &MappingCache, query: MappingQuery) -> ProcessMapping {
        let current = cache.generation();
        let InFlight { generation, cell } = {
            let mut slot = self
                .inner
                .in_flight
                .entry(query.clone())
                .or_insert_with(|| InFlight::new(current));
            if slot.generation < current {
                *slot = InFlight::new(current);
            }
            slot.clone()
        };
        let _guard = InFlightGuard {
            in_flight: &self.inner.in_flight,
            query: &query,
            cell: Arc::clone(&cell),
        };

        let mapping = cell
            .get_or_init(|| async {
                let mapping = self.inner.fetch_or_default(&query).await;
                cache.insert(query.clone(), mapping.clone(), generation);
                mapping
            })
            .await
            .clone();
        mapping
    }

    /// Re-fetches `query` off the request path. A failed refresh keeps the
    /// cached value; a "no rule" answer replaces it with the default mapping.
    fn spawn_refresh(&self, query: MappingQuery) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let Some(cache) = &inner.cache else { return };
            let generation = cache.generation();
            match inner.fetch(&query).await {
                Ok(found) => {
                    let mapping =
                        found.unwrap_or_else(|| ProcessMapping::default_for(&query.operation_id));
                    debug!(operation_id = %query.operation_id, tenant_id = ?query.tenant_id, "Mapping refreshed");
                    cache.insert(query, mapping, generation);
                }
                Err(e) => {
                    warn!(
                        operation_id = %query.operation_id,
                        tenant_id = ?query.tenant_id,
                        error = %e,
                        "Background mapping refresh failed, keeping cached value"
                    );
                    cache.release_refresh(&query);
                }
            }
        });
    }

    /// Drops cached mappings of one tenant. Other tenants and vanilla
    /// entries stay cached.
    #[allow(clippy::unused_async)]
    pub async fn invalidate_tenant(&self, tenant_id: &str) {
        if let Some(cache) = &self.inner.cache {
            let removed = cache.invalidate_tenant(tenant_id);
            debug!(tenant_id = %tenant_id, removed, "Mapping cache invalidated for tenant");
        }
    }

    #[allow(clippy::unused_async)]
    pub async fn invalidate_all(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.invalidate_all();
            debug!("Mapping cache cleared");
        }
    }

    pub fn is_caching(&self) -> bool {
        self.inner.cache.is_some()
    }

    /// Number of cached mappings (`0` when caching is disabled).
    pub fn cache_size(&self) -> usize {
        self.inner.cache.as_ref().map_or(0, MappingCache::len)
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner
            .cache
            .as_ref()
            .map(MappingCache::stats)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for MappingResolutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingResolutionService")
            .field("caching", &self.is_caching())
            .field("timeout", &self.inner.timeout)
            .field("cache_size", &self.cache_size())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
