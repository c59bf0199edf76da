//! Multi-version plugin registry with capability-based discovery.
//!
//! Plugins are keyed by `(process_id, version)`. Several versions of one
//! process coexist; lookups without a version return the latest one under
//! [`compare_versions`]. A capability index maps each capability to the
//! process ids that declare it in at least one registered version.
//!
//! All state lives in [`DashMap`]s, so registration and lookup can run
//! concurrently without caller-side locking. Mutations always lock the plugin
//! entry before the capability index; readers never hold an index guard while
//! touching the plugin map.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use process_plugin_core::version::{compare_versions, sort_versions};
use process_plugin_core::{HealthStatus, ProcessPlugin};
use tracing::{info, warn};

type Versions = HashMap<String, Arc<dyn ProcessPlugin>>;

fn latest_of(versions: &Versions) -> Option<Arc<dyn ProcessPlugin>> {
    versions
        .iter()
        .max_by(|(a, _), (b, _)| compare_versions(a, b))
        .map(|(_, plugin)| Arc::clone(plugin))
}

fn sort_by_process_id(plugins: &mut [Arc<dyn ProcessPlugin>]) {
    plugins.sort_by(|a, b| a.process_id().cmp(b.process_id()));
}

/// Thread-safe catalogue of loaded plugins.
pub struct PluginRegistry {
    /// process id -> version -> plugin.
    plugins: DashMap<String, Versions>,
    /// capability -> process ids declaring it.
    capabilities: DashMap<String, HashSet<String>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: DashMap::new(),
            capabilities: DashMap::new(),
        }
    }

    /// Registers `plugin` under its `(process_id, version)`, replacing any
    /// plugin already registered under the same pair.
    pub fn register(&self, plugin: Arc<dyn ProcessPlugin>) {
        let process_id = plugin.process_id().to_string();
        let version = plugin.version().to_string();
        let declared: Vec<String> = plugin.metadata().capabilities.iter().cloned().collect();

        let mut entry = self.plugins.entry(process_id.clone()).or_default();
        let replaced = entry.insert(version.clone(), plugin);

        for capability in &declared {
            self.index(capability, &process_id);
        }
        // A replaced instance may have declared capabilities the new one drops.
        if let Some(old) = &replaced {
            for capability in &old.metadata().capabilities {
                if !entry.values().any(|p| p.metadata().has_capability(capability)) {
                    self.unindex(capability, &process_id);
                }
            }
        }
        drop(entry);

        info!(
            process_id = %process_id,
            version = %version,
            capabilities = ?declared,
            replaced = replaced.is_some(),
            "Plugin registered"
        );
    }

    /// Removes one version of a process. Capabilities stay indexed while any
    /// remaining version declares them; the process disappears with its last
    /// version.
    pub fn unregister(&self, process_id: &str, version: &str) -> Option<Arc<dyn ProcessPlugin>> {
        let Entry::Occupied(mut entry) = self.plugins.entry(process_id.to_string()) else {
            return None;
        };
        let removed = entry.get_mut().remove(version)?;

        for capability in &removed.metadata().capabilities {
            let still_declared = entry
                .get()
                .values()
                .any(|p| p.metadata().has_capability(capability));
            if !still_declared {
                self.unindex(capability, process_id);
            }
        }
        if entry.get().is_empty() {
            entry.remove();
        }

        info!(process_id = %process_id, version = %version, "Plugin version unregistered");
        Some(removed)
    }

    /// Removes every version of a process, returned in ascending version order.
    pub fn unregister_all(&self, process_id: &str) -> Vec<Arc<dyn ProcessPlugin>> {
        let Entry::Occupied(mut entry) = self.plugins.entry(process_id.to_string()) else {
            return Vec::new();
        };
        let versions = std::mem::take(entry.get_mut());
        for plugin in versions.values() {
            for capability in &plugin.metadata().capabilities {
                self.unindex(capability, process_id);
            }
        }
        entry.remove();

        let mut removed: Vec<(String, Arc<dyn ProcessPlugin>)> = versions.into_iter().collect();
        removed.sort_by(|(a, _), (b, _)| compare_versions(a, b));
        info!(process_id = %process_id, versions = removed.len(), "Plugin unregistered");
        removed.into_iter().map(|(_, plugin)| plugin).collect()
    }

    /// Latest version of a process.
    pub fn get(&self, process_id: &str) -> Option<Arc<dyn ProcessPlugin>> {
        self.plugins
            .get(process_id)
            .and_then(|versions| latest_of(&versions))
    }

    /// Exact `(process_id, version)` lookup.
    pub fn get_version(&self, process_id: &str, version: &str) -> Option<Arc<dyn ProcessPlugin>> {
        self.plugins
            .get(process_id)
            .and_then(|versions| versions.get(version).cloned())
    }

    /// Pinned version when given, latest otherwise.
    pub fn find(&self, process_id: &str, version: Option<&str>) -> Option<Arc<dyn ProcessPlugin>> {
        match version {
            Some(version) => self.get_version(process_id, version),
            None => self.get(process_id),
        }
    }

    /// Async form of [`find`](Self::find) for callers composing futures. The
    /// lookup itself never waits.
    #[allow(clippy::unused_async)]
    pub async fn find_async(
        &self,
        process_id: &str,
        version: Option<&str>,
    ) -> Option<Arc<dyn ProcessPlugin>> {
        self.find(process_id, version)
    }

    /// Latest version of every process declaring `capability`, ordered by process id.
    pub fn find_by_capability(&self, capability: &str) -> Vec<Arc<dyn ProcessPlugin>> {
        let process_ids: Vec<String> = self
            .capabilities
            .get(capability)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let mut found: Vec<_> = process_ids.iter().filter_map(|id| self.get(id)).collect();
        sort_by_process_id(&mut found);
        found
    }

    /// Latest versions whose metadata category equals `category`.
    pub fn find_by_category(&self, category: &str) -> Vec<Arc<dyn ProcessPlugin>> {
        self.latest_matching(|p| p.metadata().category.as_deref() == Some(category))
    }

    /// Latest versions flagged as vanilla (default) implementations.
    pub fn find_vanilla_plugins(&self) -> Vec<Arc<dyn ProcessPlugin>> {
        self.latest_matching(|p| p.metadata().vanilla)
    }

    fn latest_matching<F>(&self, predicate: F) -> Vec<Arc<dyn ProcessPlugin>>
    where
        F: Fn(&Arc<dyn ProcessPlugin>) -> bool,
    {
        let mut found: Vec<_> = self
            .plugins
            .iter()
            .filter_map(|entry| latest_of(entry.value()))
            .filter(|plugin| predicate(plugin))
            .collect();
        sort_by_process_id(&mut found);
        found
    }

    /// Latest version of every registered process, ordered by process id.
    pub fn latest_plugins(&self) -> Vec<Arc<dyn ProcessPlugin>> {
        self.latest_matching(|_| true)
    }

    /// Number of distinct process ids.
    pub fn size(&self) -> usize {
        self.plugins.len()
    }

    /// Number of registered `(process_id, version)` pairs.
    pub fn total_version_count(&self) -> usize {
        self.plugins.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn contains(&self, process_id: &str) -> bool {
        self.plugins.contains_key(process_id)
    }

    /// Registered process ids, sorted.
    pub fn process_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Registered versions of a process, ascending.
    pub fn versions(&self, process_id: &str) -> Vec<String> {
        let mut versions: Vec<String> = self
            .plugins
            .get(process_id)
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        sort_versions(&mut versions);
        versions
    }

    /// Indexed capabilities, sorted.
    pub fn capabilities(&self) -> Vec<String> {
        let mut caps: Vec<String> = self.capabilities.iter().map(|e| e.key().clone()).collect();
        caps.sort();
        caps
    }

    /// Drops every plugin and the capability index. Administrative/test use.
    pub fn clear(&self) {
        self.plugins.clear();
        self.capabilities.clear();
        info!("Plugin registry cleared");
    }

    /// Runs `on_init` and registers the plugin only if it succeeds.
    ///
    /// # Errors
    ///
    /// Returns the `on_init` error; the plugin is not registered.
    pub async fn register_and_init(&self, plugin: Arc<dyn ProcessPlugin>) -> anyhow::Result<()> {
        plugin.on_init().await.map_err(|e| {
            e.context(format!(
                "initializing plugin {}:{}",
                plugin.process_id(),
                plugin.version()
            ))
        })?;
        self.register(plugin);
        Ok(())
    }

    /// Unregisters every version of a process and runs `on_destroy` on each.
    /// Destroy failures are logged, not returned.
    pub async fn unregister_and_destroy(&self, process_id: &str) -> Vec<Arc<dyn ProcessPlugin>> {
        let removed = self.unregister_all(process_id);
        for plugin in &removed {
            if let Err(e) = plugin.on_destroy().await {
                warn!(
                    process_id = %plugin.process_id(),
                    version = %plugin.version(),
                    error = %e,
                    "Plugin on_destroy failed"
                );
            }
        }
        removed
    }

    /// Health of the latest version of every process, polled concurrently.
    pub async fn health_report(&self) -> BTreeMap<String, HealthStatus> {
        let plugins = self.latest_plugins();
        let statuses = join_all(plugins.iter().map(|p| p.health_check())).await;
        plugins
            .iter()
            .map(|p| p.process_id().to_string())
            .zip(statuses)
            .collect()
    }

    fn index(&self, capability: &str, process_id: &str) {
        self.capabilities
            .entry(capability.to_string())
            .or_default()
            .insert(process_id.to_string());
    }

    fn unindex(&self, capability: &str, process_id: &str) {
        if let Entry::Occupied(mut entry) = self.capabilities.entry(capability.to_string()) {
            entry.get_mut().remove(process_id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("processes", &self.size())
            .field("versions", &self.total_version_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
