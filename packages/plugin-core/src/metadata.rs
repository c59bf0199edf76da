//! Descriptive metadata a plugin reports about itself.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Descriptive and policy data attached to a plugin.
///
/// Built once with the fluent `with_*` helpers and never mutated afterwards.
/// The registry indexes plugins by `process_id`, `version`, `capabilities`,
/// `category`, and `vanilla`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    /// Stable identifier shared by every version of the process.
    pub process_id: String,
    /// Version string, ordered by [`crate::version::compare_versions`].
    pub version: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Capabilities used for discovery via `find_by_capability`.
    pub capabilities: BTreeSet<String>,
    pub required_permissions: BTreeSet<String>,
    pub required_roles: BTreeSet<String>,
    pub required_features: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    /// Marks the default implementation used when no tenant-specific one exists.
    pub vanilla: bool,
    pub deprecated: bool,
    /// Process id superseding this one, when deprecated.
    pub replaced_by: Option<String>,
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl PluginMetadata {
    /// Creates metadata with the given identity. The name defaults to the process id.
    pub fn new(process_id: impl Into<String>, version: impl Into<String>) -> Self {
        let process_id = process_id.into();
        Self {
            name: process_id.clone(),
            process_id,
            version: version.into(),
            description: None,
            category: None,
            capabilities: BTreeSet::new(),
            required_permissions: BTreeSet::new(),
            required_roles: BTreeSet::new(),
            required_features: BTreeSet::new(),
            tags: BTreeSet::new(),
            vanilla: false,
            deprecated: false,
            replaced_by: None,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_required_permission(mut self, permission: impl Into<String>) -> Self {
        self.required_permissions.insert(permission.into());
        self
    }

    #[must_use]
    pub fn with_required_role(mut self, role: impl Into<String>) -> Self {
        self.required_roles.insert(role.into());
        self
    }

    #[must_use]
    pub fn with_required_feature(mut self, feature: impl Into<String>) -> Self {
        self.required_features.insert(feature.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn vanilla(mut self) -> Self {
        self.vanilla = true;
        self
    }

    /// Marks the plugin deprecated, optionally pointing at its successor.
    #[must_use]
    pub fn deprecated(mut self, replaced_by: Option<String>) -> Self {
        self.deprecated = true;
        self.replaced_by = replaced_by;
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_name_to_process_id() {
        let meta = PluginMetadata::new("createAccount", "1.0.0");
        assert_eq!(meta.name, "createAccount");
        assert!(!meta.vanilla);
        assert!(!meta.deprecated);
        assert!(meta.capabilities.is_empty());
    }

    #[test]
    fn builder_collects_sets() {
        let meta = PluginMetadata::new("transfer", "2.0.0")
            .with_capabilities(["PAYMENTS", "TRANSFER"])
            .with_capability("PAYMENTS")
            .with_required_role("teller")
            .with_tag("core")
            .with_category("payments")
            .vanilla();

        assert_eq!(meta.capabilities.len(), 2);
        assert!(meta.has_capability("TRANSFER"));
        assert!(meta.required_roles.contains("teller"));
        assert_eq!(meta.category.as_deref(), Some("payments"));
        assert!(meta.vanilla);
    }

    #[test]
    fn deprecated_records_successor() {
        let meta = PluginMetadata::new("legacyTransfer", "1.0.0")
            .deprecated(Some("transfer".to_string()));
        assert!(meta.deprecated);
        assert_eq!(meta.replaced_by.as_deref(), Some("transfer"));
    }

    #[test]
    fn serializes_camel_case() {
        let meta = PluginMetadata::new("p", "1").with_required_permission("accounts:write");
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["processId"], "p");
        assert_eq!(json["requiredPermissions"][0], "accounts:write");
    }
}
