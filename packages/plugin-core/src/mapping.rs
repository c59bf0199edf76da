//! Mapping rules: which plugin serves an operation for a tenant/product/channel.
//!
//! # Specificity
//!
//! When several rules match one request, the most specific wins:
//!
//! | field present | score |
//! |---------------|-------|
//! | `tenant_id`   | 100   |
//! | `product_id`  | 10    |
//! | `channel_type`| 1     |
//!
//! Equal scores are broken by `priority` (lower value wins). Rules that are
//! inactive or outside `[effective_from, effective_to]` never match.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Request coordinates used to resolve a mapping. Also the mapping cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub operation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<String>,
}

impl MappingQuery {
    /// Query for the vanilla (tenant-less) mapping of `operation_id`.
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            operation_id: operation_id.into(),
            product_id: None,
            channel_type: None,
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel_type: impl Into<String>) -> Self {
        self.channel_type = Some(channel_type.into());
        self
    }
}

fn default_active() -> bool {
    true
}

/// Rule binding an operation to a plugin id and optional version.
///
/// `tenant_id == None` marks a vanilla (global default) mapping. Timestamps are
/// epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMapping {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub api_path: Option<String>,
    #[serde(default)]
    pub http_method: Option<String>,
    pub operation_id: String,
    pub process_id: String,
    /// Pinned plugin version; `None` means the latest registered version.
    #[serde(default)]
    pub process_version: Option<String>,
    /// Tie-breaker between rules of equal specificity. Lower wins.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub effective_from: Option<u64>,
    #[serde(default)]
    pub effective_to: Option<u64>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl ProcessMapping {
    /// Active, unbounded, tenant-less rule mapping `operation_id` to `process_id`.
    pub fn new(operation_id: impl Into<String>, process_id: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            product_id: None,
            channel_type: None,
            api_path: None,
            http_method: None,
            operation_id: operation_id.into(),
            process_id: process_id.into(),
            process_version: None,
            priority: 0,
            active: true,
            effective_from: None,
            effective_to: None,
            parameters: BTreeMap::new(),
        }
    }

    /// Fallback used when no rule resolves: the operation id doubles as the
    /// vanilla process id, with no pinned version.
    pub fn default_for(operation_id: impl Into<String>) -> Self {
        let operation_id = operation_id.into();
        Self::new(operation_id.clone(), operation_id)
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel_type: impl Into<String>) -> Self {
        self.channel_type = Some(channel_type.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, http_method: impl Into<String>, api_path: impl Into<String>) -> Self {
        self.http_method = Some(http_method.into());
        self.api_path = Some(api_path.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.process_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    #[must_use]
    pub fn effective_between(mut self, from: Option<u64>, to: Option<u64>) -> Self {
        self.effective_from = from;
        self.effective_to = to;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn is_vanilla(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// 100 per tenant, 10 per product, 1 per channel.
    #[must_use]
    pub fn specificity(&self) -> u32 {
        let mut score = 0;
        if self.tenant_id.is_some() {
            score += 100;
        }
        if self.product_id.is_some() {
            score += 10;
        }
        if self.channel_type.is_some() {
            score += 1;
        }
        score
    }

    /// Active and `now_ms` within the (inclusive) effective window.
    #[must_use]
    pub fn is_effective_at(&self, now_ms: u64) -> bool {
        self.active
            && self.effective_from.map_or(true, |from| now_ms >= from)
            && self.effective_to.map_or(true, |to| now_ms <= to)
    }

    /// Whether this rule applies to `query`. Absent rule fields are wildcards.
    #[must_use]
    pub fn matches(&self, query: &MappingQuery) -> bool {
        fn field_matches(rule: Option<&String>, requested: Option<&String>) -> bool {
            match rule {
                None => true,
                Some(value) => requested == Some(value),
            }
        }

        self.operation_id == query.operation_id
            && field_matches(self.tenant_id.as_ref(), query.tenant_id.as_ref())
            && field_matches(self.product_id.as_ref(), query.product_id.as_ref())
            && field_matches(self.channel_type.as_ref(), query.channel_type.as_ref())
    }
}

/// Picks the rule serving `query` at `now_ms`: highest specificity, then
/// lowest priority, then first in input order.
pub fn select_mapping<'a, I>(rules: I, query: &MappingQuery, now_ms: u64) -> Option<&'a ProcessMapping>
where
    I: IntoIterator<Item = &'a ProcessMapping>,
{
    rules
        .into_iter()
        .filter(|rule| rule.matches(query) && rule.is_effective_at(now_ms))
        .min_by(|a, b| {
            b.specificity()
                .cmp(&a.specificity())
                .then_with(|| a.priority.cmp(&b.priority))
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn specificity_scores() {
        let base = ProcessMapping::new("transfer", "transfer");
        assert_eq!(base.specificity(), 0);
        assert_eq!(base.clone().with_channel("WEB").specificity(), 1);
        assert_eq!(base.clone().with_product("SAVINGS").specificity(), 10);
        assert_eq!(base.clone().with_tenant("t1").specificity(), 100);
        assert_eq!(
            base.with_tenant("t1").with_product("SAVINGS").with_channel("WEB").specificity(),
            111
        );
    }

    #[test]
    fn default_mapping_uses_operation_id() {
        let mapping = ProcessMapping::default_for("createAccount");
        assert_eq!(mapping.process_id, "createAccount");
        assert_eq!(mapping.operation_id, "createAccount");
        assert!(mapping.process_version.is_none());
        assert!(mapping.is_vanilla());
    }

    #[test]
    fn effective_window_is_inclusive_and_open_ended() {
        let bounded = ProcessMapping::new("op", "p").effective_between(Some(100), Some(200));
        assert!(!bounded.is_effective_at(99));
        assert!(bounded.is_effective_at(100));
        assert!(bounded.is_effective_at(200));
        assert!(!bounded.is_effective_at(201));

        let open = ProcessMapping::new("op", "p").effective_between(Some(100), None);
        assert!(open.is_effective_at(u64::MAX));

        assert!(!ProcessMapping::new("op", "p").inactive().is_effective_at(150));
    }

    #[test]
    fn most_specific_rule_wins() {
        let rules = vec![
            ProcessMapping::new("transfer", "transfer"),
            ProcessMapping::new("transfer", "transferTenant").with_tenant("t1"),
            ProcessMapping::new("transfer", "transferTenantWeb")
                .with_tenant("t1")
                .with_channel("WEB"),
            ProcessMapping::new("transfer", "transferProduct").with_product("SAVINGS"),
        ];

        let web = MappingQuery::new("transfer").with_tenant("t1").with_channel("WEB");
        assert_eq!(select_mapping(&rules, &web, 0).unwrap().process_id, "transferTenantWeb");

        let mobile = MappingQuery::new("transfer").with_tenant("t1").with_channel("MOBILE");
        assert_eq!(select_mapping(&rules, &mobile, 0).unwrap().process_id, "transferTenant");

        let other = MappingQuery::new("transfer").with_tenant("t2").with_product("SAVINGS");
        assert_eq!(select_mapping(&rules, &other, 0).unwrap().process_id, "transferProduct");

        let anon = MappingQuery::new("transfer");
        assert_eq!(select_mapping(&rules, &anon, 0).unwrap().process_id, "transfer");
    }

    #[test]
    fn priority_breaks_ties_lower_first() {
        let rules = vec![
            ProcessMapping::new("op", "second").with_tenant("t").with_priority(5),
            ProcessMapping::new("op", "first").with_tenant("t").with_priority(1),
        ];
        let query = MappingQuery::new("op").with_tenant("t");
        assert_eq!(select_mapping(&rules, &query, 0).unwrap().process_id, "first");
    }

    #[test]
    fn rules_outside_window_are_excluded() {
        let rules = vec![
            ProcessMapping::new("op", "vanilla"),
            ProcessMapping::new("op", "expired")
                .with_tenant("t")
                .effective_between(None, Some(1_000)),
            ProcessMapping::new("op", "disabled").with_tenant("t").inactive(),
        ];
        let query = MappingQuery::new("op").with_tenant("t");
        assert_eq!(select_mapping(&rules, &query, 5_000).unwrap().process_id, "vanilla");
        assert_eq!(select_mapping(&rules, &query, 500).unwrap().process_id, "expired");
    }

    #[test]
    fn no_matching_rule_yields_none() {
        let rules = vec![ProcessMapping::new("other", "other")];
        assert!(select_mapping(&rules, &MappingQuery::new("op"), 0).is_none());
    }

    #[test]
    fn deserializes_minimal_remote_record() {
        let mapping: ProcessMapping = serde_json::from_value(json!({
            "operationId": "transfer",
            "processId": "transferV2",
            "processVersion": "2.0.0",
            "tenantId": "t1"
        }))
        .unwrap();
        assert_eq!(mapping.process_id, "transferV2");
        assert_eq!(mapping.process_version.as_deref(), Some("2.0.0"));
        assert!(mapping.active);
        assert_eq!(mapping.priority, 0);
        assert!(!mapping.is_vanilla());
    }

    #[test]
    fn query_serialization_omits_absent_fields() {
        let query = MappingQuery::new("transfer").with_channel("WEB");
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json, json!({"operationId": "transfer", "channelType": "WEB"}));
    }
}
