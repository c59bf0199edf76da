//! Per-invocation execution context handed to every plugin call.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::now_millis;
use crate::error::ConversionError;
use crate::mapping::ProcessMapping;

/// Identity and tenancy information of the caller, resolved outside this crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessContext {
    pub tenant_id: Option<String>,
    pub party_id: Option<String>,
    pub contract_id: Option<String>,
    pub product_id: Option<String>,
    pub channel_type: Option<String>,
    /// Authenticated user, if any.
    pub user_id: Option<String>,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
    pub feature_flags: BTreeSet<String>,
    /// Tenant configuration values made available to plugins.
    pub config: BTreeMap<String, serde_json::Value>,
}

impl BusinessContext {
    #[must_use]
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_party(mut self, party_id: impl Into<String>) -> Self {
        self.party_id = Some(party_id.into());
        self
    }

    #[must_use]
    pub fn with_contract(mut self, contract_id: impl Into<String>) -> Self {
        self.contract_id = Some(contract_id.into());
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
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    #[must_use]
    pub fn with_feature_flag(mut self, flag: impl Into<String>) -> Self {
        self.feature_flags.insert(flag.into());
        self
    }

    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// Everything a plugin sees about one invocation.
///
/// Built once per call and passed by shared reference, so plugins cannot
/// alter it. Nested process calls derive a [`child`](Self::child) context.
/// Header names are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExecutionContext {
    pub business: BusinessContext,
    pub process_id: String,
    pub operation_id: String,
    pub mapping: ProcessMapping,
    pub inputs: BTreeMap<String, serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    pub correlation_id: String,
    pub parent_execution_id: Option<Uuid>,
    pub execution_id: Uuid,
    /// Epoch milliseconds at which this execution started.
    pub started_at: u64,
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl ProcessExecutionContext {
    /// Fresh context for `mapping`. Process and operation ids are taken from
    /// the mapping; a new execution id and correlation id are generated.
    #[must_use]
    pub fn new(business: BusinessContext, mapping: ProcessMapping) -> Self {
        Self {
            business,
            process_id: mapping.process_id.clone(),
            operation_id: mapping.operation_id.clone(),
            mapping,
            inputs: BTreeMap::new(),
            headers: BTreeMap::new(),
            correlation_id: Uuid::new_v4().to_string(),
            parent_execution_id: None,
            execution_id: Uuid::new_v4(),
            started_at: now_millis(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: BTreeMap<String, serde_json::Value>) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Re-targets the context at another mapping (used with [`child`](Self::child)).
    #[must_use]
    pub fn with_mapping(mut self, mapping: ProcessMapping) -> Self {
        self.process_id.clone_from(&mapping.process_id);
        self.operation_id.clone_from(&mapping.operation_id);
        self.mapping = mapping;
        self
    }

    /// Context for a nested process call: a copy of this one with a new
    /// execution id, this execution as parent, and a reset start time.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            parent_execution_id: Some(self.execution_id),
            execution_id: Uuid::new_v4(),
            started_at: now_millis(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.business.tenant_id.as_deref()
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn raw_input(&self, key: &str) -> Option<&serde_json::Value> {
        self.inputs.get(key)
    }

    /// Converts a single input to `T`. `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Input`] if the value does not match `T`.
    pub fn input<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConversionError> {
        self.inputs
            .get(key)
            .map(|value| {
                T::deserialize(value).map_err(|source| ConversionError::Input {
                    key: key.to_string(),
                    target: std::any::type_name::<T>(),
                    source,
                })
            })
            .transpose()
    }

    /// Like [`input`](Self::input) but absence is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::MissingInput`] when the key is absent, or
    /// [`ConversionError::Input`] when it cannot be converted.
    pub fn require_input<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConversionError> {
        self.input(key)?.ok_or_else(|| ConversionError::MissingInput {
            key: key.to_string(),
        })
    }

    /// Converts the whole input map to `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Inputs`] if the map does not match `T`.
    pub fn inputs_as<T: DeserializeOwned>(&self) -> Result<T, ConversionError> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(object)).map_err(|source| {
            ConversionError::Inputs {
                target: std::any::type_name::<T>(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct TransferRequest {
        from_account: String,
        amount: u64,
    }

    fn ctx() -> ProcessExecutionContext {
        ProcessExecutionContext::new(
            BusinessContext::for_tenant("t1").with_party("party-9"),
            ProcessMapping::new("transfer", "transferV2"),
        )
        .with_input("fromAccount", json!("acc-1"))
        .with_input("amount", json!(250))
        .with_header("X-Request-Id", "req-1")
    }

    #[test]
    fn ids_come_from_mapping() {
        let ctx = ctx();
        assert_eq!(ctx.process_id, "transferV2");
        assert_eq!(ctx.operation_id, "transfer");
        assert_eq!(ctx.tenant_id(), Some("t1"));
        assert!(ctx.parent_execution_id.is_none());
        assert!(!ctx.correlation_id.is_empty());
    }

    #[test]
    fn typed_single_input() {
        let ctx = ctx();
        assert_eq!(ctx.input::<u64>("amount").unwrap(), Some(250));
        assert_eq!(ctx.input::<u64>("missing").unwrap(), None);
        assert!(matches!(
            ctx.input::<u64>("fromAccount"),
            Err(ConversionError::Input { .. })
        ));
        assert!(matches!(
            ctx.require_input::<String>("currency"),
            Err(ConversionError::MissingInput { .. })
        ));
    }

    #[test]
    fn typed_whole_input_map() {
        let request: TransferRequest = ctx().inputs_as().unwrap();
        assert_eq!(
            request,
            TransferRequest {
                from_account: "acc-1".to_string(),
                amount: 250
            }
        );

        let bad = ctx().with_input("amount", json!("lots"));
        assert!(matches!(
            bad.inputs_as::<TransferRequest>(),
            Err(ConversionError::Inputs { .. })
        ));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let ctx = ctx();
        assert_eq!(ctx.header("x-request-id"), Some("req-1"));
        assert_eq!(ctx.header("X-REQUEST-ID"), Some("req-1"));
        assert_eq!(ctx.header("missing"), None);
    }

    #[test]
    fn child_links_to_parent() {
        let parent = ctx().with_correlation_id("corr-1");
        let child = parent
            .child()
            .with_mapping(ProcessMapping::new("debit", "debitAccount"));

        assert_ne!(child.execution_id, parent.execution_id);
        assert_eq!(child.parent_execution_id, Some(parent.execution_id));
        assert_eq!(child.correlation_id, "corr-1");
        assert_eq!(child.inputs, parent.inputs);
        assert_eq!(child.process_id, "debitAccount");
        assert_eq!(child.operation_id, "debit");
        assert!(child.started_at >= parent.started_at);
    }
}
