//! Bootstrap scenarios: registration, resolution, lookup and dispatch wired together.

use std::sync::Arc;

use async_trait::async_trait;
use process_plugin_core::{
    BusinessContext, DelegatingPlugin, PluginMetadata, ProcessExecutionContext, ProcessMapping,
    ProcessPlugin, ProcessResult,
};
use process_plugin_runtime::{
    DispatchRequest, MappingResolutionService, PluginRegistry, ProcessDispatcher,
    ResolutionConfig, StaticMappingSource,
};
use serde_json::json;

struct Versioned {
    metadata: PluginMetadata,
}

impl Versioned {
    fn plugin(process_id: &str, version: &str, capabilities: &[&str]) -> Arc<dyn ProcessPlugin> {
        let metadata = capabilities
            .iter()
            .fold(PluginMetadata::new(process_id, version), |m, c| m.with_capability(*c));
        Arc::new(Self { metadata })
    }
}

#[async_trait]
impl ProcessPlugin for Versioned {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn execute(&self, _ctx: &ProcessExecutionContext) -> anyhow::Result<ProcessResult> {
        Ok(ProcessResult::success(json!({ "version": self.version() })))
    }
}

fn resolver(rules: Vec<ProcessMapping>) -> MappingResolutionService {
    MappingResolutionService::new(
        Arc::new(StaticMappingSource::new(rules)),
        &ResolutionConfig::default(),
    )
}

#[tokio::test]
async fn create_account_resolves_to_default_mapping_and_registered_plugin() {
    let registry = PluginRegistry::new();
    let plugin = Versioned::plugin("createAccount", "1.0.0", &["ACCOUNT_CREATION"]);
    registry.register(Arc::clone(&plugin));

    let mapping = resolver(Vec::new())
        .resolve_mapping(None, "createAccount", None, None)
        .await;
    assert_eq!(mapping.process_id, "createAccount");
    assert!(mapping.process_version.is_none());

    let found = registry
        .find_async(&mapping.process_id, mapping.process_version.as_deref())
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&found, &plugin));
    assert_eq!(registry.find_by_capability("ACCOUNT_CREATION").len(), 1);
}

#[tokio::test]
async fn release_outranks_snapshot_registered_earlier() {
    let registry = PluginRegistry::new();
    registry.register(Versioned::plugin("transfer", "1.0.0-SNAPSHOT", &[]));
    registry.register(Versioned::plugin("transfer", "1.0.0", &[]));

    assert_eq!(registry.get("transfer").unwrap().version(), "1.0.0");
    assert_eq!(registry.versions("transfer"), vec!["1.0.0-SNAPSHOT", "1.0.0"]);
}

#[tokio::test]
async fn tenant_rule_routes_to_customized_plugin_through_dispatcher() {
    let registry = Arc::new(PluginRegistry::new());
    registry.register(Versioned::plugin("transfer", "1.0.0", &["PAYMENTS"]));
    registry.register(Versioned::plugin("transfer", "2.0.0", &["PAYMENTS"]));

    let vanilla = Versioned::plugin("transfer", "1.0.0", &[]);
    let custom: Arc<dyn ProcessPlugin> = Arc::new(DelegatingPlugin::with_overrides(vanilla, |m| PluginMetadata {
        process_id: "transferBankA".to_string(),
        ..m
    }));
    registry.register(custom);

    let dispatcher = ProcessDispatcher::new(
        Arc::clone(&registry),
        resolver(vec![ProcessMapping::new("transfer", "transferBankA").with_tenant("bank-a")]),
    );

    let bank_a = dispatcher
        .dispatch(DispatchRequest::new(BusinessContext::for_tenant("bank-a"), "transfer"))
        .await;
    assert!(bank_a.result.is_success());
    assert_eq!(bank_a.context.process_id, "transferBankA");

    let bank_b = dispatcher
        .dispatch(DispatchRequest::new(BusinessContext::for_tenant("bank-b"), "transfer"))
        .await;
    assert_eq!(bank_b.context.process_id, "transfer");
    assert_eq!(bank_b.result.output.as_ref().unwrap()["version"], "2.0.0");

    let health = registry.health_report().await;
    assert_eq!(health.len(), 2);
    assert!(health.values().all(|h| h.is_healthy()));
}
