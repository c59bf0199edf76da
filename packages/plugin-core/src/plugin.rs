//! The contract every business-logic plugin implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ProcessExecutionContext;
use crate::health::HealthStatus;
use crate::metadata::PluginMetadata;
use crate::result::ProcessResult;
use crate::validation::ValidationResult;

/// A runtime-pluggable unit of business logic.
///
/// Plugins are registered in a registry under `(process_id, version)` and
/// invoked through `Arc<dyn ProcessPlugin>`. Expected failures should be
/// returned as [`ProcessResult::business_error`] or
/// [`ProcessResult::technical_error`]; an `Err` is treated as an unexpected
/// fault by the caller.
///
/// Callers are expected to run `validate` before `execute`, but nothing here
/// enforces that order. `compensate` receives the context of the original
/// execution and reverses its effects.
#[async_trait]
pub trait ProcessPlugin: Send + Sync {
    /// Identity, capabilities, and policy data of this plugin.
    fn metadata(&self) -> &PluginMetadata;

    fn process_id(&self) -> &str {
        &self.metadata().process_id
    }

    fn version(&self) -> &str {
        &self.metadata().version
    }

    /// Performs the business operation. Must be safe to call repeatedly.
    async fn execute(&self, ctx: &ProcessExecutionContext) -> anyhow::Result<ProcessResult>;

    /// Pre-execution input validation. Default: always valid.
    async fn validate(&self, _ctx: &ProcessExecutionContext) -> anyhow::Result<ValidationResult> {
        Ok(ValidationResult::valid())
    }

    /// Reverses a prior successful `execute` (saga rollback).
    /// Default: succeeds and marks the result compensated.
    async fn compensate(&self, _ctx: &ProcessExecutionContext) -> anyhow::Result<ProcessResult> {
        Ok(ProcessResult::compensated())
    }

    /// Called once when the plugin is loaded.
    async fn on_init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once when the plugin is unloaded.
    async fn on_destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Liveness of the plugin's external dependencies. Default: up.
    async fn health_check(&self) -> HealthStatus {
        HealthStatus::up()
    }

    /// The wrapped plugin when `self` is a decorator; `None` for concrete plugins.
    fn delegate(&self) -> Option<&Arc<dyn ProcessPlugin>> {
        None
    }
}

/// Strips every decorator layer and returns the innermost plugin.
#[must_use]
pub fn unwrap_plugin(plugin: &Arc<dyn ProcessPlugin>) -> Arc<dyn ProcessPlugin> {
    let mut current = Arc::clone(plugin);
    loop {
        let next = match current.delegate() {
            Some(inner) => Arc::clone(inner),
            None => return current,
        };
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::BusinessContext;
    use crate::health::HealthState;
    use crate::mapping::ProcessMapping;

    struct EchoPlugin {
        meta: PluginMetadata,
    }

    #[async_trait]
    impl ProcessPlugin for EchoPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.meta
        }

        async fn execute(&self, ctx: &ProcessExecutionContext) -> anyhow::Result<ProcessResult> {
            Ok(ProcessResult::success(json!({ "echo": ctx.inputs })))
        }
    }

    fn ctx() -> ProcessExecutionContext {
        ProcessExecutionContext::new(
            BusinessContext::default(),
            ProcessMapping::default_for("echo"),
        )
        .with_input("msg", json!("hi"))
    }

    #[tokio::test]
    async fn defaults_are_permissive() {
        let plugin = EchoPlugin {
            meta: PluginMetadata::new("echo", "1.0.0"),
        };
        let ctx = ctx();

        assert!(plugin.validate(&ctx).await.unwrap().is_valid());
        assert!(plugin.compensate(&ctx).await.unwrap().is_compensated());
        assert_eq!(plugin.health_check().await.state, HealthState::Up);
        plugin.on_init().await.unwrap();
        plugin.on_destroy().await.unwrap();
        assert_eq!(plugin.process_id(), "echo");
        assert_eq!(plugin.version(), "1.0.0");
    }

    #[tokio::test]
    async fn execute_is_repeatable() {
        let plugin = EchoPlugin {
            meta: PluginMetadata::new("echo", "1.0.0"),
        };
        let first = plugin.execute(&ctx()).await.unwrap();
        let second = plugin.execute(&ctx()).await.unwrap();
        assert_eq!(first.output, second.output);
        assert_eq!(first.output.unwrap()["echo"]["msg"], "hi");
    }

    #[test]
    fn unwrap_of_concrete_plugin_is_itself() {
        let plugin: Arc<dyn ProcessPlugin> = Arc::new(EchoPlugin {
            meta: PluginMetadata::new("echo", "1.0.0"),
        });
        assert!(Arc::ptr_eq(&unwrap_plugin(&plugin), &plugin));
    }
}
