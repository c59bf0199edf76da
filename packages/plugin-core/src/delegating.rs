//! Decorator that reports externally supplied metadata for a plugin.
//!
//! Loaders that derive metadata outside the plugin type (descriptors,
//! bootstrap tables, remote catalogues) wrap the instance instead of
//! changing it. Every call other than `metadata` is forwarded unchanged.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ProcessExecutionContext;
use crate::health::HealthStatus;
use crate::metadata::PluginMetadata;
use crate::plugin::ProcessPlugin;
use crate::result::ProcessResult;
use crate::validation::ValidationResult;

/// Plugin wrapper overriding only the reported [`PluginMetadata`].
pub struct DelegatingPlugin {
    inner: Arc<dyn ProcessPlugin>,
    metadata: PluginMetadata,
}

impl DelegatingPlugin {
    #[must_use]
    pub fn new(inner: Arc<dyn ProcessPlugin>, metadata: PluginMetadata) -> Self {
        Self { inner, metadata }
    }

    /// Starts from the wrapped plugin's own metadata and lets `f` edit it.
    pub fn with_overrides<F>(inner: Arc<dyn ProcessPlugin>, f: F) -> Self
    where
        F: FnOnce(PluginMetadata) -> PluginMetadata,
    {
        let metadata = f(inner.metadata().clone());
        Self { inner, metadata }
    }

    /// The wrapped plugin.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn ProcessPlugin> {
        &self.inner
    }

    /// Consumes the wrapper and returns the wrapped plugin.
    #[must_use]
    pub fn into_inner(self) -> Arc<dyn ProcessPlugin> {
        self.inner
    }
}

impl std::fmt::Debug for DelegatingPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatingPlugin")
            .field("process_id", &self.metadata.process_id)
            .field("version", &self.metadata.version)
            .field("inner_process_id", &self.inner.process_id())
            .finish()
    }
}

#[async_trait]
impl ProcessPlugin for DelegatingPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &ProcessExecutionContext) -> anyhow::Result<ProcessResult> {
        self.inner.execute(ctx).await
    }

    async fn validate(&self, ctx: &ProcessExecutionContext) -> anyhow::Result<ValidationResult> {
        self.inner.validate(ctx).await
    }

    async fn compensate(&self, ctx: &ProcessExecutionContext) -> anyhow::Result<ProcessResult> {
        self.inner.compensate(ctx).await
    }

    async fn on_init(&self) -> anyhow::Result<()> {
        self.inner.on_init().await
    }

    async fn on_destroy(&self) -> anyhow::Result<()> {
        self.inner.on_destroy().await
    }

    async fn health_check(&self) -> HealthStatus {
        self.inner.health_check().await
    }

    fn delegate(&self) -> Option<&Arc<dyn ProcessPlugin>> {
        Some(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::context::BusinessContext;
    use crate::health::HealthState;
    use crate::mapping::ProcessMapping;
    use crate::plugin::unwrap_plugin;

    /// Plugin that counts forwarded calls.
    struct CountingPlugin {
        meta: PluginMetadata,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProcessPlugin for CountingPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.meta
        }

        async fn execute(&self, _ctx: &ProcessExecutionContext) -> anyhow::Result<ProcessResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProcessResult::business_error("NSF", "insufficient funds"))
        }

        async fn validate(&self, _ctx: &ProcessExecutionContext) -> anyhow::Result<ValidationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ValidationResult::field_error("amount", "NEGATIVE", "must be positive"))
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::degraded("slow")
        }
    }

    fn counting() -> Arc<CountingPlugin> {
        Arc::new(CountingPlugin {
            meta: PluginMetadata::new("internalTransfer", "0.0.1"),
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn overrides_metadata_and_forwards_calls() {
        let inner = counting();
        let wrapped = DelegatingPlugin::new(
            inner.clone(),
            PluginMetadata::new("transfer", "2.0.0")
                .with_description("from descriptor")
                .with_capability("TRANSFER"),
        );

        assert_eq!(wrapped.process_id(), "transfer");
        assert_eq!(wrapped.version(), "2.0.0");
        assert!(wrapped.metadata().has_capability("TRANSFER"));

        let ctx = ProcessExecutionContext::new(
            BusinessContext::default(),
            ProcessMapping::default_for("transfer"),
        );
        let result = wrapped.execute(&ctx).await.unwrap();
        assert_eq!(result.error_code.as_deref(), Some("NSF"));
        assert!(!wrapped.validate(&ctx).await.unwrap().is_valid());
        assert_eq!(wrapped.health_check().await.state, HealthState::Degraded);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn with_overrides_starts_from_inner_metadata() {
        let wrapped = DelegatingPlugin::with_overrides(counting(), |m| m.with_tag("jar"));
        assert_eq!(wrapped.process_id(), "internalTransfer");
        assert!(wrapped.metadata().tags.contains("jar"));
    }

    #[test]
    fn unwrapping_recovers_original_instance() {
        let inner = counting();
        let inner_dyn: Arc<dyn ProcessPlugin> = inner;
        let once: Arc<dyn ProcessPlugin> = Arc::new(DelegatingPlugin::new(
            inner_dyn.clone(),
            PluginMetadata::new("a", "1"),
        ));
        let twice: Arc<dyn ProcessPlugin> =
            Arc::new(DelegatingPlugin::new(once.clone(), PluginMetadata::new("b", "2")));

        assert!(Arc::ptr_eq(&unwrap_plugin(&twice), &inner_dyn));
        assert!(Arc::ptr_eq(twice.delegate().unwrap(), &once));

        let wrapper = DelegatingPlugin::new(inner_dyn.clone(), PluginMetadata::new("c", "3"));
        assert!(Arc::ptr_eq(&wrapper.into_inner(), &inner_dyn));
    }
}
