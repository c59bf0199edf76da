//! Request dispatch: resolve the mapping, pick the plugin version, validate,
//! execute. Also runs saga-style compensation over executed steps.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use process_plugin_core::{
    BusinessContext, ProcessExecutionContext, ProcessPlugin, ProcessResult, ValidationResult,
};
use tracing::{info, info_span, warn, Instrument};

use crate::registry::PluginRegistry;
use crate::resolution::MappingResolutionService;

/// Error code of results rejected by `validate`.
pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
/// Error code when no plugin is registered for the resolved mapping.
pub const PLUGIN_NOT_FOUND: &str = "PLUGIN_NOT_FOUND";
/// Error code when a plugin hook returns an error instead of a result.
pub const EXECUTION_FAULT: &str = "EXECUTION_FAULT";
/// Result metadata key holding the serialized validation errors.
pub const VALIDATION_ERRORS_KEY: &str = "validationErrors";

/// One business operation to run.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub business: BusinessContext,
    pub operation_id: String,
    pub inputs: BTreeMap<String, serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    /// Kept across nested calls; generated when absent.
    pub correlation_id: Option<String>,
}

impl DispatchRequest {
    #[must_use]
    pub fn new(business: BusinessContext, operation_id: impl Into<String>) -> Self {
        Self {
            business,
            operation_id: operation_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A dispatched operation: the context it ran with, the plugin that served
/// it (if one was found) and its result.
#[derive(Clone)]
pub struct ExecutedStep {
    pub context: ProcessExecutionContext,
    pub plugin: Option<Arc<dyn ProcessPlugin>>,
    pub result: ProcessResult,
}

impl ExecutedStep {
    /// Whether this step changed state that compensation must undo.
    pub fn needs_compensation(&self) -> bool {
        self.plugin.is_some() && self.result.is_success()
    }
}

impl std::fmt::Debug for ExecutedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutedStep")
            .field("process_id", &self.context.process_id)
            .field("plugin_version", &self.plugin.as_ref().map(|p| p.version().to_string()))
            .field("execution_id", &self.context.execution_id)
            .field("status", &self.result.status)
            .finish()
    }
}

/// Runs business operations against registered plugins.
#[derive(Clone)]
pub struct ProcessDispatcher {
    registry: Arc<PluginRegistry>,
    resolver: MappingResolutionService,
}

impl ProcessDispatcher {
    #[must_use]
    pub fn new(registry: Arc<PluginRegistry>, resolver: MappingResolutionService) -> Self {
        Self { registry, resolver }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn resolver(&self) -> &MappingResolutionService {
        &self.resolver
    }

    /// Resolves, validates and executes `request`. Never fails: missing
    /// plugins, validation failures and plugin faults come back as results.
    pub async fn dispatch(&self, request: DispatchRequest) -> ExecutedStep {
        let DispatchRequest {
            business,
            operation_id,
            inputs,
            headers,
            correlation_id,
        } = request;

        let mapping = self
            .resolver
            .resolve_mapping(
                business.tenant_id.as_deref(),
                &operation_id,
                business.product_id.as_deref(),
                business.channel_type.as_deref(),
            )
            .await;

        let mut context = ProcessExecutionContext::new(business, mapping).with_inputs(inputs);
        for (name, value) in headers {
            context = context.with_header(&name, value);
        }
        if let Some(correlation_id) = correlation_id {
            context = context.with_correlation_id(correlation_id);
        }

        let plugin = self.registry.find(
            &context.mapping.process_id,
            context.mapping.process_version.as_deref(),
        );
        let result = match &plugin {
            Some(plugin) => self.run(plugin, &context).await,
            None => {
                warn!(
                    operation_id = %context.operation_id,
                    process_id = %context.process_id,
                    version = ?context.mapping.process_version,
                    "No plugin registered for resolved mapping"
                );
                let message = match &context.mapping.process_version {
                    Some(version) => format!(
                        "no plugin registered for process '{}' version '{version}'",
                        context.process_id
                    ),
                    None => format!("no plugin registered for process '{}'", context.process_id),
                };
                ProcessResult::technical_error(PLUGIN_NOT_FOUND, message)
                    .with_execution_id(context.execution_id)
            }
        };

        ExecutedStep {
            context,
            plugin,
            result,
        }
    }

    /// Validates then executes `plugin` with `context`, inside a `process`
    /// span that records `duration_ms` and `outcome`.
    pub async fn run(
        &self,
        plugin: &Arc<dyn ProcessPlugin>,
        context: &ProcessExecutionContext,
    ) -> ProcessResult {
        let span = info_span!(
            "process",
            process_id = %plugin.process_id(),
            version = %plugin.version(),
            operation_id = %context.operation_id,
            execution_id = %context.execution_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = validate_then_execute(plugin.as_ref(), context).await;

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let outcome = result.status.as_str();
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            info!(duration_ms, outcome, "process complete");

            result
                .with_execution_id(context.execution_id)
                .with_execution_time_ms(duration_ms)
        }
        .instrument(span)
        .await
    }

    /// Compensates the successful steps of `steps`, last executed first.
    /// Steps without a plugin or without a successful result are skipped.
    pub async fn compensate(&self, steps: &[ExecutedStep]) -> Vec<ProcessResult> {
        let mut results = Vec::new();
        for step in steps.iter().rev().filter(|s| s.needs_compensation()) {
            let Some(plugin) = &step.plugin else { continue };
            let result = match plugin.compensate(&step.context).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        process_id = %plugin.process_id(),
                        version = %plugin.version(),
                        execution_id = %step.context.execution_id,
                        error = %e,
                        "Compensation failed"
                    );
                    ProcessResult::technical_error_from(EXECUTION_FAULT, e)
                }
            };
            results.push(result.with_execution_id(step.context.execution_id));
        }
        results
    }
}

impl std::fmt::Debug for ProcessDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessDispatcher")
            .field("registry", &self.registry)
            .field("resolver", &self.resolver)
            .finish()
    }
}

async fn validate_then_execute(
    plugin: &dyn ProcessPlugin,
    context: &ProcessExecutionContext,
) -> ProcessResult {
    match plugin.validate(context).await {
        Ok(validation) if validation.is_valid() => {}
        Ok(validation) => return rejected(&validation),
        Err(e) => {
            warn!(error = %e, "Validation raised a fault");
            return ProcessResult::technical_error_from(EXECUTION_FAULT, e);
        }
    }

    match plugin.execute(context).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Execution raised a fault");
            ProcessResult::technical_error_from(EXECUTION_FAULT, e)
        }
    }
}

fn rejected(validation: &ValidationResult) -> ProcessResult {
    let message = validation.messages().join("; ");
    let errors = serde_json::to_value(&validation.errors).unwrap_or_default();
    ProcessResult::business_error(VALIDATION_FAILED, message)
        .with_metadata(VALIDATION_ERRORS_KEY, errors)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
