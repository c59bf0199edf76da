//! Outcome of a plugin `execute` or `compensate` call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConversionError;

/// Metadata key set on results produced by compensation.
pub const COMPENSATED_KEY: &str = "compensated";

/// Terminal (or pending) status of a process execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Success,
    /// Expected domain-level rejection (e.g. insufficient funds).
    BusinessError,
    /// Unexpected infrastructure or programming failure.
    TechnicalError,
    Pending,
    Partial,
}

impl ProcessStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::BusinessError => "BUSINESS_ERROR",
            Self::TechnicalError => "TECHNICAL_ERROR",
            Self::Pending => "PENDING",
            Self::Partial => "PARTIAL",
        }
    }
}

/// Immutable result value returned by plugin operations.
///
/// Business and technical failures are carried as values, not raised. The
/// optional `cause` keeps the originating fault of a technical error for
/// diagnostics and is not serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub status: ProcessStatus,
    pub output: Option<serde_json::Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub cause: Option<Arc<anyhow::Error>>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub execution_time_ms: Option<u64>,
    pub execution_id: Option<Uuid>,
}

impl ProcessResult {
    fn with_status(status: ProcessStatus) -> Self {
        Self {
            status,
            output: None,
            error_code: None,
            error_message: None,
            cause: None,
            metadata: BTreeMap::new(),
            execution_time_ms: None,
            execution_id: None,
        }
    }

    /// Successful result carrying `output`.
    #[must_use]
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            output: Some(output),
            ..Self::with_status(ProcessStatus::Success)
        }
    }

    /// Successful result without output.
    #[must_use]
    pub fn success_empty() -> Self {
        Self::with_status(ProcessStatus::Success)
    }

    /// Successful result with a typed output serialized to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Serialize`] if `output` cannot be represented as JSON.
    pub fn success_with<T: Serialize>(output: &T) -> Result<Self, ConversionError> {
        let value = serde_json::to_value(output).map_err(ConversionError::Serialize)?;
        Ok(Self::success(value))
    }

    #[must_use]
    pub fn business_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Self::with_status(ProcessStatus::BusinessError)
        }
    }

    #[must_use]
    pub fn technical_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Self::with_status(ProcessStatus::TechnicalError)
        }
    }

    /// Technical error whose message is taken from `cause`, which is kept on the result.
    #[must_use]
    pub fn technical_error_from(code: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            error_code: Some(code.into()),
            error_message: Some(format!("{cause:#}")),
            cause: Some(Arc::new(cause)),
            ..Self::with_status(ProcessStatus::TechnicalError)
        }
    }

    #[must_use]
    pub fn pending() -> Self {
        Self::with_status(ProcessStatus::Pending)
    }

    /// Partially completed work; `output` holds what did complete.
    #[must_use]
    pub fn partial(output: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            output: Some(output),
            error_message: Some(message.into()),
            ..Self::with_status(ProcessStatus::Partial)
        }
    }

    /// Successful compensation, flagged with `compensated = true`.
    #[must_use]
    pub fn compensated() -> Self {
        Self::success_empty().with_metadata(COMPENSATED_KEY, serde_json::Value::Bool(true))
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_execution_time_ms(mut self, millis: u64) -> Self {
        self.execution_time_ms = Some(millis);
        self
    }

    #[must_use]
    pub fn with_execution_id(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ProcessStatus::Success
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(
            self.status,
            ProcessStatus::BusinessError | ProcessStatus::TechnicalError
        )
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ProcessStatus::Pending
    }

    #[must_use]
    pub fn is_compensated(&self) -> bool {
        self.metadata
            .get(COMPENSATED_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Converts the output to `T`. `Ok(None)` when there is no output.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Output`] if the output does not match `T`.
    pub fn output_as<T: DeserializeOwned>(&self) -> Result<Option<T>, ConversionError> {
        self.output
            .as_ref()
            .map(|value| {
                T::deserialize(value).map_err(|source| ConversionError::Output {
                    target: std::any::type_name::<T>(),
                    source,
                })
            })
            .transpose()
    }
}

/// Wire shape of a result for callers that deserialize it back. The cause is not carried.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessResultRepr {
    status: ProcessStatus,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    execution_time_ms: Option<u64>,
    #[serde(default)]
    execution_id: Option<Uuid>,
}

impl<'de> Deserialize<'de> for ProcessResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ProcessResultRepr::deserialize(deserializer)?;
        Ok(Self {
            status: repr.status,
            output: repr.output,
            error_code: repr.error_code,
            error_message: repr.error_message,
            cause: None,
            metadata: repr.metadata,
            execution_time_ms: repr.execution_time_ms,
            execution_id: repr.execution_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: String,
        balance: i64,
    }

    #[test]
    fn status_predicates() {
        assert!(ProcessResult::success_empty().is_success());
        assert!(ProcessResult::business_error("NSF", "insufficient funds").is_failed());
        assert!(ProcessResult::technical_error("DB", "down").is_failed());
        assert!(ProcessResult::pending().is_pending());

        let partial = ProcessResult::partial(json!({"done": 2}), "1 of 3 failed");
        assert!(!partial.is_success());
        assert!(!partial.is_failed());
        assert!(!partial.is_pending());
    }

    #[test]
    fn typed_output_round_trips() {
        let account = Account {
            id: "acc-1".to_string(),
            balance: 100,
        };
        let result = ProcessResult::success_with(&account).unwrap();
        let back: Option<Account> = result.output_as().unwrap();
        assert_eq!(back, Some(account));
    }

    #[test]
    fn output_conversion_failure_is_reported() {
        let result = ProcessResult::success(json!("not an account"));
        let err = result.output_as::<Account>().unwrap_err();
        assert!(matches!(err, ConversionError::Output { .. }));
    }

    #[test]
    fn missing_output_converts_to_none() {
        let result = ProcessResult::success_empty();
        assert_eq!(result.output_as::<Account>().unwrap(), None);
    }

    #[test]
    fn technical_error_keeps_cause() {
        let result = ProcessResult::technical_error_from(
            "DOWNSTREAM",
            anyhow::anyhow!("connection refused"),
        );
        assert_eq!(result.status, ProcessStatus::TechnicalError);
        assert_eq!(result.error_message.as_deref(), Some("connection refused"));
        assert!(result.cause.is_some());
    }

    #[test]
    fn compensated_sets_flag() {
        let result = ProcessResult::compensated();
        assert!(result.is_success());
        assert!(result.is_compensated());
        assert!(!ProcessResult::success_empty().is_compensated());
    }

    #[test]
    fn serde_skips_cause() {
        let id = Uuid::new_v4();
        let result = ProcessResult::technical_error_from("X", anyhow::anyhow!("boom"))
            .with_execution_id(id)
            .with_execution_time_ms(12);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "TECHNICAL_ERROR");
        assert!(json.get("cause").is_none());

        let back: ProcessResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.execution_id, Some(id));
        assert_eq!(back.execution_time_ms, Some(12));
        assert!(back.cause.is_none());
    }
}
