//! Field-level validation outcomes returned by `validate`.

use serde::{Deserialize, Serialize};

/// Single field-scoped validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field: Option<String>,
    pub code: Option<String>,
    pub message: String,
    pub rejected_value: Option<serde_json::Value>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            code: None,
            message: message.into(),
            rejected_value: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_rejected_value(mut self, value: serde_json::Value) -> Self {
        self.rejected_value = Some(value);
        self
    }
}

/// Outcome of a plugin's `validate` call.
///
/// Validation failures are always returned as values, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn invalid(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    /// Invalid result with a single error on `field`.
    pub fn field_error(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::invalid(vec![ValidationError::new(message)
            .with_field(field)
            .with_code(code)])
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Combines two results. A valid operand yields the other one; two invalid
    /// results concatenate their errors in order.
    #[must_use]
    pub fn merge(self, other: ValidationResult) -> ValidationResult {
        if self.valid {
            return other;
        }
        if other.valid {
            return self;
        }
        let mut errors = self.errors;
        errors.extend(other.errors);
        ValidationResult::invalid(errors)
    }

    /// Error messages in order, mainly for logging.
    #[must_use]
    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn valid_merged_with_invalid_yields_invalid() {
        let invalid = ValidationResult::field_error("amount", "NEGATIVE", "must be positive");
        let merged = ValidationResult::valid().merge(invalid.clone());
        assert_eq!(merged, invalid);

        let merged = invalid.clone().merge(ValidationResult::valid());
        assert_eq!(merged, invalid);
    }

    #[test]
    fn merging_invalid_results_concatenates_in_order() {
        let a = ValidationResult::field_error("amount", "NEGATIVE", "must be positive");
        let b = ValidationResult::invalid(vec![
            ValidationError::new("unknown currency")
                .with_field("currency")
                .with_rejected_value(json!("XYZ")),
            ValidationError::new("missing reference"),
        ]);

        let merged = a.merge(b);
        assert!(!merged.is_valid());
        assert_eq!(
            merged.messages(),
            vec!["must be positive", "unknown currency", "missing reference"]
        );
        assert_eq!(merged.errors[1].rejected_value, Some(json!("XYZ")));
    }

    #[test]
    fn two_valid_results_stay_valid() {
        let merged = ValidationResult::valid().merge(ValidationResult::default());
        assert!(merged.is_valid());
        assert!(merged.errors.is_empty());
    }
}
