//! Errors raised by typed access to untyped plugin inputs and outputs.

/// A caller-requested conversion from a JSON value to a concrete type failed.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// A required input key is absent.
    #[error("required input '{key}' is missing")]
    MissingInput { key: String },
    /// A single input key could not be converted.
    #[error("input '{key}' cannot be converted to {target}: {source}")]
    Input {
        key: String,
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// The whole input map could not be converted.
    #[error("inputs cannot be converted to {target}: {source}")]
    Inputs {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// The result output could not be converted.
    #[error("output cannot be converted to {target}: {source}")]
    Output {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// A value could not be serialized into the untyped representation.
    #[error("value cannot be represented as JSON: {0}")]
    Serialize(#[source] serde_json::Error),
}
