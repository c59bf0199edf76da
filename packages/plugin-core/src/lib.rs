//! Process plugin core — plugin contract, execution context, results, mapping
//! rules, and version ordering.

pub mod clock;
pub mod context;
pub mod delegating;
pub mod error;
pub mod health;
pub mod mapping;
pub mod metadata;
pub mod plugin;
pub mod result;
pub mod validation;
pub mod version;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use context::{BusinessContext, ProcessExecutionContext};
pub use delegating::DelegatingPlugin;
pub use error::ConversionError;
pub use health::{HealthState, HealthStatus};
pub use mapping::{select_mapping, MappingQuery, ProcessMapping};
pub use metadata::PluginMetadata;
pub use plugin::{unwrap_plugin, ProcessPlugin};
pub use result::{ProcessResult, ProcessStatus};
pub use validation::{ValidationError, ValidationResult};
pub use version::{compare_versions, latest_version};
