//! Process plugin runtime — multi-version registry, cached mapping
//! resolution, and dispatch of business operations to plugins.

pub mod config;
pub mod dispatcher;
pub mod registry;
pub mod resolution;
pub mod telemetry;

pub use config::{ConfigError, ResolutionConfig};
pub use dispatcher::{DispatchRequest, ExecutedStep, ProcessDispatcher};
pub use registry::PluginRegistry;
pub use resolution::{
    HttpMappingSource, MappingResolutionService, MappingSource, SourceError, StaticMappingSource,
};
