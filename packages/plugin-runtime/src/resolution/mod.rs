//! Mapping resolution: which plugin id and version serves a request.

pub mod cache;
pub mod service;
pub mod source;

pub use cache::{CacheStats, Lookup, MappingCache};
pub use service::MappingResolutionService;
pub use source::{HttpMappingSource, MappingSource, SourceError, StaticMappingSource};
