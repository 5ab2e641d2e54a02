//! Shared domain types for the batchline telemetry pipeline.
//!
//! Kept free of async runtime dependencies so sinks, providers and tooling can
//! depend on the data model without pulling in the engine.

pub mod config;
pub mod project;

pub use config::{Config, ConfigError, ProcessorConfig, WorkerConfig};
pub use project::{Attributes, ProjectId, ProjectRecord};
