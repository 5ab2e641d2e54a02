use batchline_core::ConfigError;

use crate::metrics::MetricsError;

/// Errors that stop a pipeline from starting.
///
/// Runtime failures (queue overflow, project lookups, sink errors) are handled
/// where they happen and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  #[error("Config error: {0}")]
  Config(#[from] ConfigError),
  #[error("Metrics registration failed: {0}")]
  Metrics(#[from] MetricsError),
}
