//! Configuration for the batching pipeline.
//!
//! Loaded from TOML. Every section falls back to its defaults, so an empty
//! file is a valid configuration:
//!
//! ```toml
//! [processor]
//! name = "spans"       # gauges become processor.spans.*
//! batch_size = 1000
//! buffer_size = 10000
//! flush_timeout_ms = 5000
//!
//! [worker]
//! workers = 0          # 0 = number of CPUs
//! max_concurrency = 0  # 0 = number of CPUs
//!
//! [[projects]]
//! id = 1
//! name = "shop"
//! force_span_name = ["io.opentelemetry.jdbc"]
//! ```

use std::{collections::HashSet, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::project::ProjectRecord;

/// Attribute consulted by name overrides unless configured otherwise.
pub const DEFAULT_OVERRIDE_ATTRIBUTE: &str = "otel_library_name";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config file: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

// ============================================================================
// Processor
// ============================================================================

/// Batching settings for the coordinating loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
  /// Distinguishes this processor's gauges when several share a registry
  /// (empty = unnamed)
  pub name: String,

  /// Maximum items per emitted batch (default: 1000)
  pub batch_size: usize,

  /// Queue capacity; items beyond it are shed (default: 10000)
  pub buffer_size: usize,

  /// Maximum time a partial batch waits before it is flushed (default: 5000)
  pub flush_timeout_ms: u64,
}

impl Default for ProcessorConfig {
  fn default() -> Self {
    Self {
      name: String::new(),
      batch_size: 1000,
      buffer_size: 10_000,
      flush_timeout_ms: 5000,
    }
  }
}

impl ProcessorConfig {
  pub fn new(batch_size: usize, buffer_size: usize) -> Self {
    Self {
      batch_size,
      buffer_size,
      ..Default::default()
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
    self.flush_timeout_ms = timeout.as_millis() as u64;
    self
  }

  pub fn flush_timeout(&self) -> Duration {
    Duration::from_millis(self.flush_timeout_ms)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.name.contains(|c: char| c.is_whitespace() || c == '.') {
      return Err(ConfigError::Invalid(format!("processor name {:?} cannot contain dots or whitespace", self.name)));
    }
    if self.batch_size == 0 {
      return Err(ConfigError::Invalid("batch_size cannot be 0".into()));
    }
    if self.buffer_size == 0 {
      return Err(ConfigError::Invalid("buffer_size cannot be 0".into()));
    }
    if self.flush_timeout_ms == 0 {
      return Err(ConfigError::Invalid("flush_timeout_ms cannot be 0".into()));
    }
    if self.batch_size > self.buffer_size {
      warn!(
        batch_size = self.batch_size,
        buffer_size = self.buffer_size,
        "batch_size exceeds buffer_size, batches will mostly flush on timeout"
      );
    }
    Ok(())
  }
}

// ============================================================================
// Worker
// ============================================================================

/// Settings for the enrichment worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Number of enrichment workers (0 = number of CPUs)
  pub workers: usize,

  /// Batches handled concurrently across all workers (0 = number of CPUs)
  pub max_concurrency: usize,

  /// Item attribute matched against a project's `force_span_name` list
  pub override_attribute: String,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      workers: 0,
      max_concurrency: 0,
      override_attribute: DEFAULT_OVERRIDE_ATTRIBUTE.to_string(),
    }
  }
}

impl WorkerConfig {
  pub fn worker_count(&self) -> usize {
    if self.workers == 0 { num_cpus::get() } else { self.workers }
  }

  pub fn concurrency(&self) -> usize {
    if self.max_concurrency == 0 {
      num_cpus::get()
    } else {
      self.max_concurrency
    }
  }
}

// ============================================================================
// Root
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub processor: ProcessorConfig,
  pub worker: WorkerConfig,
  /// Statically configured projects
  pub projects: Vec<ProjectRecord>,
}

impl Config {
  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.processor.validate()?;

    let mut seen = HashSet::new();
    for project in &self.projects {
      if !seen.insert(project.id) {
        return Err(ConfigError::Invalid(format!("duplicate project id {}", project.id)));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_processor_defaults() {
    let config = ProcessorConfig::default();
    assert_eq!(config.batch_size, 1000);
    assert_eq!(config.buffer_size, 10_000);
    assert_eq!(config.flush_timeout(), Duration::from_secs(5));
  }

  #[test]
  fn test_empty_config_is_valid() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.worker.override_attribute, "otel_library_name");
  }

  #[test]
  fn test_parse_full_config() {
    let toml_content = r#"
[processor]
batch_size = 3
buffer_size = 10
flush_timeout_ms = 250

[worker]
workers = 2
max_concurrency = 1

[[projects]]
id = 1
name = "shop"
force_span_name = ["io.opentelemetry.jdbc"]

[[projects]]
id = 2
"#;
    let config = Config::from_toml_str(toml_content).unwrap();

    assert_eq!(config.processor, ProcessorConfig::new(3, 10).with_flush_timeout(Duration::from_millis(250)));
    assert_eq!(config.worker.worker_count(), 2);
    assert_eq!(config.worker.concurrency(), 1);
    assert_eq!(config.projects.len(), 2);
    assert!(config.projects[0].forces_span_name("io.opentelemetry.jdbc"));
    assert!(config.projects[1].force_span_name.is_empty());
  }

  #[test]
  fn test_zero_workers_means_cpu_count() {
    let config = WorkerConfig::default();
    assert_eq!(config.worker_count(), num_cpus::get());
    assert_eq!(config.concurrency(), num_cpus::get());
  }

  #[test]
  fn test_rejects_zero_batch_size() {
    let err = Config::from_toml_str("[processor]\nbatch_size = 0").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
  }

  #[test]
  fn test_rejects_zero_buffer_and_timeout() {
    assert!(ProcessorConfig::new(1, 0).validate().is_err());
    assert!(
      ProcessorConfig::new(1, 1)
        .with_flush_timeout(Duration::ZERO)
        .validate()
        .is_err()
    );
  }

  #[test]
  fn test_processor_name() {
    let config = Config::from_toml_str("[processor]\nname = \"spans\"\n").unwrap();
    assert_eq!(config.processor.name, "spans");
    assert_eq!(ProcessorConfig::default().name, "");

    for name in ["log records", "spans.v2"] {
      let err = ProcessorConfig::default().with_name(name).validate().unwrap_err();
      assert!(matches!(err, ConfigError::Invalid(_)));
    }
  }

  #[test]
  fn test_batch_larger_than_buffer_is_allowed() {
    assert!(ProcessorConfig::new(100, 10).validate().is_ok());
  }

  #[test]
  fn test_rejects_duplicate_projects() {
    let toml_content = "[[projects]]\nid = 1\n\n[[projects]]\nid = 1\n";
    let err = Config::from_toml_str(toml_content).unwrap_err();
    assert!(err.to_string().contains("duplicate project id 1"));
  }

  #[test]
  fn test_rejects_malformed_toml() {
    let err = Config::from_toml_str("[processor\nbatch_size = 1").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
  }

  #[test]
  fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[processor]\nbatch_size = 42").unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.processor.batch_size, 42);
    assert_eq!(config.processor.buffer_size, 10_000);
  }

  #[test]
  fn test_load_missing_file() {
    let err = Config::load(Path::new("/nonexistent/batchline.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
  }
}
