//! Project metadata used to enrich telemetry items.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Numeric project identifier carried by every telemetry item.
pub type ProjectId = u32;

/// Free-form item attributes (resource and span attributes alike).
pub type Attributes = HashMap<String, serde_json::Value>;

/// Metadata for a single project.
///
/// Records are immutable once fetched; workers cache them for their whole
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
  pub id: ProjectId,

  #[serde(default)]
  pub name: String,

  /// Instrumentation libraries whose spans must be named from the span
  /// itself rather than from the reported event name.
  #[serde(default)]
  pub force_span_name: Vec<String>,
}

impl ProjectRecord {
  pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
    Self {
      id,
      name: name.into(),
      force_span_name: Vec::new(),
    }
  }

  pub fn with_force_span_name<I, S>(mut self, libraries: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.force_span_name = libraries.into_iter().map(Into::into).collect();
    self
  }

  /// Whether spans from `library` are on this project's override list.
  pub fn forces_span_name(&self, library: &str) -> bool {
    self.force_span_name.iter().any(|l| l == library)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_forces_span_name() {
    let project = ProjectRecord::new(1, "shop").with_force_span_name(["io.opentelemetry.jdbc"]);

    assert!(project.forces_span_name("io.opentelemetry.jdbc"));
    assert!(!project.forces_span_name("io.opentelemetry.http"));
    assert!(!project.forces_span_name(""));
  }

  #[test]
  fn test_deserialize_defaults() {
    let project: ProjectRecord = serde_json::from_str(r#"{"id": 7}"#).unwrap();
    assert_eq!(project.id, 7);
    assert!(project.name.is_empty());
    assert!(project.force_span_name.is_empty());
  }
}
