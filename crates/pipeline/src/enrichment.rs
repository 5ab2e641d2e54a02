//! Project metadata lookups used during enrichment.

use std::collections::HashMap;

use batchline_core::{Config, ProjectId, ProjectRecord};

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
  #[error("Project {0} not found")]
  NotFound(ProjectId),
  #[error("Project provider unavailable: {0}")]
  Unavailable(String),
}

/// Resolves project metadata by id.
///
/// Implementations may be slow or fail; workers cache successful lookups and
/// degrade on failure, so a provider never needs its own cache.
#[async_trait::async_trait]
pub trait ProjectProvider: Send + Sync {
  async fn lookup(&self, project_id: ProjectId) -> Result<ProjectRecord, LookupError>;
}

/// Provider backed by a fixed set of records, typically the `[[projects]]`
/// section of the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticProjectProvider {
  projects: HashMap<ProjectId, ProjectRecord>,
}

impl StaticProjectProvider {
  pub fn new(projects: impl IntoIterator<Item = ProjectRecord>) -> Self {
    Self {
      projects: projects.into_iter().map(|p| (p.id, p)).collect(),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.projects.iter().cloned())
  }

  pub fn len(&self) -> usize {
    self.projects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.projects.is_empty()
  }
}

#[async_trait::async_trait]
impl ProjectProvider for StaticProjectProvider {
  async fn lookup(&self, project_id: ProjectId) -> Result<ProjectRecord, LookupError> {
    self
      .projects
      .get(&project_id)
      .cloned()
      .ok_or(LookupError::NotFound(project_id))
  }
}
