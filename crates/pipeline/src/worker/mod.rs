//! Per-worker enrichment state.
//!
//! Each worker task builds one [`WorkerContext`] and keeps it to itself: the
//! project cache and the digest are plain fields with no locking, and a
//! context is never handed to another task. Two workers may therefore each
//! look up the same project once.

mod enrich;
mod pool;

use std::{collections::HashMap, sync::Arc};

use batchline_core::{Attributes, ProjectId, ProjectRecord, config::DEFAULT_OVERRIDE_ATTRIBUTE};
use tracing::{error, trace};
use xxhash_rust::xxh64::Xxh64;

pub use self::{
  enrich::{Enricher, SpanEnricher},
  pool::{WorkerPool, WorkerStats},
};
use crate::enrichment::ProjectProvider;

/// How the pipeline reads the fields it needs from an item.
pub struct ItemAccessors<T> {
  pub attributes: fn(&T) -> &Attributes,
  pub project_id: fn(&T) -> ProjectId,
  pub event_name: fn(&T) -> &str,
  /// Attribute matched against [`ProjectRecord::force_span_name`].
  pub override_attribute: Arc<str>,
}

impl<T> ItemAccessors<T> {
  pub fn new(attributes: fn(&T) -> &Attributes, project_id: fn(&T) -> ProjectId, event_name: fn(&T) -> &str) -> Self {
    Self {
      attributes,
      project_id,
      event_name,
      override_attribute: Arc::from(DEFAULT_OVERRIDE_ATTRIBUTE),
    }
  }

  pub fn with_override_attribute(mut self, attribute: impl Into<Arc<str>>) -> Self {
    self.override_attribute = attribute.into();
    self
  }
}

impl<T> Clone for ItemAccessors<T> {
  fn clone(&self) -> Self {
    Self {
      attributes: self.attributes,
      project_id: self.project_id,
      event_name: self.event_name,
      override_attribute: self.override_attribute.clone(),
    }
  }
}

pub struct WorkerContext {
  id: usize,
  provider: Arc<dyn ProjectProvider>,
  projects: HashMap<ProjectId, Arc<ProjectRecord>>,
  digest: Xxh64,
}

impl WorkerContext {
  pub fn new(id: usize, provider: Arc<dyn ProjectProvider>) -> Self {
    Self {
      id,
      provider,
      projects: HashMap::new(),
      digest: Xxh64::new(0),
    }
  }

  pub fn id(&self) -> usize {
    self.id
  }

  /// Number of projects this worker has cached.
  pub fn cached_projects(&self) -> usize {
    self.projects.len()
  }

  /// Resolve a project, from the cache when possible.
  ///
  /// A failed lookup is logged and yields `None`; it is not cached, so a
  /// later call asks the provider again.
  pub async fn project(&mut self, project_id: ProjectId) -> Option<Arc<ProjectRecord>> {
    if let Some(project) = self.projects.get(&project_id) {
      return Some(project.clone());
    }

    match self.provider.lookup(project_id).await {
      Ok(project) => {
        trace!(worker_id = self.id, project_id, "Cached project");
        let project = Arc::new(project);
        self.projects.insert(project_id, project.clone());
        Some(project)
      }
      Err(e) => {
        error!(worker_id = self.id, project_id, error = %e, "Project lookup failed");
        None
      }
    }
  }

  /// Whether the item's name must be taken from the item itself.
  ///
  /// True only when the item has no event name and its override attribute
  /// names a library on its project's `force_span_name` list.
  pub async fn force_name<T: Sync>(&mut self, item: &T, accessors: &ItemAccessors<T>) -> bool {
    if !(accessors.event_name)(item).is_empty() {
      return false;
    }

    let Some(project) = self.project((accessors.project_id)(item)).await else {
      return false;
    };

    match (accessors.attributes)(item)
      .get(&*accessors.override_attribute)
      .and_then(|value| value.as_str())
    {
      Some(library) if !library.is_empty() => project.forces_span_name(library),
      _ => false,
    }
  }

  /// Hash a project id and a sequence of byte strings with this worker's
  /// digest. Parts are length-delimited so `["ab", "c"]` and `["a", "bc"]`
  /// differ.
  pub fn fingerprint(&mut self, project_id: ProjectId, parts: &[&[u8]]) -> u64 {
    self.digest.reset(0);
    self.digest.update(&project_id.to_le_bytes());
    for part in parts {
      self.digest.update(&(part.len() as u64).to_le_bytes());
      self.digest.update(part);
    }
    self.digest.digest()
  }
}
