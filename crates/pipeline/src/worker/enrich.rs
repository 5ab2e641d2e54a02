//! Per-item enrichment run by pool workers before a batch reaches its sink.

use super::{ItemAccessors, WorkerContext};

/// Mutates a single item in place using a worker's private state.
#[async_trait::async_trait]
pub trait Enricher<T: Send + 'static>: Send + Sync {
  async fn enrich(&self, worker: &mut WorkerContext, item: &mut T);
}

/// Renames spans whose project forces the library name, and optionally
/// stamps each item with a group fingerprint of its project and event name.
pub struct SpanEnricher<T> {
  accessors: ItemAccessors<T>,
  rename: fn(&mut T),
  assign_group: Option<fn(&mut T, u64)>,
}

impl<T> SpanEnricher<T> {
  /// `rename` is applied to every item whose name must be forced.
  pub fn new(accessors: ItemAccessors<T>, rename: fn(&mut T)) -> Self {
    Self {
      accessors,
      rename,
      assign_group: None,
    }
  }

  pub fn with_group_id(mut self, assign: fn(&mut T, u64)) -> Self {
    self.assign_group = Some(assign);
    self
  }
}

#[async_trait::async_trait]
impl<T: Send + Sync + 'static> Enricher<T> for SpanEnricher<T> {
  async fn enrich(&self, worker: &mut WorkerContext, item: &mut T) {
    if worker.force_name(&*item, &self.accessors).await {
      (self.rename)(item);
    }

    if let Some(assign) = self.assign_group {
      let project_id = (self.accessors.project_id)(item);
      let group = worker.fingerprint(project_id, &[(self.accessors.event_name)(item).as_bytes()]);
      assign(item, group);
    }
  }
}
