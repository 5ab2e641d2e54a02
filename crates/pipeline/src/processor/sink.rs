//! The downstream contract for finished batches.

use std::{future::Future, sync::Arc};

use tokio::sync::mpsc;

/// An ordered, non-empty group of items flushed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
  seq: u64,
  items: Vec<T>,
}

impl<T> Batch<T> {
  pub fn new(seq: u64, items: Vec<T>) -> Self {
    Self { seq, items }
  }

  /// Position of this batch in its processor's flush order.
  pub fn seq(&self) -> u64 {
    self.seq
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  pub fn items_mut(&mut self) -> &mut [T] {
    &mut self.items
  }

  pub fn into_items(self) -> Vec<T> {
    self.items
  }
}

impl<T> IntoIterator for Batch<T> {
  type Item = T;
  type IntoIter = std::vec::IntoIter<T>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.into_iter()
  }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
  #[error("Sink is closed")]
  Closed,
  #[error("Sink failed: {0}")]
  Failed(String),
}

/// Consumes finished batches.
///
/// A processor calls its sink from the loop task, one batch at a time; a
/// [`WorkerPool`](crate::WorkerPool) may call its sink from several workers at
/// once. The batch is never retried; a sink that needs retries must do them
/// itself.
#[async_trait::async_trait]
pub trait BatchSink<T: Send + 'static>: Send + Sync {
  async fn process_batch(&self, batch: Batch<T>) -> Result<(), SinkError>;
}

/// Forward batches to another task, e.g. a [`WorkerPool`](crate::WorkerPool).
/// Waits for channel capacity, which lets a slow consumer push back on the
/// coordinating loop and, through it, make the queue shed.
#[async_trait::async_trait]
impl<T: Send + 'static> BatchSink<T> for mpsc::Sender<Batch<T>> {
  async fn process_batch(&self, batch: Batch<T>) -> Result<(), SinkError> {
    self.send(batch).await.map_err(|_| SinkError::Closed)
  }
}

#[async_trait::async_trait]
impl<T: Send + 'static, S: BatchSink<T> + ?Sized> BatchSink<T> for Arc<S> {
  async fn process_batch(&self, batch: Batch<T>) -> Result<(), SinkError> {
    (**self).process_batch(batch).await
  }
}

/// Adapts an async closure into a [`BatchSink`].
pub struct FnSink<F>(pub F);

#[async_trait::async_trait]
impl<T, F, Fut> BatchSink<T> for FnSink<F>
where
  T: Send + 'static,
  F: Fn(Batch<T>) -> Fut + Send + Sync,
  Fut: Future<Output = Result<(), SinkError>> + Send,
{
  async fn process_batch(&self, batch: Batch<T>) -> Result<(), SinkError> {
    (self.0)(batch).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[tokio::test]
  async fn test_channel_sink_forwards() {
    let (tx, mut rx) = mpsc::channel(1);
    tx.process_batch(Batch::new(0, vec![1, 2])).await.unwrap();

    let batch = rx.recv().await.unwrap();
    assert_eq!(batch.seq(), 0);
    assert_eq!(batch.items(), &[1, 2]);
  }

  #[tokio::test]
  async fn test_channel_sink_closed() {
    let (tx, rx) = mpsc::channel::<Batch<u8>>(1);
    drop(rx);

    let err = tx.process_batch(Batch::new(0, vec![1])).await.unwrap_err();
    assert!(matches!(err, SinkError::Closed));
  }

  #[tokio::test]
  async fn test_fn_sink_and_arc() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let sink = Arc::new(FnSink(move |batch: Batch<u32>| {
      let counter = counter.clone();
      async move {
        counter.fetch_add(batch.len(), Ordering::SeqCst);
        Ok::<(), SinkError>(())
      }
    }));

    sink.process_batch(Batch::new(0, vec![1, 2, 3])).await.unwrap();
    sink.process_batch(Batch::new(1, vec![4])).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 4);
  }

  #[test]
  fn test_batch_accessors() {
    let mut batch = Batch::new(4, vec![1, 2]);
    batch.items_mut()[0] = 10;

    assert_eq!(batch.len(), 2);
    assert!(!batch.is_empty());
    assert_eq!(batch.into_iter().collect::<Vec<_>>(), vec![10, 2]);
  }
}
