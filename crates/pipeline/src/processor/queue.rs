//! Bounded many-producer queue that sheds items instead of blocking.

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, warn};

/// Create a queue holding at most `capacity` items.
pub fn channel<T>(capacity: usize) -> (BatchQueue<T>, mpsc::Receiver<T>) {
  let (tx, rx) = mpsc::channel(capacity.max(1));
  let queue = BatchQueue {
    tx,
    dropped: Arc::new(AtomicU64::new(0)),
  };
  (queue, rx)
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug)]
pub struct BatchQueue<T> {
  tx: mpsc::Sender<T>,
  dropped: Arc<AtomicU64>,
}

impl<T> Clone for BatchQueue<T> {
  fn clone(&self) -> Self {
    Self {
      tx: self.tx.clone(),
      dropped: self.dropped.clone(),
    }
  }
}

impl<T> BatchQueue<T> {
  /// Enqueue without waiting. Returns false if the item was dropped because
  /// the queue is full or no longer accepting items.
  pub fn push(&self, item: T) -> bool {
    match self.tx.try_send(item) {
      Ok(()) => true,
      Err(TrySendError::Full(_)) => {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        error!(len = self.len(), "queue is full (consider increasing buffer size)");
        false
      }
      Err(TrySendError::Closed(_)) => {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("queue is closed, dropping item");
        false
      }
    }
  }

  /// Items waiting to be picked up by the coordinating loop.
  pub fn len(&self) -> usize {
    self.tx.max_capacity() - self.tx.capacity()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn capacity(&self) -> usize {
    self.tx.max_capacity()
  }

  /// Items rejected since the queue was created.
  pub fn dropped(&self) -> u64 {
    self.dropped.load(Ordering::Relaxed)
  }

  /// A probe for gauges that does not keep the queue open.
  pub fn probe(&self) -> QueueProbe<T> {
    QueueProbe {
      tx: self.tx.downgrade(),
      dropped: self.dropped.clone(),
    }
  }
}

/// Read-only view of a queue's length and drop counter.
pub struct QueueProbe<T> {
  tx: mpsc::WeakSender<T>,
  dropped: Arc<AtomicU64>,
}

impl<T> QueueProbe<T> {
  /// Current length, or 0 once every producer handle is gone.
  pub fn len(&self) -> usize {
    self
      .tx
      .upgrade()
      .map(|tx| tx.max_capacity() - tx.capacity())
      .unwrap_or(0)
  }

  pub fn dropped(&self) -> u64 {
    self.dropped.load(Ordering::Relaxed)
  }
}
