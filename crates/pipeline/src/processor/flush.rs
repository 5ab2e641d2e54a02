//! Decides when accumulated items become a batch.
//!
//! The scheduler keeps a monotonic deadline instead of a resettable timer.
//! The loop sleeps until [`FlushScheduler::deadline`], which is recomputed on
//! every size flush and every expiry, so a timer that already fired can never
//! trigger a second flush of the same items.

use std::time::Duration;

use tokio::time::Instant;

pub struct FlushScheduler<T> {
  items: Vec<T>,
  batch_size: usize,
  timeout: Duration,
  deadline: Instant,
}

impl<T> FlushScheduler<T> {
  pub fn new(batch_size: usize, timeout: Duration) -> Self {
    let batch_size = batch_size.max(1);
    Self {
      items: Vec::with_capacity(batch_size),
      batch_size,
      timeout,
      deadline: Instant::now() + timeout,
    }
  }

  /// Append an item. Returns a full batch once `batch_size` is reached and
  /// restarts the timeout.
  pub fn push(&mut self, item: T) -> Option<Vec<T>> {
    self.items.push(item);
    if self.items.len() < self.batch_size {
      return None;
    }

    self.reset_deadline();
    Some(self.take())
  }

  /// The timeout elapsed: returns the partial batch, if any, and restarts the
  /// timeout either way.
  pub fn expire(&mut self) -> Option<Vec<T>> {
    self.reset_deadline();
    self.take_pending()
  }

  /// Hand out whatever is left. Used once, on shutdown.
  pub fn drain(&mut self) -> Option<Vec<T>> {
    self.take_pending()
  }

  pub fn deadline(&self) -> Instant {
    self.deadline
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  fn reset_deadline(&mut self) {
    self.deadline = Instant::now() + self.timeout;
  }

  fn take_pending(&mut self) -> Option<Vec<T>> {
    if self.items.is_empty() { None } else { Some(self.take()) }
  }

  fn take(&mut self) -> Vec<T> {
    std::mem::replace(&mut self.items, Vec::with_capacity(self.batch_size))
  }
}
