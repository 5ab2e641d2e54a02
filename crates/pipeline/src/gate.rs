//! Counting semaphore bounding concurrent batch handling.

use std::{future::Future, sync::Arc};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Concurrency gate closed")]
pub struct GateClosed;

/// Bounds how many expensive operations run at once.
///
/// Clones share the same permits. A permit is released when its
/// [`GatePermit`] is dropped, so early returns, errors and panics all give the
/// slot back.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
  semaphore: Arc<Semaphore>,
  permits: usize,
}

impl ConcurrencyGate {
  /// Create a gate with `permits` slots (at least one).
  pub fn new(permits: usize) -> Self {
    let permits = permits.max(1);
    Self {
      semaphore: Arc::new(Semaphore::new(permits)),
      permits,
    }
  }

  /// Create a gate sized to the number of CPUs.
  pub fn with_available_parallelism() -> Self {
    Self::new(num_cpus::get())
  }

  pub fn permits(&self) -> usize {
    self.permits
  }

  /// Slots not currently held.
  pub fn available(&self) -> usize {
    self.semaphore.available_permits()
  }

  /// Wait for a free slot.
  pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
    let permit = self.semaphore.clone().acquire_owned().await.map_err(|_| GateClosed)?;
    Ok(GatePermit { _permit: permit })
  }

  /// Run `fut` while holding a slot.
  pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, GateClosed> {
    let _permit = self.acquire().await?;
    Ok(fut.await)
  }

  /// Reject current and future waiters. Held permits stay valid.
  pub fn close(&self) {
    self.semaphore.close();
  }

  pub fn is_closed(&self) -> bool {
    self.semaphore.is_closed()
  }
}

impl Default for ConcurrencyGate {
  fn default() -> Self {
    Self::with_available_parallelism()
  }
}

/// A held gate slot, released on drop.
#[derive(Debug)]
pub struct GatePermit {
  _permit: OwnedSemaphorePermit,
}
