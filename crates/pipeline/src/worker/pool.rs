//! Worker pool consuming flushed batches.
//!
//! Workers share one receiver behind a mutex and take batches in turn. Each
//! batch is enriched and handed to the sink while holding a gate slot, so at
//! most `gate.permits()` batches are in flight however many workers exist.

use std::sync::Arc;

use tokio::{
  sync::{Mutex, mpsc},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use super::{Enricher, WorkerContext};
use crate::{
  enrichment::ProjectProvider,
  gate::ConcurrencyGate,
  processor::{Batch, BatchSink},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
  pub batches_processed: u64,
  pub items_processed: u64,
  /// Batches received but skipped because the pool was cancelled.
  pub batches_cancelled: u64,
  pub sink_failures: u64,
}

impl WorkerStats {
  fn merge(&mut self, other: WorkerStats) {
    self.batches_processed += other.batches_processed;
    self.items_processed += other.items_processed;
    self.batches_cancelled += other.batches_cancelled;
    self.sink_failures += other.sink_failures;
  }
}

pub struct WorkerPool {
  workers: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
  /// Spawn `workers` tasks (at least one) reading from `rx`.
  ///
  /// Workers stop when `rx` is closed and empty, or when `cancel` fires. On
  /// cancellation `rx` is closed; a batch received after it, still waiting
  /// on the gate, or still queued is dropped, logged and counted in
  /// [`WorkerStats::batches_cancelled`].
  #[allow(clippy::too_many_arguments)]
  pub fn spawn<T, E, S>(
    workers: usize,
    rx: mpsc::Receiver<Batch<T>>,
    provider: Arc<dyn ProjectProvider>,
    enricher: Arc<E>,
    sink: Arc<S>,
    gate: ConcurrencyGate,
    cancel: CancellationToken,
  ) -> Self
  where
    T: Send + Sync + 'static,
    E: Enricher<T> + ?Sized + 'static,
    S: BatchSink<T> + ?Sized + 'static,
  {
    let workers = workers.max(1);
    let rx = Arc::new(Mutex::new(rx));
    info!(workers, permits = gate.permits(), "Starting worker pool");

    let workers = (0..workers)
      .map(|worker_id| {
        let worker = WorkerContext::new(worker_id, provider.clone());
        tokio::spawn(run_worker(
          worker,
          rx.clone(),
          enricher.clone(),
          sink.clone(),
          gate.clone(),
          cancel.clone(),
        ))
      })
      .collect();

    Self { workers }
  }

  pub fn len(&self) -> usize {
    self.workers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.workers.is_empty()
  }

  /// Wait for every worker to stop and sum their stats.
  pub async fn join(self) -> WorkerStats {
    let mut total = WorkerStats::default();
    for result in futures::future::join_all(self.workers).await {
      match result {
        Ok(stats) => total.merge(stats),
        Err(e) => error!(error = %e, "Worker task failed"),
      }
    }
    total
  }
}

async fn run_worker<T, E, S>(
  mut worker: WorkerContext,
  rx: Arc<Mutex<mpsc::Receiver<Batch<T>>>>,
  enricher: Arc<E>,
  sink: Arc<S>,
  gate: ConcurrencyGate,
  cancel: CancellationToken,
) -> WorkerStats
where
  T: Send + Sync + 'static,
  E: Enricher<T> + ?Sized,
  S: BatchSink<T> + ?Sized,
{
  let worker_id = worker.id();
  trace!(worker_id, "Worker starting");

  let mut stats = WorkerStats::default();

  loop {
    let batch = {
      let mut rx_guard = rx.lock().await;
      tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        batch = rx_guard.recv() => batch,
      }
    };

    let Some(mut batch) = batch else {
      break;
    };

    if cancel.is_cancelled() {
      warn!(worker_id, seq = batch.seq(), items = batch.len(), "Dropping batch, worker pool cancelled");
      stats.batches_cancelled += 1;
      break;
    }

    let _permit = tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        warn!(worker_id, seq = batch.seq(), items = batch.len(), "Dropping batch, cancelled waiting for a slot");
        stats.batches_cancelled += 1;
        break;
      }
      permit = gate.acquire() => match permit {
        Ok(permit) => permit,
        Err(e) => {
          error!(worker_id, seq = batch.seq(), error = %e, "Dropping batch");
          stats.batches_cancelled += 1;
          break;
        }
      },
    };

    for item in batch.items_mut() {
      enricher.enrich(&mut worker, item).await;
    }

    let seq = batch.seq();
    let items = batch.len() as u64;
    match sink.process_batch(batch).await {
      Ok(()) => {
        stats.batches_processed += 1;
        stats.items_processed += items;
        trace!(worker_id, seq, items, "Processed batch");
      }
      Err(e) => {
        stats.sink_failures += 1;
        error!(worker_id, seq, items, error = %e, "Sink failed to process batch");
      }
    }
  }

  if cancel.is_cancelled() {
    stats.batches_cancelled += discard_pending(worker_id, &rx).await;
  }

  trace!(
    worker_id,
    processed = stats.batches_processed,
    cancelled = stats.batches_cancelled,
    cached_projects = worker.cached_projects(),
    "Worker stopped"
  );
  stats
}

/// Close the shared receiver and drop whatever is still queued, logging each
/// batch. Senders see the channel as closed from here on.
async fn discard_pending<T>(worker_id: usize, rx: &Mutex<mpsc::Receiver<Batch<T>>>) -> u64 {
  let mut rx = rx.lock().await;
  rx.close();

  let mut discarded = 0;
  while let Ok(batch) = rx.try_recv() {
    warn!(worker_id, seq = batch.seq(), items = batch.len(), "Dropping queued batch, worker pool cancelled");
    discarded += 1;
  }
  discarded
}
