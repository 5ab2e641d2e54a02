//! Batch processor - owns the queue and the coordinating loop.
//!
//! ```text
//!            add_item (never blocks)
//! producers ─────────────────────────▶ BatchQueue ──▶ loop ──▶ BatchSink
//!                                       bounded       │
//!                                                     ├─ size reached  → flush
//!                                                     ├─ deadline hit  → flush partial
//!                                                     └─ cancelled     → drain, flush rest
//! ```
//!
//! The accumulator is owned by the loop task alone, so it needs no lock.
//!
//! ## Lifecycle
//!
//! `Init → Running → Draining → Stopped`. Once cancelled, the loop closes the
//! queue (later `add_item` calls count as drops), batches every item that was
//! already accepted, flushes the remainder once and stops. The drain has no
//! timeout: a sink that never returns holds shutdown open.

mod flush;
mod queue;
mod sink;

use batchline_core::ProcessorConfig;
use tokio::{
  sync::{mpsc, watch},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

pub use self::{
  flush::FlushScheduler,
  queue::{BatchQueue, QueueProbe, channel},
  sink::{Batch, BatchSink, FnSink, SinkError},
};
use crate::{
  error::PipelineError,
  metrics::{GaugeRegistry, MetricsError},
};

/// Gauge reporting items waiting in the queue of an unnamed processor.
pub const QUEUE_LENGTH_GAUGE: &str = "processor.queue_length";
/// Gauge reporting items an unnamed processor shed since startup.
pub const DROPPED_ITEMS_GAUGE: &str = "processor.dropped_items";

/// Queue length gauge of the processor called `name`.
pub fn queue_length_gauge(name: &str) -> String {
  gauge_name(name, "queue_length")
}

/// Dropped items gauge of the processor called `name`.
pub fn dropped_items_gauge(name: &str) -> String {
  gauge_name(name, "dropped_items")
}

/// `processor.<name>.<metric>`, or `processor.<metric>` when unnamed.
fn gauge_name(name: &str, metric: &str) -> String {
  if name.is_empty() {
    format!("processor.{metric}")
  } else {
    format!("processor.{name}.{metric}")
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
  Init,
  Running,
  Draining,
  Stopped,
}

/// Totals reported when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorStats {
  pub batches_flushed: u64,
  pub items_flushed: u64,
  pub items_dropped: u64,
  pub sink_failures: u64,
}

/// Producer handle. Cheap to clone and safe to use from any task or thread.
pub struct ProcessorHandle<T> {
  queue: BatchQueue<T>,
}

impl<T> Clone for ProcessorHandle<T> {
  fn clone(&self) -> Self {
    Self {
      queue: self.queue.clone(),
    }
  }
}

impl<T> ProcessorHandle<T> {
  /// Enqueue an item without waiting.
  ///
  /// A full or stopped queue drops the item; the drop is logged and counted
  /// but not reported to the caller.
  pub fn add_item(&self, item: T) {
    if self.queue.push(item) {
      trace!(len = self.queue.len(), "Item queued");
    }
  }

  pub fn queue_len(&self) -> usize {
    self.queue.len()
  }

  pub fn dropped_items(&self) -> u64 {
    self.queue.dropped()
  }
}

/// A running batch processor.
pub struct BatchProcessor<T> {
  handle: ProcessorHandle<T>,
  state: watch::Receiver<ProcessorState>,
  cancel: CancellationToken,
  task: JoinHandle<ProcessorStats>,
}

impl<T: Send + 'static> BatchProcessor<T> {
  /// Validate `config`, register the processor's gauges and spawn the loop.
  ///
  /// The loop stops when `cancel` (or [`shutdown`](Self::shutdown)) fires.
  /// Failing to register a gauge is fatal: nothing is spawned and the error is
  /// returned.
  pub fn start<S>(
    config: &ProcessorConfig,
    sink: S,
    registry: &dyn GaugeRegistry,
    cancel: &CancellationToken,
  ) -> Result<Self, PipelineError>
  where
    S: BatchSink<T> + 'static,
  {
    config.validate()?;

    let (queue, rx) = queue::channel(config.buffer_size);
    register_gauges(registry, &config.name, &queue)?;

    info!(
      processor = %config.name,
      threads = num_cpus::get(),
      batch_size = config.batch_size,
      buffer_size = config.buffer_size,
      flush_timeout_ms = config.flush_timeout_ms,
      "Starting processor"
    );

    let cancel = cancel.child_token();
    let (state_tx, state_rx) = watch::channel(ProcessorState::Init);
    let batch_loop = BatchLoop {
      rx,
      scheduler: FlushScheduler::new(config.batch_size, config.flush_timeout()),
      sink,
      state: state_tx,
      probe: queue.probe(),
      stats: ProcessorStats::default(),
      next_seq: 0,
    };
    let task = tokio::spawn(batch_loop.run(cancel.clone()));

    Ok(Self {
      handle: ProcessorHandle { queue },
      state: state_rx,
      cancel,
      task,
    })
  }

  pub fn handle(&self) -> ProcessorHandle<T> {
    self.handle.clone()
  }

  pub fn add_item(&self, item: T) {
    self.handle.add_item(item);
  }

  pub fn queue_len(&self) -> usize {
    self.handle.queue_len()
  }

  pub fn dropped_items(&self) -> u64 {
    self.handle.dropped_items()
  }

  pub fn state(&self) -> ProcessorState {
    *self.state.borrow()
  }

  pub fn subscribe_state(&self) -> watch::Receiver<ProcessorState> {
    self.state.clone()
  }

  /// Stop this processor, flush everything it accepted and wait for the loop.
  pub async fn shutdown(self) -> ProcessorStats {
    self.cancel.cancel();
    self.join().await
  }

  /// Wait for the loop to stop after the parent token was cancelled.
  pub async fn join(self) -> ProcessorStats {
    let Self { handle, task, .. } = self;
    drop(handle);

    match task.await {
      Ok(stats) => stats,
      Err(e) => {
        error!(error = %e, "Processor loop failed");
        ProcessorStats::default()
      }
    }
  }
}

/// Register both gauges or neither.
fn register_gauges<T: Send + 'static>(
  registry: &dyn GaugeRegistry,
  name: &str,
  queue: &BatchQueue<T>,
) -> Result<(), MetricsError> {
  let queue_length = queue_length_gauge(name);
  let probe = queue.probe();
  registry.register_int_gauge(&queue_length, "{items}", Box::new(move || probe.len() as i64))?;

  let probe = queue.probe();
  let dropped = registry.register_int_gauge(
    &dropped_items_gauge(name),
    "{items}",
    Box::new(move || probe.dropped() as i64),
  );
  if let Err(e) = dropped {
    registry.unregister(&queue_length);
    return Err(e);
  }
  Ok(())
}

#[derive(Debug, Clone, Copy)]
enum FlushReason {
  Size,
  Timeout,
  Shutdown,
}

impl FlushReason {
  fn as_str(self) -> &'static str {
    match self {
      Self::Size => "size",
      Self::Timeout => "timeout",
      Self::Shutdown => "shutdown",
    }
  }
}

struct BatchLoop<T, S> {
  rx: mpsc::Receiver<T>,
  scheduler: FlushScheduler<T>,
  sink: S,
  state: watch::Sender<ProcessorState>,
  probe: QueueProbe<T>,
  stats: ProcessorStats,
  next_seq: u64,
}

impl<T, S> BatchLoop<T, S>
where
  T: Send + 'static,
  S: BatchSink<T>,
{
  async fn run(mut self, cancel: CancellationToken) -> ProcessorStats {
    self.state.send_replace(ProcessorState::Running);
    debug!("Processor loop started");

    loop {
      let deadline = self.scheduler.deadline();

      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          debug!(pending = self.scheduler.len(), "Processor cancelled");
          break;
        }

        msg = self.rx.recv() => {
          match msg {
            Some(item) => {
              if let Some(items) = self.scheduler.push(item) {
                self.flush(items, FlushReason::Size).await;
              }
            }
            None => {
              debug!("All producers gone");
              break;
            }
          }
        }

        _ = tokio::time::sleep_until(deadline) => {
          if let Some(items) = self.scheduler.expire() {
            self.flush(items, FlushReason::Timeout).await;
          }
        }
      }
    }

    self.drain().await;

    self.state.send_replace(ProcessorState::Stopped);
    self.stats.items_dropped = self.probe.dropped();
    info!(
      batches = self.stats.batches_flushed,
      items = self.stats.items_flushed,
      dropped = self.stats.items_dropped,
      "Processor stopped"
    );
    self.stats
  }

  async fn drain(&mut self) {
    self.state.send_replace(ProcessorState::Draining);
    self.rx.close();

    let mut queued = 0usize;
    while let Some(item) = self.rx.recv().await {
      queued += 1;
      if let Some(items) = self.scheduler.push(item) {
        self.flush(items, FlushReason::Shutdown).await;
      }
    }

    let pending = self.scheduler.len();
    if let Some(items) = self.scheduler.drain() {
      self.flush(items, FlushReason::Shutdown).await;
    }
    debug!(queued, pending, "Processor drained");
  }

  async fn flush(&mut self, items: Vec<T>, reason: FlushReason) {
    let seq = self.next_seq;
    self.next_seq += 1;
    let len = items.len();

    debug!(seq, batch_size = len, reason = reason.as_str(), "Flushing batch");
    self.stats.batches_flushed += 1;
    self.stats.items_flushed += len as u64;

    if let Err(e) = self.sink.process_batch(Batch::new(seq, items)).await {
      self.stats.sink_failures += 1;
      error!(seq, batch_size = len, error = %e, "Sink failed to process batch");
    }
  }
}
