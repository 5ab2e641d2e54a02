//! Concurrency-safe batching pipeline for telemetry items.
//!
//! Producers hand items to a [`BatchProcessor`], which sheds load instead of
//! blocking when its queue is full. A single coordinating task groups queued
//! items into bounded batches and hands them to a [`BatchSink`]:
//!
//! ```text
//! producers ──add_item──▶ BatchQueue ──▶ FlushScheduler ──▶ BatchSink
//!                          (bounded)     (size | timeout)      │
//!                                                              ▼
//!                                   WorkerPool (WorkerContext per task, gated)
//!                                                              │
//!                                                              ▼
//!                                                      downstream sink
//! ```
//!
//! Every accepted item reaches the sink exactly once, including the items still
//! queued or accumulated when the processor shuts down.

pub mod enrichment;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod processor;
pub mod worker;

pub use batchline_core::{Attributes, Config, ConfigError, ProcessorConfig, ProjectId, ProjectRecord, WorkerConfig};

pub use self::{
  enrichment::{LookupError, ProjectProvider, StaticProjectProvider},
  error::PipelineError,
  gate::{ConcurrencyGate, GateClosed, GatePermit},
  metrics::{GaugeRegistry, MetricsError, MetricsRegistry},
  processor::{Batch, BatchProcessor, BatchSink, FnSink, ProcessorHandle, ProcessorState, ProcessorStats, SinkError},
  worker::{Enricher, ItemAccessors, SpanEnricher, WorkerContext, WorkerPool, WorkerStats},
};
