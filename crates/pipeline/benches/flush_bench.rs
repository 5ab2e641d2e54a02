//! Benchmarks for the batching hot path
//!
//! Run with: cargo bench -p batchline

use std::{hint::black_box, sync::Arc, time::Duration};

use batchline::{
  StaticProjectProvider, WorkerContext,
  processor::{FlushScheduler, channel},
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

fn bench_scheduler_push(c: &mut Criterion) {
  let mut group = c.benchmark_group("scheduler_push");

  for batch_size in [10, 100, 1000].iter() {
    group.throughput(Throughput::Elements(*batch_size as u64));
    group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
      let mut scheduler = FlushScheduler::new(batch_size, Duration::from_secs(5));
      b.iter(|| {
        let mut flushed = 0;
        for i in 0..batch_size {
          if let Some(batch) = scheduler.push(black_box(i as u64)) {
            flushed += batch.len();
          }
        }
        flushed
      });
    });
  }

  group.finish();
}

fn bench_queue_push(c: &mut Criterion) {
  let mut group = c.benchmark_group("queue_push");

  group.bench_function("accept", |b| {
    let (queue, mut rx) = channel::<u64>(1024);
    b.iter(|| {
      queue.push(black_box(7));
      rx.try_recv().ok()
    });
  });

  group.bench_function("shed", |b| {
    let (queue, _rx) = channel::<u64>(1);
    queue.push(0);
    b.iter(|| queue.push(black_box(7)));
  });

  group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
  let mut group = c.benchmark_group("fingerprint");
  let mut worker = WorkerContext::new(0, Arc::new(StaticProjectProvider::default()));

  for size in [16, 64, 256].iter() {
    let name = "a".repeat(*size);
    group.throughput(Throughput::Bytes(*size as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), &name, |b, name| {
      b.iter(|| worker.fingerprint(black_box(1), &[name.as_bytes()]));
    });
  }

  group.finish();
}

criterion_group!(benches, bench_scheduler_push, bench_queue_push, bench_fingerprint);
criterion_main!(benches);
