//! On-demand gauges.
//!
//! Components register a callback per gauge instead of pushing values on every
//! operation; the registry samples the callbacks when a collector asks. With
//! the `observe` feature enabled, [`MetricsRegistry::publish`] forwards the
//! sampled values to the [`metrics`] facade so any installed recorder (e.g.
//! `metrics-exporter-prometheus`) picks them up.

use dashmap::{DashMap, mapref::entry::Entry};

/// Callback sampled whenever a gauge is collected.
pub type GaugeCallback = Box<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
  #[error("Gauge already registered: {0}")]
  AlreadyRegistered(String),
  #[error("Invalid metric name: {0:?}")]
  InvalidName(String),
}

/// Anything that can sample integer gauges on demand.
pub trait GaugeRegistry: Send + Sync {
  fn register_int_gauge(&self, name: &str, unit: &str, callback: GaugeCallback) -> Result<(), MetricsError>;

  /// Remove a gauge. Returns false if `name` was not registered.
  fn unregister(&self, name: &str) -> bool;
}

/// A single sampled gauge value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeSample {
  pub name: String,
  pub unit: String,
  pub value: i64,
}

struct Gauge {
  unit: String,
  callback: GaugeCallback,
}

/// Default [`GaugeRegistry`]: a concurrent map of named callbacks.
#[derive(Default)]
pub struct MetricsRegistry {
  gauges: DashMap<String, Gauge>,
}

impl MetricsRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sample one gauge.
  pub fn sample(&self, name: &str) -> Option<i64> {
    self.gauges.get(name).map(|gauge| (gauge.callback)())
  }

  /// Sample every registered gauge, sorted by name.
  pub fn collect(&self) -> Vec<GaugeSample> {
    let mut samples: Vec<GaugeSample> = self
      .gauges
      .iter()
      .map(|entry| GaugeSample {
        name: entry.key().clone(),
        unit: entry.unit.clone(),
        value: (entry.callback)(),
      })
      .collect();
    samples.sort_by(|a, b| a.name.cmp(&b.name));
    samples
  }

  pub fn len(&self) -> usize {
    self.gauges.len()
  }

  pub fn is_empty(&self) -> bool {
    self.gauges.is_empty()
  }

  /// Push the current value of every gauge to the `metrics` recorder.
  #[cfg(feature = "observe")]
  pub fn publish(&self) {
    for sample in self.collect() {
      metrics::gauge!(sample.name).set(sample.value as f64);
    }
  }
}

impl GaugeRegistry for MetricsRegistry {
  fn register_int_gauge(&self, name: &str, unit: &str, callback: GaugeCallback) -> Result<(), MetricsError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
      return Err(MetricsError::InvalidName(name.to_string()));
    }

    match self.gauges.entry(name.to_string()) {
      Entry::Occupied(_) => Err(MetricsError::AlreadyRegistered(name.to_string())),
      Entry::Vacant(slot) => {
        slot.insert(Gauge {
          unit: unit.to_string(),
          callback,
        });
        Ok(())
      }
    }
  }

  fn unregister(&self, name: &str) -> bool {
    self.gauges.remove(name).is_some()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
  };

  use super::*;

  #[test]
  fn test_gauge_is_sampled_on_demand() {
    let registry = MetricsRegistry::new();
    let value = Arc::new(AtomicI64::new(3));

    let probe = value.clone();
    registry
      .register_int_gauge("processor.queue_length", "{items}", Box::new(move || probe.load(Ordering::Relaxed)))
      .unwrap();

    assert_eq!(registry.sample("processor.queue_length"), Some(3));
    value.store(11, Ordering::Relaxed);
    assert_eq!(registry.sample("processor.queue_length"), Some(11));
    assert_eq!(registry.sample("missing"), None);
  }

  #[test]
  fn test_duplicate_registration_is_rejected() {
    let registry = MetricsRegistry::new();
    registry.register_int_gauge("a", "1", Box::new(|| 1)).unwrap();

    let err = registry.register_int_gauge("a", "1", Box::new(|| 2)).unwrap_err();
    assert!(matches!(err, MetricsError::AlreadyRegistered(name) if name == "a"));
    assert_eq!(registry.sample("a"), Some(1));
  }

  #[test]
  fn test_invalid_names_are_rejected() {
    let registry = MetricsRegistry::new();
    assert!(registry.register_int_gauge("", "1", Box::new(|| 0)).is_err());
    assert!(registry.register_int_gauge("queue length", "1", Box::new(|| 0)).is_err());
    assert!(registry.is_empty());
  }

  #[test]
  fn test_collect_is_sorted() {
    let registry = MetricsRegistry::new();
    registry.register_int_gauge("b", "{items}", Box::new(|| 2)).unwrap();
    registry.register_int_gauge("a", "{items}", Box::new(|| 1)).unwrap();

    let samples = registry.collect();
    let names: Vec<_> = samples.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(samples[1].value, 2);
    assert_eq!(samples[0].unit, "{items}");
  }

  #[test]
  fn test_unregister() {
    let registry = MetricsRegistry::new();
    registry.register_int_gauge("a", "1", Box::new(|| 1)).unwrap();

    assert!(registry.unregister("a"));
    assert!(!registry.unregister("a"));
    assert!(registry.register_int_gauge("a", "1", Box::new(|| 5)).is_ok());
    assert_eq!(registry.len(), 1);
  }
}
