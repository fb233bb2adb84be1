// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Registry for managing metrics.

use parcel_core::telemetry::{MetricId, MetricType, MetricValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Debug)]
struct HistogramData {
    count: u64,
    sum: f64,
    bucket_bounds: Vec<f64>,
    bucket_counts: Vec<u64>,
}

#[derive(Debug)]
enum MetricCell {
    Counter(AtomicU64),
    Histogram(Mutex<HistogramData>),
}

impl MetricCell {
    fn metric_type(&self) -> MetricType {
        match self {
            MetricCell::Counter(_) => MetricType::Counter,
            MetricCell::Histogram(_) => MetricType::Histogram,
        }
    }

    fn read(&self) -> MetricValue {
        match self {
            MetricCell::Counter(value) => MetricValue::Counter(value.load(Ordering::Relaxed)),
            MetricCell::Histogram(data) => {
                let data = data.lock().unwrap_or_else(PoisonError::into_inner);
                MetricValue::Histogram {
                    count: data.count,
                    sum: data.sum,
                    bucket_bounds: data.bucket_bounds.clone(),
                    bucket_counts: data.bucket_counts.clone(),
                }
            }
        }
    }
}

#[derive(Debug)]
struct MetricEntry {
    description: String,
    cell: Arc<MetricCell>,
}

/// Central in-memory registry for pipeline metrics.
///
/// Cloning the registry is cheap and every clone shares the same storage, so
/// one registry can be handed to the resolver running on the background
/// worker and read back from the foreground.
///
/// Recording through a handle never fails: metrics must not be able to break
/// resolution.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    entries: Arc<RwLock<HashMap<MetricId, MetricEntry>>>,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &self,
        id: MetricId,
        description: String,
        make: impl FnOnce() -> MetricCell,
    ) -> Arc<MetricCell> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let fresh = make();

        if let Some(existing) = entries.get(&id) {
            if existing.cell.metric_type() == fresh.metric_type() {
                return Arc::clone(&existing.cell);
            }
            log::error!(
                "Metric {} already registered as {:?}; new {:?} handle will not be reported",
                id,
                existing.cell.metric_type(),
                fresh.metric_type()
            );
            return Arc::new(fresh);
        }

        let cell = Arc::new(fresh);
        entries.insert(
            id,
            MetricEntry {
                description,
                cell: Arc::clone(&cell),
            },
        );
        cell
    }

    /// Registers a counter, or returns the existing one with the same id.
    pub fn register_counter(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> CounterHandle {
        let cell = self.register(MetricId::new(namespace, name), description.into(), || {
            MetricCell::Counter(AtomicU64::new(0))
        });
        CounterHandle { cell }
    }

    /// Registers a histogram with the given bucket upper bounds, or returns
    /// the existing one with the same id.
    pub fn register_histogram(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        mut buckets: Vec<f64>,
    ) -> HistogramHandle {
        buckets.sort_by(f64::total_cmp);
        let cell = self.register(MetricId::new(namespace, name), description.into(), || {
            let bucket_counts = vec![0; buckets.len() + 1];
            MetricCell::Histogram(Mutex::new(HistogramData {
                count: 0,
                sum: 0.0,
                bucket_bounds: buckets,
                bucket_counts,
            }))
        });
        HistogramHandle { cell }
    }

    /// Reads the current value of a metric.
    pub fn get(&self, id: &MetricId) -> Option<MetricValue> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).map(|entry| entry.cell.read())
    }

    /// Reads a counter by namespace and name.
    pub fn counter_value(&self, namespace: &str, name: &str) -> Option<u64> {
        self.get(&MetricId::new(namespace, name))
            .and_then(|value| value.as_counter())
    }

    /// Returns every metric, sorted by id.
    pub fn snapshot(&self) -> Vec<(MetricId, MetricValue)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut values: Vec<_> = entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.cell.read()))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        values
    }

    /// Number of registered metrics.
    pub fn metric_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Writes every metric to the log at `info` level.
    pub fn log_snapshot(&self) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = entries.keys().collect();
        ids.sort();
        for id in ids {
            let entry = &entries[id];
            log::info!("{} = {} ({})", id, entry.cell.read(), entry.description);
        }
    }
}

/// Handle for counter updates.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    cell: Arc<MetricCell>,
}

impl CounterHandle {
    /// Increments the counter by 1.
    pub fn increment(&self) {
        self.increment_by(1);
    }

    /// Increments the counter by `amount`.
    pub fn increment_by(&self, amount: u64) {
        if let MetricCell::Counter(value) = self.cell.as_ref() {
            value.fetch_add(amount, Ordering::Relaxed);
        }
    }

    /// Current count.
    pub fn get(&self) -> u64 {
        self.cell.read().as_counter().unwrap_or(0)
    }
}

/// Handle for histogram samples.
#[derive(Debug, Clone)]
pub struct HistogramHandle {
    cell: Arc<MetricCell>,
}

impl HistogramHandle {
    /// Records a sample.
    pub fn observe(&self, sample: f64) {
        if let MetricCell::Histogram(data) = self.cell.as_ref() {
            let mut data = data.lock().unwrap_or_else(PoisonError::into_inner);
            let bucket = data
                .bucket_bounds
                .iter()
                .position(|bound| sample <= *bound)
                .unwrap_or(data.bucket_bounds.len());
            data.bucket_counts[bucket] += 1;
            data.count += 1;
            data.sum += sample;
        }
    }

    /// Current reading.
    pub fn get(&self) -> MetricValue {
        self.cell.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_shared_between_clones() {
        let registry = MetricsRegistry::new();
        let counter = registry.register_counter("resolver", "fetch_batches", "Batches issued");
        let same = registry
            .clone()
            .register_counter("resolver", "fetch_batches", "Batches issued");

        counter.increment();
        same.increment_by(2);

        assert_eq!(counter.get(), 3);
        assert_eq!(registry.counter_value("resolver", "fetch_batches"), Some(3));
        assert_eq!(registry.metric_count(), 1);
    }

    #[test]
    fn histogram_samples_fall_into_buckets() {
        let registry = MetricsRegistry::new();
        let histogram =
            registry.register_histogram("resolver", "fetch_time", "Fetch time", vec![10.0, 1.0]);

        histogram.observe(0.5);
        histogram.observe(5.0);
        histogram.observe(50.0);

        match histogram.get() {
            MetricValue::Histogram {
                count,
                bucket_bounds,
                bucket_counts,
                ..
            } => {
                assert_eq!(count, 3);
                assert_eq!(bucket_bounds, vec![1.0, 10.0]);
                assert_eq!(bucket_counts, vec![1, 1, 1]);
            }
            other => panic!("unexpected metric value {other:?}"),
        }
        assert_eq!(histogram.get().mean(), Some(55.5 / 3.0));
    }

    #[test]
    fn type_clash_returns_a_detached_handle() {
        let registry = MetricsRegistry::new();
        registry.register_counter("bridge", "requests", "Requests sent");
        let detached = registry.register_histogram("bridge", "requests", "oops", vec![1.0]);

        detached.observe(1.0);

        assert_eq!(registry.counter_value("bridge", "requests"), Some(0));
        assert_eq!(registry.snapshot().len(), 1);
    }
}
