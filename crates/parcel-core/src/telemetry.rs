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

//! Abstract definitions for pipeline metrics.
//!
//! This module defines the identifiers and values that components report.
//! The registry that stores them lives in `parcel-telemetry`.

use std::fmt::{self, Display};

/// A unique, structured identifier for a metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId {
    /// The broad category of the metric (e.g. "resolver", "bridge").
    pub namespace: String,
    /// The specific name of the metric (e.g. "fetch_batches").
    pub name: String,
}

impl MetricId {
    /// Creates a new `MetricId` with a namespace and a name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// The fundamental type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// A value that only ever increases.
    Counter,
    /// A distribution of measurements.
    Histogram,
}

/// A point-in-time reading of a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Current count.
    Counter(u64),
    /// Recorded samples and their distribution across buckets.
    Histogram {
        /// Number of samples recorded.
        count: u64,
        /// Sum of all samples.
        sum: f64,
        /// Upper bounds of the buckets.
        bucket_bounds: Vec<f64>,
        /// Samples per bucket; the last entry counts samples above every bound.
        bucket_counts: Vec<u64>,
    },
}

impl MetricValue {
    /// Returns the [`MetricType`] corresponding to this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// Returns the count if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            MetricValue::Histogram { .. } => None,
        }
    }

    /// Returns the mean sample if this is a non-empty histogram.
    pub fn mean(&self) -> Option<f64> {
        match self {
            MetricValue::Histogram { count, sum, .. } if *count > 0 => Some(sum / *count as f64),
            _ => None,
        }
    }
}

impl Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(v) => write!(f, "{v}"),
            MetricValue::Histogram { count, .. } => match self.mean() {
                Some(mean) => write!(f, "n={count} mean={mean:.2}"),
                None => write!(f, "n=0"),
            },
        }
    }
}
