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

use parcel_telemetry::{CounterHandle, HistogramHandle, MetricsRegistry};

/// Namespace under which every resolver metric is registered.
pub const RESOLVER_NAMESPACE: &str = "resolver";

/// A collection of metric handles used by the tile resolver.
#[derive(Debug, Clone)]
pub(crate) struct ResolverMetrics {
    /// Batched content fetches issued, retries excluded.
    pub(crate) fetch_batches: CounterHandle,
    /// Tiles sent to the content service.
    pub(crate) tiles_fetched: CounterHandle,
    /// Tile lookups answered by an existing placeholder.
    pub(crate) cache_hits: CounterHandle,
    /// Land data built for empty tiles.
    pub(crate) empty_synthesized: CounterHandle,
    /// Histogram for batch fetch time in milliseconds, retries included.
    pub(crate) fetch_time_ms: HistogramHandle,
}

impl ResolverMetrics {
    pub(crate) fn new(registry: &MetricsRegistry) -> Self {
        Self {
            fetch_batches: registry.register_counter(
                RESOLVER_NAMESPACE,
                "fetch_batches",
                "Batched content fetches issued",
            ),
            tiles_fetched: registry.register_counter(
                RESOLVER_NAMESPACE,
                "tiles_fetched",
                "Tiles sent to the content service",
            ),
            cache_hits: registry.register_counter(
                RESOLVER_NAMESPACE,
                "cache_hits",
                "Tile lookups served by an existing placeholder",
            ),
            empty_synthesized: registry.register_counter(
                RESOLVER_NAMESPACE,
                "empty_synthesized",
                "Placeholder land data synthesized for empty tiles",
            ),
            fetch_time_ms: registry.register_histogram(
                RESOLVER_NAMESPACE,
                "fetch_time",
                "Batch fetch time in ms",
                vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0],
            ),
        }
    }
}

impl Default for ResolverMetrics {
    fn default() -> Self {
        Self::new(&MetricsRegistry::new())
    }
}
