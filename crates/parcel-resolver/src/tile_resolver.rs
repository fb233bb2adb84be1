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

//! The session cache mapping tiles to scene ids and scene ids to land data.

use crate::empty_tiles::EmptyTileSynthesizer;
use crate::metrics::ResolverMetrics;
use parcel_core::{
    CatalogSource, ContentFetcher, EntityKind, LandData, LifecycleConfig, PendingRequest,
    ResolveError, ResolveResult, ResolverConfig, SceneId, SceneMappingEntry, SceneRecord, Tile,
};
use parcel_telemetry::{MetricsRegistry, ScopedMetricTimer};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type TileSlot = PendingRequest<Option<SceneId>>;
type LandSlot = PendingRequest<Arc<LandData>>;

/// The two maps shared between the resolver and its in-flight fetch tasks.
///
/// Locks are taken for short synchronous sections only, never across an await.
#[derive(Default)]
struct ResolverCache {
    tiles: Mutex<HashMap<Tile, TileSlot>>,
    scenes: Mutex<HashMap<SceneId, LandSlot>>,
}

impl ResolverCache {
    fn tiles(&self) -> MutexGuard<'_, HashMap<Tile, TileSlot>> {
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scenes(&self) -> MutexGuard<'_, HashMap<SceneId, LandSlot>> {
        self.scenes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes a fetch result.
    ///
    /// Land data goes in before any tile settles, so a caller woken with a
    /// scene id always finds that scene's land data. Every pointer a record
    /// claims is resolved, including pointers nobody asked for. Requested
    /// tiles the result did not mention resolve to `None` unless an
    /// overlapping batch already settled them.
    fn apply_records(
        &self,
        records: Vec<SceneRecord>,
        requested: &[Tile],
        base_url: &str,
        base_url_bundles: &str,
    ) {
        let claims: Vec<(SceneId, Vec<Tile>)> = {
            let mut scenes = self.scenes();
            records
                .into_iter()
                .map(|record| {
                    let pointers = record.pointers.clone();
                    let land = Arc::new(LandData::from_record(record, base_url, base_url_bundles));
                    let scene_id = land.scene_id.clone();
                    match scenes.entry(scene_id.clone()) {
                        Entry::Occupied(slot) => {
                            slot.get().resolve(land);
                        }
                        Entry::Vacant(slot) => {
                            slot.insert(LandSlot::resolved(land));
                        }
                    }
                    (scene_id, pointers)
                })
                .collect()
        };

        let mut tiles = self.tiles();
        for (scene_id, pointers) in claims {
            for pointer in pointers {
                match tiles.entry(pointer) {
                    Entry::Occupied(slot) => {
                        slot.get().resolve(Some(scene_id.clone()));
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(TileSlot::resolved(Some(scene_id.clone())));
                    }
                }
            }
        }
        for tile in requested {
            if let Some(slot) = tiles.get(tile) {
                if slot.resolve(None) {
                    log::trace!("Tile {} has no deployed scene", tile);
                }
            }
        }
    }

    /// Rejects the still-pending placeholders of `tiles` and forgets them so a
    /// later request fetches again.
    fn reject_tiles(&self, tiles: &[Tile], error: &ResolveError) {
        let mut map = self.tiles();
        for tile in tiles {
            if map.get(tile).is_some_and(|slot| slot.reject(error.clone())) {
                map.remove(tile);
            }
        }
    }

    fn reject_scene(&self, scene_id: &SceneId, slot: &LandSlot, error: ResolveError) {
        if !slot.reject(error) {
            return;
        }
        let mut scenes = self.scenes();
        if scenes.get(scene_id).is_some_and(|cached| cached.same_slot(slot)) {
            scenes.remove(scene_id);
        }
    }
}

/// One batched fetch, detached from the caller that triggered it.
///
/// It runs on its own task so that a caller giving up does not strand the
/// placeholders every other caller is waiting on.
struct BatchFetch {
    fetcher: Arc<dyn ContentFetcher>,
    cache: Arc<ResolverCache>,
    config: ResolverConfig,
    metrics: ResolverMetrics,
    base_url: String,
    base_url_bundles: String,
}

impl BatchFetch {
    async fn run(self, missing: Vec<Tile>) {
        self.metrics.fetch_batches.increment();
        self.metrics.tiles_fetched.increment_by(missing.len() as u64);
        log::debug!("Fetching scenes for {} tiles", missing.len());

        let fetched = {
            let _timer = ScopedMetricTimer::new(&self.metrics.fetch_time_ms);
            self.fetch_with_retry(&missing).await
        };

        match fetched {
            Ok(records) => {
                log::debug!(
                    "Fetched {} scenes for {} tiles",
                    records.len(),
                    missing.len()
                );
                self.cache
                    .apply_records(records, &missing, &self.base_url, &self.base_url_bundles);
            }
            Err(error) => {
                log::warn!("Giving up on {} tiles: {}", missing.len(), error);
                self.cache.reject_tiles(&missing, &error);
            }
        }
    }

    async fn fetch_with_retry(&self, tiles: &[Tile]) -> ResolveResult<Vec<SceneRecord>> {
        let mut attempt = 0;
        loop {
            match self
                .fetcher
                .fetch_scenes_by_pointers(EntityKind::Scene, tiles)
                .await
            {
                Ok(records) => return Ok(records),
                Err(e) if attempt < self.config.fetch_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(self.config.retry_backoff_ms * attempt as u64);
                    log::warn!(
                        "Scene fetch failed (retry {}/{} in {:?}): {:#}",
                        attempt,
                        self.config.fetch_retries,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(ResolveError::UpstreamFetch(format!("{e:#}"))),
            }
        }
    }
}

enum LandClaim {
    Cached(LandSlot),
    Synthesize(LandSlot, Tile),
}

/// Resolves tiles to scene ids and scene ids to land data for one session.
///
/// Concurrent requests for the same key share one [`PendingRequest`], and all
/// tiles missing from the cache in one call go out in a single batched fetch.
/// Results are kept for the lifetime of the resolver. Only placeholders whose
/// fetch failed are removed, so the next request retries them.
pub struct TileResolver {
    lifecycle: LifecycleConfig,
    config: ResolverConfig,
    fetcher: Arc<dyn ContentFetcher>,
    synthesizer: Arc<EmptyTileSynthesizer>,
    cache: Arc<ResolverCache>,
    metrics: ResolverMetrics,
}

impl TileResolver {
    /// Creates a resolver reading scenes from `fetcher` and placeholder scenes from `catalog`.
    pub fn new(
        lifecycle: LifecycleConfig,
        fetcher: Arc<dyn ContentFetcher>,
        catalog: Arc<dyn CatalogSource>,
    ) -> Self {
        let synthesizer = Arc::new(EmptyTileSynthesizer::new(&lifecycle, catalog));
        Self {
            lifecycle,
            config: ResolverConfig::default(),
            fetcher,
            synthesizer,
            cache: Arc::new(ResolverCache::default()),
            metrics: ResolverMetrics::default(),
        }
    }

    /// Sets the retry policy for batched fetches.
    #[must_use]
    pub fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Reports metrics into `registry` instead of a private one.
    #[must_use]
    pub fn with_metrics(mut self, registry: &MetricsRegistry) -> Self {
        self.metrics = ResolverMetrics::new(registry);
        self
    }

    /// The configuration the resolver was initialized with.
    pub fn lifecycle(&self) -> &LifecycleConfig {
        &self.lifecycle
    }

    /// The synthesizer used for empty tiles.
    pub fn synthesizer(&self) -> &EmptyTileSynthesizer {
        &self.synthesizer
    }

    /// Resolves every tile to its scene id, or `None` for empty tiles.
    ///
    /// Returns the first failure if any tile could not be resolved. Use
    /// [`resolve_tiles_settled`](Self::resolve_tiles_settled) to get one
    /// outcome per tile instead.
    pub async fn resolve_tiles(
        &self,
        tiles: &[Tile],
    ) -> ResolveResult<Vec<(Tile, Option<SceneId>)>> {
        self.resolve_tiles_settled(tiles)
            .await
            .into_iter()
            .map(|(tile, outcome)| outcome.map(|scene_id| (tile, scene_id)))
            .collect()
    }

    /// Resolves every tile and reports each outcome separately, in input order.
    pub async fn resolve_tiles_settled(
        &self,
        tiles: &[Tile],
    ) -> Vec<(Tile, ResolveResult<Option<SceneId>>)> {
        let mut outcomes = Vec::with_capacity(tiles.len());
        for (tile, slot) in self.request_tiles(tiles) {
            let outcome = slot.wait().await;
            outcomes.push((tile, outcome));
        }
        outcomes
    }

    /// Returns the placeholder of every tile, in input order, without waiting.
    ///
    /// Tiles without a placeholder are fetched in one batch on a background
    /// task. Each placeholder settles on its own, so callers can act on cached
    /// tiles while the fetch is still running.
    pub fn request_tiles(&self, tiles: &[Tile]) -> Vec<(Tile, PendingRequest<Option<SceneId>>)> {
        self.warm_catalog();

        let (slots, missing) = self.claim_tiles(tiles);
        if !missing.is_empty() {
            self.spawn_fetch(missing);
        }
        slots
    }

    /// Resolves a single tile.
    pub async fn resolve_tile(&self, tile: &Tile) -> ResolveResult<Option<SceneId>> {
        let mut outcomes = self.resolve_tiles_settled(std::slice::from_ref(tile)).await;
        match outcomes.pop() {
            Some((_, outcome)) => outcome,
            None => Ok(None),
        }
    }

    /// Finds or creates the placeholder of every tile in one lock scope.
    ///
    /// Returns the placeholders in input order along with the tiles that had
    /// none, which are the only ones to fetch.
    fn claim_tiles(&self, tiles: &[Tile]) -> (Vec<(Tile, TileSlot)>, Vec<Tile>) {
        let mut map = self.cache.tiles();
        let mut slots = Vec::with_capacity(tiles.len());
        let mut missing = Vec::new();

        for tile in tiles {
            let slot = match map.entry(tile.clone()) {
                Entry::Occupied(slot) => {
                    self.metrics.cache_hits.increment();
                    slot.get().clone()
                }
                Entry::Vacant(slot) => {
                    missing.push(tile.clone());
                    slot.insert(TileSlot::new()).clone()
                }
            };
            slots.push((tile.clone(), slot));
        }

        (slots, missing)
    }

    fn spawn_fetch(&self, missing: Vec<Tile>) {
        let batch = BatchFetch {
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            base_url: self.lifecycle.contents_base_url(),
            base_url_bundles: self.lifecycle.content_server_bundles.clone(),
        };
        let cache = Arc::clone(&self.cache);

        let fetch = tokio::spawn(batch.run(missing.clone()));
        tokio::spawn(async move {
            if let Err(e) = fetch.await {
                log::error!("Scene fetch task for {} tiles died: {}", missing.len(), e);
                cache.reject_tiles(&missing, &ResolveError::UpstreamFetch(e.to_string()));
            }
        });
    }

    /// Starts loading the empty tile catalog in the background so synthesis
    /// does not wait on it later.
    fn warm_catalog(&self) {
        if !self.lifecycle.empty_scenes || self.synthesizer.is_catalog_loaded() {
            return;
        }
        let synthesizer = Arc::clone(&self.synthesizer);
        tokio::spawn(async move {
            if let Err(e) = synthesizer.load_catalog().await {
                log::warn!("Could not preload the empty tile catalog: {}", e);
            }
        });
    }

    /// Returns the land data of `scene_id`.
    ///
    /// A scene id only becomes known through tile resolution. Synthetic ids of
    /// empty tiles are the exception: their land data is synthesized on first
    /// request when empty scenes are enabled. Any other id fails with
    /// [`ResolveError::NotFound`] and leaves the cache untouched.
    pub async fn resolve_land_data(&self, scene_id: &SceneId) -> ResolveResult<Arc<LandData>> {
        let claim = {
            let mut scenes = self.cache.scenes();
            if let Some(slot) = scenes.get(scene_id) {
                LandClaim::Cached(slot.clone())
            } else {
                let tile = self
                    .lifecycle
                    .empty_scenes
                    .then(|| EmptyTileSynthesizer::tile_from_empty_id(scene_id.as_str()))
                    .flatten()
                    .ok_or_else(|| ResolveError::NotFound {
                        scene_id: scene_id.clone(),
                    })?;
                let slot = LandSlot::new();
                scenes.insert(scene_id.clone(), slot.clone());
                LandClaim::Synthesize(slot, tile)
            }
        };

        match claim {
            LandClaim::Cached(slot) => slot.wait().await,
            LandClaim::Synthesize(slot, tile) => {
                self.register_empty_tile(&tile, scene_id);
                self.synthesize_into(scene_id, tile, &slot).await;
                slot.wait().await
            }
        }
    }

    /// Associates an empty tile with its synthetic id if nothing is known
    /// about the tile. A pending fetch keeps the tile.
    fn register_empty_tile(&self, tile: &Tile, scene_id: &SceneId) {
        if let Entry::Vacant(slot) = self.cache.tiles().entry(tile.clone()) {
            slot.insert(TileSlot::resolved(Some(scene_id.clone())));
        }
    }

    async fn synthesize_into(&self, scene_id: &SceneId, tile: Tile, slot: &LandSlot) {
        let synthesizer = Arc::clone(&self.synthesizer);
        let cache = Arc::clone(&self.cache);
        let metrics = self.metrics.clone();
        let task_id = scene_id.clone();
        let task_slot = slot.clone();

        let task = tokio::spawn(async move {
            match synthesizer.synthesize(&task_id, &tile).await {
                Ok(land) => {
                    metrics.empty_synthesized.increment();
                    log::debug!("Synthesized empty scene {} for tile {}", task_id, tile);
                    task_slot.resolve(Arc::new(land));
                }
                Err(error) => {
                    log::warn!("Could not synthesize tile {}: {}", tile, error);
                    cache.reject_scene(&task_id, &task_slot, error);
                }
            }
        });

        if let Err(e) = task.await {
            log::error!("Synthesis task for {} died: {}", scene_id, e);
            self.cache
                .reject_scene(scene_id, slot, ResolveError::UpstreamFetch(e.to_string()));
        }
    }

    /// Returns the land data of the scene on `tile`, waiting only on
    /// placeholders that already exist. Never starts a fetch.
    pub async fn get_land_data_by_tile(&self, tile: &Tile) -> ResolveResult<Option<Arc<LandData>>> {
        let tile_slot = self.cache.tiles().get(tile).cloned();
        let Some(tile_slot) = tile_slot else {
            return Ok(None);
        };
        let Some(scene_id) = tile_slot.wait().await? else {
            return Ok(None);
        };

        let land_slot = self.cache.scenes().get(&scene_id).cloned();
        match land_slot {
            Some(slot) => slot.wait().await.map(Some),
            None => Ok(None),
        }
    }

    /// Returns a tile known to belong to `scene_id`, preferring the scene's base tile.
    pub fn get_tile_by_scene_id(&self, scene_id: &SceneId) -> Option<Tile> {
        if let Some(base) = self
            .land_data_by_scene_id(scene_id)
            .and_then(|land| land.scene_json_data.base_tile().cloned())
        {
            return Some(base);
        }

        let tiles = self.cache.tiles();
        tiles
            .iter()
            .filter(|(_, slot)| matches!(slot.peek(), Some(Ok(Some(id))) if id == *scene_id))
            .map(|(tile, _)| tile)
            .min()
            .cloned()
    }

    /// Returns the land data of `scene_id` if it is already resolved.
    pub fn land_data_by_scene_id(&self, scene_id: &SceneId) -> Option<Arc<LandData>> {
        self.cache
            .scenes()
            .get(scene_id)
            .and_then(|slot| slot.peek())
            .and_then(Result::ok)
    }

    /// Seeds tile to scene associations from a precomputed table.
    ///
    /// Tiles that are already resolved keep their value.
    pub fn set_scene_roots(&self, entries: impl IntoIterator<Item = SceneMappingEntry>) {
        let mut tiles = self.cache.tiles();
        let mut seeded = 0usize;
        for entry in entries {
            if tiles
                .entry(entry.parcel_id)
                .or_insert_with(TileSlot::new)
                .resolve(Some(entry.root_cid))
            {
                seeded += 1;
            }
        }
        log::debug!("Seeded {} tiles from scene roots", seeded);
    }

    /// Number of tiles with a placeholder, pending or resolved.
    pub fn cached_tile_count(&self) -> usize {
        self.cache.tiles().len()
    }

    /// Number of scenes with a land data placeholder, pending or resolved.
    pub fn cached_scene_count(&self) -> usize {
        self.cache.scenes().len()
    }
}

impl std::fmt::Debug for TileResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileResolver")
            .field("content_server", &self.lifecycle.content_server)
            .field("tiles", &self.cached_tile_count())
            .field("scenes", &self.cached_scene_count())
            .finish()
    }
}
