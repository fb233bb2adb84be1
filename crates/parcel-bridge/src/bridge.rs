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

//! The foreground side of the bridge.

use crate::channel::{Endpoint, Inbox, Outbox};
use parcel_core::protocol::{DataRequest, IdRequest};
use parcel_core::{
    BridgeConfig, BridgeMessage, LandData, LifecycleConfig, PendingRequest, RequestKey,
    ResolveError, ResolveResult, SceneId, Tile,
};
use parcel_resolver::EmptyTileSynthesizer;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

type Table<K, T> = Mutex<HashMap<K, PendingRequest<T>>>;

fn lock<K, T>(table: &Table<K, T>) -> MutexGuard<'_, HashMap<K, PendingRequest<T>>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Settles the placeholder of `key` with `error` and forgets it, so the next
/// ask sends a fresh request.
fn fail_entry<K: Hash + Eq, T: Clone>(table: &Table<K, T>, key: &K, error: ResolveError) -> bool {
    let mut map = lock(table);
    if map.get(key).is_some_and(|slot| slot.reject(error)) {
        map.remove(key);
        return true;
    }
    false
}

/// The foreground's own view of every key it has asked for.
#[derive(Default)]
struct PendingTables {
    tiles: Table<Tile, Option<SceneId>>,
    scenes: Table<SceneId, Arc<LandData>>,
    closed: AtomicBool,
}

impl PendingTables {
    fn on_message(&self, message: BridgeMessage) {
        match message {
            BridgeMessage::IdResponse(response) => {
                let settled = lock(&self.tiles)
                    .get(&response.position)
                    .is_some_and(|slot| slot.resolve(response.data));
                if !settled {
                    log::debug!("Ignoring stale answer for tile {}", response.position);
                }
            }
            BridgeMessage::DataResponse(response) => {
                let scene_id = response.data.scene_id.clone();
                let settled = lock(&self.scenes)
                    .get(&scene_id)
                    .is_some_and(|slot| slot.resolve(Arc::new(response.data)));
                if !settled {
                    log::debug!("Ignoring stale answer for scene {}", scene_id);
                }
            }
            BridgeMessage::Failure(notice) => {
                log::warn!("Worker failed {}: {}", notice.key, notice.error);
                match notice.key {
                    RequestKey::Tile(tile) => {
                        fail_entry(&self.tiles, &tile, notice.error);
                    }
                    RequestKey::Scene(scene_id) => {
                        fail_entry(&self.scenes, &scene_id, notice.error);
                    }
                }
            }
            other => log::warn!("Foreground ignoring unexpected {}", other.name()),
        }
    }

    /// Fails everything still pending. Resolved entries stay readable.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut tiles = lock(&self.tiles);
        tiles.retain(|_, slot| !slot.reject(ResolveError::Disconnected));
        drop(tiles);
        let mut scenes = lock(&self.scenes);
        scenes.retain(|_, slot| !slot.reject(ResolveError::Disconnected));
    }
}

async fn dispatch(inbox: Inbox, tables: Arc<PendingTables>) {
    while let Some(message) = inbox.next().await {
        tables.on_message(message);
    }
    log::warn!("Resolution worker disconnected, failing outstanding requests.");
    tables.close();
}

/// Asks the background resolver for tiles and land data.
///
/// Repeated asks for a key share one outstanding request and one answer, and
/// answers are kept for the session. Every ask is bounded by
/// [`BridgeConfig::request_timeout_ms`]: a caller whose deadline passes gets
/// [`ResolveError::Timeout`] along with everyone else waiting on that key, and
/// the key is forgotten so the next ask sends the request again.
///
/// Must be created inside a tokio runtime.
pub struct ResolutionBridge {
    outbox: Outbox,
    config: BridgeConfig,
    lifecycle: Mutex<Option<LifecycleConfig>>,
    tables: Arc<PendingTables>,
    dispatcher: JoinHandle<()>,
}

impl ResolutionBridge {
    /// Creates a bridge over the foreground end of a [`duplex`](crate::duplex) channel.
    pub fn new(endpoint: Endpoint, config: BridgeConfig) -> Self {
        let (outbox, inbox) = endpoint.split();
        let tables = Arc::new(PendingTables::default());
        let dispatcher = tokio::spawn(dispatch(inbox, Arc::clone(&tables)));

        Self {
            outbox,
            config,
            lifecycle: Mutex::new(None),
            tables,
            dispatcher,
        }
    }

    /// Sends `Lifecycle.initialize`. The worker ignores requests until it arrives.
    pub fn initialize(&self, lifecycle: LifecycleConfig) -> ResolveResult<()> {
        self.outbox
            .notify(&BridgeMessage::Initialize(lifecycle.clone()))?;
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = Some(lifecycle);
        Ok(())
    }

    fn empty_scenes_enabled(&self) -> bool {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|lifecycle| lifecycle.empty_scenes)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    /// Resolves every tile to its scene id, or `None` for empty tiles.
    ///
    /// Only tiles never asked for before cross the boundary, all in one
    /// `Scene.idRequest`. Nothing is sent if every tile is already known.
    pub async fn resolve_tiles(
        &self,
        tiles: &[Tile],
    ) -> ResolveResult<Vec<(Tile, Option<SceneId>)>> {
        let (slots, missing) = {
            let mut map = lock(&self.tables.tiles);
            let mut slots = Vec::with_capacity(tiles.len());
            let mut missing = Vec::new();
            for tile in tiles {
                let slot = match map.get(tile) {
                    Some(slot) => slot.clone(),
                    None => {
                        if self.tables.closed.load(Ordering::SeqCst) {
                            return Err(ResolveError::Disconnected);
                        }
                        let slot = PendingRequest::new();
                        map.insert(tile.clone(), slot.clone());
                        missing.push(tile.clone());
                        slot
                    }
                };
                slots.push((tile.clone(), slot));
            }
            (slots, missing)
        };

        if !missing.is_empty() {
            log::debug!("Requesting {} tiles from the worker", missing.len());
            let request = BridgeMessage::IdRequest(IdRequest {
                scene_ids: missing.clone(),
            });
            if let Err(error) = self.outbox.notify(&request) {
                for tile in &missing {
                    fail_entry(&self.tables.tiles, tile, error.clone());
                }
            }
        }

        let mut resolved = Vec::with_capacity(slots.len());
        for (tile, slot) in slots {
            let scene_id = self.wait(&self.tables.tiles, &tile, slot).await?;
            resolved.push((tile, scene_id));
        }
        Ok(resolved)
    }

    /// Resolves a single tile.
    pub async fn resolve_tile(&self, tile: &Tile) -> ResolveResult<Option<SceneId>> {
        let mut resolved = self.resolve_tiles(std::slice::from_ref(tile)).await?;
        Ok(resolved.pop().and_then(|(_, scene_id)| scene_id))
    }

    /// Returns the land data of `scene_id`, sending at most one `Scene.dataRequest` for it.
    pub async fn resolve_land_data(&self, scene_id: &SceneId) -> ResolveResult<Arc<LandData>> {
        let (slot, is_new) = {
            let mut map = lock(&self.tables.scenes);
            match map.get(scene_id) {
                Some(slot) => (slot.clone(), false),
                None => {
                    if self.tables.closed.load(Ordering::SeqCst) {
                        return Err(ResolveError::Disconnected);
                    }
                    let slot = PendingRequest::new();
                    map.insert(scene_id.clone(), slot.clone());
                    (slot, true)
                }
            }
        };

        if is_new {
            let request = BridgeMessage::DataRequest(DataRequest {
                scene_id: scene_id.clone(),
            });
            if let Err(error) = self.outbox.notify(&request) {
                fail_entry(&self.tables.scenes, scene_id, error);
            }
        }

        self.wait(&self.tables.scenes, scene_id, slot).await
    }

    /// Returns the land data of the scene on `tile`.
    ///
    /// Empty tiles get synthesized placeholder land data when empty scenes were
    /// enabled at initialization, and `None` otherwise.
    pub async fn land_data_for_tile(&self, tile: &Tile) -> ResolveResult<Option<Arc<LandData>>> {
        let scene_id = match self.resolve_tile(tile).await? {
            Some(scene_id) => scene_id,
            None if self.empty_scenes_enabled() => EmptyTileSynthesizer::empty_scene_id(tile),
            None => return Ok(None),
        };
        self.resolve_land_data(&scene_id).await.map(Some)
    }

    async fn wait<K, T>(&self, table: &Table<K, T>, key: &K, slot: PendingRequest<T>) -> ResolveResult<T>
    where
        K: Hash + Eq + Display,
        T: Clone,
    {
        let timeout = self.timeout();
        match tokio::time::timeout(timeout, slot.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let error = ResolveError::Timeout {
                    key: key.to_string(),
                    after_ms: self.config.request_timeout_ms,
                };
                if slot.reject(error.clone()) {
                    log::warn!("No answer for {} within {:?}", key, timeout);
                    let mut map = lock(table);
                    if map.get(key).is_some_and(|cached| cached.same_slot(&slot)) {
                        map.remove(key);
                    }
                }
                slot.peek().unwrap_or(Err(error))
            }
        }
    }

    /// Number of tiles asked for, answered or not.
    pub fn known_tile_count(&self) -> usize {
        lock(&self.tables.tiles).len()
    }

    /// Number of scenes asked for, answered or not.
    pub fn known_scene_count(&self) -> usize {
        lock(&self.tables.scenes).len()
    }
}

impl Drop for ResolutionBridge {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

impl std::fmt::Debug for ResolutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionBridge")
            .field("config", &self.config)
            .field("tiles", &self.known_tile_count())
            .field("scenes", &self.known_scene_count())
            .finish()
    }
}
