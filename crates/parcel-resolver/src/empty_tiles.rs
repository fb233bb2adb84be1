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

//! Placeholder content for tiles with no deployed scene.

use parcel_core::land::{SceneContact, SceneDisplay};
use parcel_core::{
    CatalogSource, EmptyTileCatalog, LandData, LifecycleConfig, MappingsResponse, ResolveError,
    ResolveResult, SceneId, SceneJson, SceneParcels, Tile,
};
use rand::seq::IteratorRandom;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Every synthetic scene id ends with this run of zeros.
const EMPTY_ID_SUFFIX: &str = "00000000000000000000";
/// Length of a content-addressed id, which synthetic ids are padded to.
const SCENE_ID_LEN: usize = 46;
const EMPTY_ID_PREFIX: &str = "Qm";

/// Loads the catalog of placeholder scenes and builds land data for empty tiles.
pub struct EmptyTileSynthesizer {
    base_url: String,
    base_url_bundles: String,
    source: Arc<dyn CatalogSource>,
    catalog: OnceCell<Arc<EmptyTileCatalog>>,
}

impl EmptyTileSynthesizer {
    /// Creates a synthesizer reading the catalog for the configured variant.
    pub fn new(config: &LifecycleConfig, source: Arc<dyn CatalogSource>) -> Self {
        Self {
            base_url: config.empty_scenes_base_url(),
            base_url_bundles: config.content_server_bundles.clone(),
            source,
            catalog: OnceCell::new(),
        }
    }

    /// The directory the catalog and its contents are served from.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns `true` once the catalog has been loaded successfully.
    pub fn is_catalog_loaded(&self) -> bool {
        self.catalog.initialized()
    }

    /// Loads the catalog, fetching it on the first call only.
    ///
    /// Callers arriving while the first load is in flight wait for it instead
    /// of issuing their own. A failed load is not remembered, so the next call
    /// fetches again.
    pub async fn load_catalog(&self) -> ResolveResult<Arc<EmptyTileCatalog>> {
        let catalog = self
            .catalog
            .get_or_try_init(|| async {
                log::debug!("Loading empty tile catalog from {}", self.base_url);
                let catalog = self
                    .source
                    .fetch_catalog(&self.base_url)
                    .await
                    .map_err(|e| ResolveError::UpstreamFetch(format!("{e:#}")))?;
                log::info!("Empty tile catalog loaded with {} scenes", catalog.len());
                Ok::<_, ResolveError>(Arc::new(catalog))
            })
            .await?;
        Ok(Arc::clone(catalog))
    }

    /// Returns `true` if `scene_id` marks a tile with no deployed scene.
    pub fn is_empty_tile_id(scene_id: &str) -> bool {
        scene_id.ends_with(EMPTY_ID_SUFFIX)
    }

    /// Builds the synthetic scene id for an empty tile.
    pub fn empty_scene_id(tile: &Tile) -> SceneId {
        let mut id = format!("{EMPTY_ID_PREFIX}{tile}m");
        let padding = SCENE_ID_LEN
            .saturating_sub(id.len())
            .max(EMPTY_ID_SUFFIX.len());
        id.extend(std::iter::repeat('0').take(padding));
        SceneId::new(id)
    }

    /// Recovers the tile encoded in a synthetic scene id.
    pub fn tile_from_empty_id(scene_id: &str) -> Option<Tile> {
        if !Self::is_empty_tile_id(scene_id) {
            return None;
        }
        let tile = scene_id
            .strip_prefix(EMPTY_ID_PREFIX)?
            .trim_end_matches('0')
            .strip_suffix('m')?;
        (!tile.is_empty()).then(|| Tile::new(tile))
    }

    /// Builds placeholder land data for `tile`, picking one catalog scene at random.
    pub async fn synthesize(&self, scene_id: &SceneId, tile: &Tile) -> ResolveResult<LandData> {
        let catalog = self.load_catalog().await?;

        let contents = {
            let mut rng = rand::thread_rng();
            catalog.iter().choose(&mut rng).map(|(name, contents)| {
                log::trace!("Tile {} gets placeholder scene '{}'", tile, name);
                contents.to_vec()
            })
        }
        .ok_or_else(|| {
            ResolveError::UpstreamFetch(format!(
                "empty tile catalog at {} has no scenes",
                self.base_url
            ))
        })?;

        let mut extra = serde_json::Map::new();
        extra.insert("policy".to_string(), json!({}));
        extra.insert("communications".to_string(), json!({ "commServerUrl": "" }));

        Ok(LandData {
            scene_id: scene_id.clone(),
            base_url: format!("{}contents/", self.base_url),
            base_url_bundles: self.base_url_bundles.clone(),
            scene_json_data: SceneJson {
                display: Some(SceneDisplay {
                    title: "Empty parcel".to_string(),
                }),
                contact: Some(SceneContact {
                    name: "Decentraland".to_string(),
                }),
                owner: String::new(),
                main: "bin/game.js".to_string(),
                tags: Vec::new(),
                scene: SceneParcels {
                    parcels: vec![tile.clone()],
                    base: tile.clone(),
                },
                extra,
            },
            mappings_response: MappingsResponse {
                parcel_id: Some(tile.clone()),
                root_cid: scene_id.clone(),
                contents,
            },
        })
    }
}

impl std::fmt::Debug for EmptyTileSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmptyTileSynthesizer")
            .field("base_url", &self.base_url)
            .field("catalog_loaded", &self.is_catalog_loaded())
            .finish()
    }
}
