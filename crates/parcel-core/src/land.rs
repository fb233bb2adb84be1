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

//! The resolved scene descriptor and the content tables it carries.
//!
//! A [`LandData`] is everything a loader needs to start pulling a scene's
//! files: where the content lives, which hash backs each file path, and the
//! scene's own metadata (parcels, owner, entry point). Once the resolver has
//! inserted one into its cache it is shared read-only behind an `Arc`.

use crate::source::SceneRecord;
use crate::tile::{SceneId, Tile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps one file path of a scene to the content hash that stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMapping {
    /// The file path as referenced by the scene (e.g. `bin/game.js`).
    pub file: String,
    /// The content-addressed hash of the file.
    pub hash: String,
}

impl ContentMapping {
    /// Creates a new mapping.
    pub fn new(file: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            hash: hash.into(),
        }
    }
}

/// The display block of a scene's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDisplay {
    /// Human readable title.
    #[serde(default)]
    pub title: String,
}

/// The contact block of a scene's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneContact {
    /// Name of the scene's author.
    #[serde(default)]
    pub name: String,
}

/// The parcels a scene occupies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneParcels {
    /// Every tile claimed by the scene.
    #[serde(default)]
    pub parcels: Vec<Tile>,
    /// The tile the scene's origin sits on.
    #[serde(default)]
    pub base: Tile,
}

/// The scene's own metadata document.
///
/// Only the fields the client reads are typed; anything else the content
/// server returns is preserved in `extra` so nothing is lost when the
/// descriptor is forwarded across the bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneJson {
    /// Display information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<SceneDisplay>,
    /// Author contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<SceneContact>,
    /// Owner address, empty when unknown.
    #[serde(default)]
    pub owner: String,
    /// The scene's main entry point.
    #[serde(default)]
    pub main: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// The parcel layout.
    #[serde(default)]
    pub scene: SceneParcels,
    /// Untyped fields carried through verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SceneJson {
    /// Returns the base tile, falling back to the first claimed parcel.
    pub fn base_tile(&self) -> Option<&Tile> {
        if self.scene.base.as_str().is_empty() {
            self.scene.parcels.first()
        } else {
            Some(&self.scene.base)
        }
    }
}

/// The content table of a scene, keyed by its root content id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingsResponse {
    /// The scene's base tile, if known.
    pub parcel_id: Option<Tile>,
    /// The scene id the table belongs to.
    pub root_cid: SceneId,
    /// Every file of the scene.
    pub contents: Vec<ContentMapping>,
}

/// The resolved descriptor for a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandData {
    /// The scene this descriptor belongs to.
    pub scene_id: SceneId,
    /// Base URL that content hashes are appended to.
    pub base_url: String,
    /// Base URL of the pre-built asset bundles, empty when disabled.
    pub base_url_bundles: String,
    /// The scene's metadata document.
    pub scene_json_data: SceneJson,
    /// The scene's content table.
    pub mappings_response: MappingsResponse,
}

impl LandData {
    /// Builds a descriptor from a record returned by the content service.
    pub fn from_record(
        record: SceneRecord,
        base_url: impl Into<String>,
        base_url_bundles: impl Into<String>,
    ) -> Self {
        let scene_json_data = record.metadata.unwrap_or_default();
        let parcel_id = scene_json_data.base_tile().cloned();

        Self {
            scene_id: record.id.clone(),
            base_url: base_url.into(),
            base_url_bundles: base_url_bundles.into(),
            scene_json_data,
            mappings_response: MappingsResponse {
                parcel_id,
                root_cid: record.id,
                contents: record.content,
            },
        }
    }

    /// Builds a [`ContentProvider`] over this scene's content table.
    pub fn content_provider(&self) -> ContentProvider {
        ContentProvider::new(&self.base_url, self.mappings_response.contents.clone())
    }
}

/// Resolves scene file paths to downloadable content URLs.
///
/// Lookups are case-insensitive on the file path, matching how scenes
/// reference their files.
#[derive(Debug, Clone)]
pub struct ContentProvider {
    base_url: String,
    contents: Vec<ContentMapping>,
    file_to_hash: HashMap<String, String>,
}

impl ContentProvider {
    /// Creates a provider and bakes the lower-cased file index.
    pub fn new(base_url: impl Into<String>, contents: Vec<ContentMapping>) -> Self {
        let file_to_hash = contents
            .iter()
            .map(|m| (m.file.to_lowercase(), m.hash.clone()))
            .collect();

        Self {
            base_url: base_url.into(),
            contents,
            file_to_hash,
        }
    }

    /// Returns `true` if `file` is part of the scene.
    pub fn has_contents_url(&self, file: &str) -> bool {
        !file.is_empty() && self.file_to_hash.contains_key(&file.to_lowercase())
    }

    /// Returns the full content URL for `file`, or `None` if the scene does not ship it.
    pub fn contents_url(&self, file: &str) -> Option<String> {
        match self.file_to_hash.get(&file.to_lowercase()) {
            Some(hash) => Some(format!("{}{}", self.base_url, hash)),
            None => {
                log::debug!("Content file '{}' not found in scene mappings", file);
                None
            }
        }
    }

    /// Returns the mapping whose content hash is `hash`.
    pub fn mapping_for_hash(&self, hash: &str) -> Option<&ContentMapping> {
        self.contents.iter().find(|m| m.hash == hash)
    }
}

/// One row of a precomputed tile → scene table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMappingEntry {
    /// The tile.
    pub parcel_id: Tile,
    /// The scene deployed on it.
    pub root_cid: SceneId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SceneRecord {
        let metadata: SceneJson = serde_json::from_value(serde_json::json!({
            "display": { "title": "Plaza" },
            "owner": "0xabc",
            "main": "bin/game.js",
            "scene": { "parcels": ["0,0", "1,0"], "base": "0,0" },
            "policy": { "fly": true }
        }))
        .unwrap();

        SceneRecord {
            id: SceneId::new("QmPlaza"),
            pointers: vec![Tile::new("0,0"), Tile::new("1,0")],
            content: vec![ContentMapping::new("bin/Game.js", "QmGame")],
            metadata: Some(metadata),
        }
    }

    #[test]
    fn land_data_is_built_from_a_record() {
        let land = LandData::from_record(record(), "https://peer/contents/", "");

        assert_eq!(land.scene_id, SceneId::new("QmPlaza"));
        assert_eq!(land.mappings_response.root_cid, land.scene_id);
        assert_eq!(land.mappings_response.parcel_id, Some(Tile::new("0,0")));
        assert_eq!(land.scene_json_data.main, "bin/game.js");
        assert!(land.scene_json_data.extra.contains_key("policy"));
    }

    #[test]
    fn content_provider_resolves_case_insensitively() {
        let land = LandData::from_record(record(), "https://peer/contents/", "");
        let provider = land.content_provider();

        assert!(provider.has_contents_url("BIN/game.JS"));
        assert_eq!(
            provider.contents_url("bin/game.js").as_deref(),
            Some("https://peer/contents/QmGame")
        );
        assert!(provider.contents_url("missing.png").is_none());
        assert!(!provider.has_contents_url(""));
        assert_eq!(
            provider.mapping_for_hash("QmGame").map(|m| m.file.as_str()),
            Some("bin/Game.js")
        );
    }

    #[test]
    fn land_data_uses_camel_case_on_the_wire() {
        let land = LandData::from_record(record(), "https://peer/contents/", "");
        let value = serde_json::to_value(&land).unwrap();

        assert_eq!(value["sceneId"], "QmPlaza");
        assert_eq!(value["mappingsResponse"]["root_cid"], "QmPlaza");
        assert_eq!(value["sceneJsonData"]["policy"]["fly"], true);
    }
}
