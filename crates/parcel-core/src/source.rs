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

//! Contracts for the external services the resolver reads from.
//!
//! The resolver never talks HTTP itself. It consumes these traits, and a
//! concrete implementation (typically in `parcel-infra`) is injected when the
//! background worker is initialized. Tests substitute in-memory fakes.

use crate::land::{ContentMapping, SceneJson};
use crate::tile::{SceneId, Tile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of entity requested from the content service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A deployed scene.
    Scene,
    /// A user profile.
    Profile,
    /// A wearable item.
    Wearable,
}

impl EntityKind {
    /// The path segment used by the content service for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Scene => "scene",
            EntityKind::Profile => "profile",
            EntityKind::Wearable => "wearable",
        }
    }
}

/// One entity returned by a pointer query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    /// The scene id.
    pub id: SceneId,
    /// Every tile the scene claims, possibly more than were asked for.
    pub pointers: Vec<Tile>,
    /// The scene's content table.
    #[serde(default)]
    pub content: Vec<ContentMapping>,
    /// The scene's metadata document.
    #[serde(default)]
    pub metadata: Option<SceneJson>,
}

/// A batched pointer lookup against the content service.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Returns every entity of `kind` claiming at least one of `pointers`.
    ///
    /// A pointer with no entity is simply absent from the result; it is not
    /// an error.
    async fn fetch_scenes_by_pointers(
        &self,
        kind: EntityKind,
        pointers: &[Tile],
    ) -> anyhow::Result<Vec<SceneRecord>>;
}

/// The placeholder scenes available for empty tiles, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmptyTileCatalog(BTreeMap<String, Vec<ContentMapping>>);

impl EmptyTileCatalog {
    /// Creates a catalog from its entries.
    pub fn new(entries: BTreeMap<String, Vec<ContentMapping>>) -> Self {
        Self(entries)
    }

    /// Returns the content table of the placeholder called `name`.
    pub fn get(&self, name: &str) -> Option<&[ContentMapping]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Iterates over every placeholder, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ContentMapping])> {
        self.0.iter().map(|(name, contents)| (name.as_str(), contents.as_slice()))
    }

    /// Number of placeholders.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the catalog has no placeholders.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The source of the empty-tile catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches `<base_url>index.json`.
    async fn fetch_catalog(&self, base_url: &str) -> anyhow::Result<EmptyTileCatalog>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_reads_the_index_document() {
        let catalog: EmptyTileCatalog = serde_json::from_str(
            r#"{
                "Tree": [{ "file": "scene.json", "hash": "QmTree" }],
                "Rock": [{ "file": "scene.json", "hash": "QmRock" }]
            }"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        let names: Vec<_> = catalog.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Rock", "Tree"]);
        assert_eq!(catalog.get("Tree").unwrap()[0].hash, "QmTree");
    }

    #[test]
    fn record_tolerates_missing_content_and_metadata() {
        let record: SceneRecord =
            serde_json::from_str(r#"{ "id": "QmX", "pointers": ["1,1"] }"#).unwrap();
        assert!(record.content.is_empty());
        assert!(record.metadata.is_none());
    }
}
