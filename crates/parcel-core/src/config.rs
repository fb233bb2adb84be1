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

//! Configuration for the resolution pipeline.

use serde::{Deserialize, Serialize};

/// Which set of placeholder scenes is used for empty tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmptySceneVariant {
    /// The regular placeholder set.
    #[default]
    Standard,
    /// The seasonal set.
    Halloween,
}

impl EmptySceneVariant {
    fn directory(&self) -> &'static str {
        match self {
            EmptySceneVariant::Standard => "empty-scenes",
            EmptySceneVariant::Halloween => "empty-scenes-halloween",
        }
    }
}

/// The payload of `Lifecycle.initialize`: everything the background worker
/// needs to build its resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleConfig {
    /// Content server serving scene files.
    pub content_server: String,
    /// Content server answering pointer queries.
    pub meta_content_server: String,
    /// Auxiliary lambdas service.
    pub meta_content_service: String,
    /// Base URL of pre-built asset bundles, empty to disable them.
    pub content_server_bundles: String,
    /// How many tiles around the player are kept loaded.
    pub line_of_sight_radius: u32,
    /// Radius inside which scenes are considered safe to run.
    pub secure_radius: u32,
    /// Whether empty tiles are filled with placeholder scenes.
    pub empty_scenes: bool,
    /// Origin the placeholder scenes are served from.
    pub loader_origin: String,
    /// Which placeholder set to use.
    pub empty_scene_variant: EmptySceneVariant,
}

impl LifecycleConfig {
    /// The directory holding the placeholder catalog, with a trailing slash.
    pub fn empty_scenes_base_url(&self) -> String {
        format!(
            "{}/loader/{}/",
            self.loader_origin.trim_end_matches('/'),
            self.empty_scene_variant.directory()
        )
    }

    /// The base URL scene content hashes are appended to.
    pub fn contents_base_url(&self) -> String {
        format!("{}/contents/", self.content_server.trim_end_matches('/'))
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            content_server: "https://peer.decentraland.org/content".to_string(),
            meta_content_server: "https://peer.decentraland.org/content".to_string(),
            meta_content_service: "https://peer.decentraland.org/lambdas".to_string(),
            content_server_bundles: String::new(),
            line_of_sight_radius: 4,
            secure_radius: 4,
            empty_scenes: true,
            loader_origin: "https://play.decentraland.org".to_string(),
            empty_scene_variant: EmptySceneVariant::Standard,
        }
    }
}

/// Tuning for the background resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// How many times a failed batch fetch is retried before its tiles are rejected.
    pub fetch_retries: u32,
    /// Delay before the first retry; each further retry waits one more step.
    pub retry_backoff_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

/// Tuning for the foreground side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a caller waits for a response before its request is rejected.
    pub request_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scene_urls_follow_the_variant() {
        let mut config = LifecycleConfig {
            loader_origin: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.empty_scenes_base_url(),
            "http://localhost:8080/loader/empty-scenes/"
        );

        config.empty_scene_variant = EmptySceneVariant::Halloween;
        assert_eq!(
            config.empty_scenes_base_url(),
            "http://localhost:8080/loader/empty-scenes-halloween/"
        );
    }

    #[test]
    fn lifecycle_config_fills_missing_fields() {
        let config: LifecycleConfig =
            serde_json::from_str(r#"{ "contentServer": "http://local/content", "emptyScenes": false }"#)
                .unwrap();
        assert_eq!(config.contents_base_url(), "http://local/content/contents/");
        assert!(!config.empty_scenes);
        assert_eq!(config.line_of_sight_radius, 4);
    }
}
