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

//! Scene lookups against a content server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parcel_core::{ContentFetcher, EntityKind, LifecycleConfig, SceneRecord, Tile};

/// Queries `GET {server}/entities/{kind}?pointer=..` for batches of tiles.
#[derive(Debug, Clone)]
pub struct CatalystContentClient {
    http: reqwest::Client,
    server: String,
}

impl CatalystContentClient {
    /// Creates a client for the meta content server of `config`.
    pub fn new(config: &LifecycleConfig) -> Result<Self> {
        Ok(Self::with_client(
            &config.meta_content_server,
            crate::default_client()?,
        ))
    }

    /// Creates a client for `server` reusing an existing HTTP client.
    pub fn with_client(server: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            server: server.into().trim_end_matches('/').to_string(),
        }
    }

    /// The endpoint listing entities of `kind`.
    pub fn entities_url(&self, kind: EntityKind) -> String {
        format!("{}/entities/{}", self.server, kind.as_str())
    }
}

#[async_trait]
impl ContentFetcher for CatalystContentClient {
    async fn fetch_scenes_by_pointers(
        &self,
        kind: EntityKind,
        pointers: &[Tile],
    ) -> Result<Vec<SceneRecord>> {
        if pointers.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.entities_url(kind);
        let query: Vec<(&str, &str)> = pointers.iter().map(|p| ("pointer", p.as_str())).collect();

        let records: Vec<SceneRecord> = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("Content server rejected {} pointers", pointers.len()))?
            .json()
            .await
            .with_context(|| format!("Malformed entity list from {url}"))?;

        log::debug!(
            "{} returned {} entities for {} pointers",
            url,
            records.len(),
            pointers.len()
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_url_ignores_trailing_slash() {
        let client = CatalystContentClient::with_client(
            "https://peer.example.org/content/",
            reqwest::Client::new(),
        );
        assert_eq!(
            client.entities_url(EntityKind::Scene),
            "https://peer.example.org/content/entities/scene"
        );
    }

    #[tokio::test]
    async fn empty_batch_skips_the_network() {
        // Nothing listens here; a request would fail.
        let client =
            CatalystContentClient::with_client("http://127.0.0.1:9", reqwest::Client::new());
        let records = client
            .fetch_scenes_by_pointers(EntityKind::Scene, &[])
            .await
            .unwrap();
        assert!(records.is_empty());
    }
}
