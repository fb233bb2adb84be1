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

use anyhow::{Context, Result};
use async_trait::async_trait;
use parcel_core::{CatalogSource, EmptyTileCatalog};

/// Reads the empty tile catalog from `GET {base}/index.json`.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    http: reqwest::Client,
}

impl HttpCatalogSource {
    /// Creates a source with its own HTTP client.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(crate::default_client()?))
    }

    /// Creates a source reusing an existing HTTP client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// The catalog document under `base_url`.
    pub fn index_url(base_url: &str) -> String {
        format!("{}/index.json", base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch_catalog(&self, base_url: &str) -> Result<EmptyTileCatalog> {
        let url = Self::index_url(base_url);
        let catalog: EmptyTileCatalog = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("Catalog request to {url} failed"))?
            .json()
            .await
            .with_context(|| format!("Malformed catalog at {url}"))?;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_url_sits_under_the_base() {
        assert_eq!(
            HttpCatalogSource::index_url("https://play.example.org/loader/empty-scenes/"),
            "https://play.example.org/loader/empty-scenes/index.json"
        );
        assert_eq!(
            HttpCatalogSource::index_url("http://localhost/loader/empty-scenes"),
            "http://localhost/loader/empty-scenes/index.json"
        );
    }
}
