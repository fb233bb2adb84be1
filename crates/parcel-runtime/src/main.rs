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

//! Resolves tiles through a background resolution worker and prints the results.
//!
//! Run with: `cargo run -p parcel-runtime -- 0,0 10,-4 --land-data`

mod config;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::RuntimeConfig;
use parcel_bridge::ResolutionSession;
use parcel_core::{EmptySceneVariant, ResolverConfig, Tile};
use parcel_infra::{default_client, CatalystContentClient, HttpCatalogSource};
use parcel_resolver::TileResolver;
use parcel_telemetry::{init_logging, MetricsRegistry};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Resolve world tiles to scenes", long_about = None)]
struct Args {
    /// Tiles to resolve, as `x,y`
    #[arg(required = true, allow_hyphen_values = true)]
    tiles: Vec<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Content server base URL
    #[arg(long)]
    content_server: Option<String>,

    /// Server answering entity queries (defaults to the content server)
    #[arg(long)]
    meta_content_server: Option<String>,

    /// Origin serving the empty scene catalog
    #[arg(long)]
    loader_origin: Option<String>,

    /// Report empty tiles as empty instead of synthesizing placeholder scenes
    #[arg(long)]
    no_empty_scenes: bool,

    /// Use the seasonal empty scene set
    #[arg(long)]
    halloween: bool,

    /// Per-request deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Also print the land data of every resolved tile
    #[arg(long)]
    land_data: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig::load_or_default(self.config.as_deref())?;
        let lifecycle = &mut config.lifecycle;

        if let Some(server) = &self.content_server {
            lifecycle.content_server = server.clone();
            if self.meta_content_server.is_none() {
                lifecycle.meta_content_server = server.clone();
            }
        }
        if let Some(server) = &self.meta_content_server {
            lifecycle.meta_content_server = server.clone();
        }
        if let Some(origin) = &self.loader_origin {
            lifecycle.loader_origin = origin.clone();
        }
        if self.no_empty_scenes {
            lifecycle.empty_scenes = false;
        }
        if self.halloween {
            lifecycle.empty_scene_variant = EmptySceneVariant::Halloween;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.bridge.request_timeout_ms = timeout_ms;
        }
        Ok(config)
    }

    fn parsed_tiles(&self) -> Result<Vec<Tile>> {
        self.tiles
            .iter()
            .map(|raw| {
                let tile = Tile::new(raw.trim());
                if tile.parse_coords().is_none() {
                    bail!("'{raw}' is not a tile, expected `x,y`");
                }
                Ok(tile)
            })
            .collect()
    }
}

fn build_resolver(
    lifecycle: &parcel_core::LifecycleConfig,
    resolver: &ResolverConfig,
    metrics: &MetricsRegistry,
) -> Result<TileResolver> {
    let http = default_client()?;
    let content = CatalystContentClient::with_client(&lifecycle.meta_content_server, http.clone());
    let catalog = HttpCatalogSource::with_client(http);

    Ok(
        TileResolver::new(lifecycle.clone(), Arc::new(content), Arc::new(catalog))
            .with_resolver_config(resolver.clone())
            .with_metrics(metrics),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = args.runtime_config()?;
    let tiles = args.parsed_tiles()?;
    let metrics = MetricsRegistry::new();

    let session = {
        let resolver_config = config.resolver.clone();
        let metrics = metrics.clone();
        ResolutionSession::start(
            config.lifecycle.clone(),
            config.bridge.clone(),
            move |lifecycle: &parcel_core::LifecycleConfig| {
                build_resolver(lifecycle, &resolver_config, &metrics)
            },
        )?
    };
    let bridge = session.bridge();

    let resolved = bridge
        .resolve_tiles(&tiles)
        .await
        .context("Tile resolution failed")?;

    for (tile, scene_id) in resolved {
        if !args.land_data {
            println!("{}", json!({ "tile": tile, "sceneId": scene_id }));
            continue;
        }
        match bridge.land_data_for_tile(&tile).await {
            Ok(land) => println!(
                "{}",
                json!({ "tile": tile, "sceneId": scene_id, "landData": land.as_deref() })
            ),
            Err(e) => log::error!("No land data for {}: {}", tile, e),
        }
    }

    session.shutdown().await?;
    metrics.log_snapshot();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_defaults() {
        let args = Args::try_parse_from([
            "parcel-runtime",
            "--content-server",
            "http://localhost:6969/content",
            "--no-empty-scenes",
            "--timeout-ms",
            "250",
            "10,-4",
            "-1,0",
        ])
        .unwrap();

        let config = args.runtime_config().unwrap();
        assert_eq!(config.lifecycle.content_server, "http://localhost:6969/content");
        assert_eq!(config.lifecycle.meta_content_server, "http://localhost:6969/content");
        assert!(!config.lifecycle.empty_scenes);
        assert_eq!(config.bridge.request_timeout_ms, 250);
        assert_eq!(
            args.parsed_tiles().unwrap(),
            vec![Tile::new("10,-4"), Tile::new("-1,0")]
        );
    }

    #[test]
    fn malformed_tiles_are_rejected() {
        let args = Args::try_parse_from(["parcel-runtime", "north"]).unwrap();
        assert!(args.parsed_tiles().is_err());
    }
}
