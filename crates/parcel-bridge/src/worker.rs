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

//! The background side of the bridge.

use crate::channel::{Endpoint, Outbox};
use anyhow::{anyhow, Context, Result};
use parcel_core::protocol::{DataResponse, FailureNotice, IdResponse};
use parcel_core::{BridgeMessage, LifecycleConfig, RequestKey, ResolveError, SceneId, Tile};
use parcel_resolver::TileResolver;
use std::sync::Arc;
use std::thread;

/// Owns the [`TileResolver`] on a dedicated thread with its own runtime.
///
/// The worker stays idle until `Lifecycle.initialize` arrives, then builds the
/// resolver through the factory it was given. Every request is served on its
/// own task, so answers go back as soon as they are ready, in any order.
/// The worker stops when the foreground drops its end of the channel.
#[derive(Debug)]
pub struct BridgeWorker {
    handle: Option<thread::JoinHandle<()>>,
}

impl BridgeWorker {
    /// Starts the worker thread.
    ///
    /// ## Arguments
    /// * `endpoint` - The background end of a [`duplex`](crate::duplex) channel.
    /// * `factory` - Builds the resolver from the initialization message. It
    ///   is called again if a later `Lifecycle.initialize` follows a failed one.
    pub fn spawn<F>(endpoint: Endpoint, factory: F) -> Result<Self>
    where
        F: Fn(&LifecycleConfig) -> Result<TileResolver> + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("parcel-resolver".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        log::error!("Resolution worker could not start its runtime: {e}");
                        return;
                    }
                };
                runtime.block_on(serve(endpoint, factory));
            })
            .context("Failed to spawn the resolution worker thread")?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Waits for the worker thread to exit.
    pub fn join(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("Resolution worker thread panicked")),
            None => Ok(()),
        }
    }
}

async fn serve<F>(endpoint: Endpoint, factory: F)
where
    F: Fn(&LifecycleConfig) -> Result<TileResolver>,
{
    let (outbox, inbox) = endpoint.split();
    let mut resolver: Option<Arc<TileResolver>> = None;

    log::info!("Resolution worker thread started.");

    while let Some(message) = inbox.next().await {
        match message {
            BridgeMessage::Initialize(config) => {
                if resolver.is_some() {
                    log::warn!("Resolution worker already initialized, ignoring.");
                    continue;
                }
                match factory(&config) {
                    Ok(built) => {
                        log::info!(
                            "Resolution worker initialized against {}",
                            config.content_server
                        );
                        resolver = Some(Arc::new(built));
                    }
                    Err(e) => log::error!("Failed to build the tile resolver: {e:#}"),
                }
            }
            BridgeMessage::IdRequest(request) => match &resolver {
                Some(resolver) => answer_tiles(resolver, &outbox, &request.scene_ids),
                None => {
                    for tile in request.scene_ids {
                        reply_uninitialized(&outbox, RequestKey::Tile(tile));
                    }
                }
            },
            BridgeMessage::DataRequest(request) => match &resolver {
                Some(resolver) => {
                    tokio::spawn(answer_scene(
                        Arc::clone(resolver),
                        outbox.clone(),
                        request.scene_id,
                    ));
                }
                None => reply_uninitialized(&outbox, RequestKey::Scene(request.scene_id)),
            },
            other => log::warn!("Resolution worker ignoring unexpected {}", other.name()),
        }
    }

    log::info!("Foreground disconnected, resolution worker stopping.");
}

/// Answers each tile as soon as its own placeholder settles.
fn answer_tiles(resolver: &TileResolver, outbox: &Outbox, tiles: &[Tile]) {
    for (tile, slot) in resolver.request_tiles(tiles) {
        let outbox = outbox.clone();
        tokio::spawn(async move {
            let message = match slot.wait().await {
                Ok(data) => BridgeMessage::IdResponse(IdResponse {
                    position: tile,
                    data,
                }),
                Err(error) => BridgeMessage::Failure(FailureNotice {
                    key: RequestKey::Tile(tile),
                    error,
                }),
            };
            send(&outbox, &message);
        });
    }
}

async fn answer_scene(resolver: Arc<TileResolver>, outbox: Outbox, scene_id: SceneId) {
    let message = match resolver.resolve_land_data(&scene_id).await {
        Ok(land) => BridgeMessage::DataResponse(DataResponse {
            data: land.as_ref().clone(),
        }),
        Err(error) => BridgeMessage::Failure(FailureNotice {
            key: RequestKey::Scene(scene_id),
            error,
        }),
    };
    send(&outbox, &message);
}

fn reply_uninitialized(outbox: &Outbox, key: RequestKey) {
    log::warn!("Request for {key} arrived before Lifecycle.initialize");
    send(
        outbox,
        &BridgeMessage::Failure(FailureNotice {
            key,
            error: ResolveError::Protocol("worker is not initialized".to_string()),
        }),
    );
}

fn send(outbox: &Outbox, message: &BridgeMessage) {
    if let Err(e) = outbox.notify(message) {
        log::debug!("Could not deliver {}: {e}", message.name());
    }
}
