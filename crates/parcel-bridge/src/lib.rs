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

//! # Parcel Bridge
//!
//! Runs the [`TileResolver`](parcel_resolver::TileResolver) in a background
//! context and lets the foreground talk to it with fire-and-forget messages.
//! Both sides deduplicate by key, so a burst of identical asks costs a single
//! round trip.

#![warn(missing_docs)]

mod bridge;
mod channel;
mod worker;

pub use bridge::ResolutionBridge;
pub use channel::{duplex, Endpoint, Inbox, Outbox};
pub use worker::BridgeWorker;

use anyhow::{anyhow, Context, Result};
use parcel_core::{BridgeConfig, LifecycleConfig};
use parcel_resolver::TileResolver;

/// A running worker together with the bridge that talks to it.
#[derive(Debug)]
pub struct ResolutionSession {
    bridge: ResolutionBridge,
    worker: BridgeWorker,
}

impl ResolutionSession {
    /// Spawns the worker, connects a bridge to it and sends `Lifecycle.initialize`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<F>(lifecycle: LifecycleConfig, config: BridgeConfig, factory: F) -> Result<Self>
    where
        F: Fn(&LifecycleConfig) -> Result<TileResolver> + Send + 'static,
    {
        let (foreground, background) = duplex();
        let worker = BridgeWorker::spawn(background, factory)?;
        let bridge = ResolutionBridge::new(foreground, config);
        bridge
            .initialize(lifecycle)
            .context("Failed to initialize the resolution worker")?;

        log::info!("Resolution session started.");
        Ok(Self { bridge, worker })
    }

    /// The foreground handle.
    pub fn bridge(&self) -> &ResolutionBridge {
        &self.bridge
    }

    /// Closes the channel and waits for the worker thread to finish.
    pub async fn shutdown(self) -> Result<()> {
        let Self { bridge, worker } = self;
        drop(bridge);
        tokio::task::spawn_blocking(move || worker.join())
            .await
            .map_err(|e| anyhow!("Worker join task failed: {e}"))??;
        log::info!("Resolution session stopped.");
        Ok(())
    }
}
