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

//! Defines the error type shared by the resolver, the bridge, and their callers.

use crate::tile::SceneId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error delivered to everyone awaiting a tile or scene resolution.
///
/// The type is `Clone` because a single failure is fanned out to every caller
/// sharing the same [`PendingRequest`](crate::PendingRequest), and it is
/// serializable so the background worker can forward it across the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum ResolveError {
    /// Land data was requested for a scene id that never came out of tile
    /// resolution and is not a synthetic empty-tile id.
    #[error("scene id not found: {scene_id}")]
    NotFound {
        /// The unknown scene id.
        scene_id: SceneId,
    },
    /// The content service or the empty-tile catalog could not be fetched.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),
    /// A bridge request received no answer before its deadline.
    #[error("request for '{key}' timed out after {after_ms} ms")]
    Timeout {
        /// The tile or scene id the request was keyed by.
        key: String,
        /// The deadline that elapsed.
        after_ms: u64,
    },
    /// The channel to the other context is closed.
    #[error("resolution channel disconnected")]
    Disconnected,
    /// A message could not be encoded or decoded, or arrived out of protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A convenience alias for results produced by the resolution pipeline.
pub type ResolveResult<T> = Result<T, ResolveError>;
