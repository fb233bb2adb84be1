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

//! # Parcel Core
//!
//! Foundational crate containing the types, traits, and interface contracts
//! shared by every stage of the scene resolution pipeline.
//!
//! It has no knowledge of how scenes are fetched or where the resolver runs.
//! Concrete HTTP collaborators live in `parcel-infra`, the caching logic in
//! `parcel-resolver`, and the cross-context channel in `parcel-bridge`.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod land;
pub mod pending;
pub mod protocol;
pub mod source;
pub mod telemetry;
pub mod tile;

pub use config::{BridgeConfig, EmptySceneVariant, LifecycleConfig, ResolverConfig};
pub use error::{ResolveError, ResolveResult};
pub use land::{
    ContentMapping, ContentProvider, LandData, MappingsResponse, SceneJson, SceneMappingEntry,
    SceneParcels,
};
pub use pending::PendingRequest;
pub use protocol::{BridgeMessage, RequestKey};
pub use source::{CatalogSource, ContentFetcher, EmptyTileCatalog, EntityKind, SceneRecord};
pub use tile::{SceneId, Tile};
