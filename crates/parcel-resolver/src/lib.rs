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

//! # Parcel Resolver
//!
//! The caching layer that turns tiles into scene ids and scene ids into land
//! data. It coalesces concurrent lookups, batches network fetches, and falls
//! back to synthesized placeholder scenes for empty tiles.

#![warn(missing_docs)]

mod empty_tiles;
mod metrics;
mod tile_resolver;

pub use empty_tiles::EmptyTileSynthesizer;
pub use metrics::RESOLVER_NAMESPACE;
pub use tile_resolver::TileResolver;
