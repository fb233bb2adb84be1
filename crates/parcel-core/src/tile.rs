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

//! Identifiers for map tiles and the scenes deployed on them.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A world-map coordinate key, e.g. `"10,-4"`.
///
/// Identity is plain string equality: `"1,2"` and `"1, 2"` are different
/// tiles as far as the caches are concerned, exactly as on the content server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tile(String);

impl Tile {
    /// Wraps a coordinate key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Builds the canonical `"x,y"` key for a pair of coordinates.
    pub fn from_coords(x: i32, y: i32) -> Self {
        Self(format!("{x},{y}"))
    }

    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the key back into `(x, y)` when it is a well-formed pair.
    pub fn parse_coords(&self) -> Option<(i32, i32)> {
        let (x, y) = self.0.split_once(',')?;
        Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tile {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Tile {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Borrow<str> for Tile {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// An opaque, content-addressed scene identifier.
///
/// Every tile owned by a scene resolves to the same `SceneId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    /// Wraps an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SceneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for SceneId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
