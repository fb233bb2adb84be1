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

//! The runtime's configuration file.

use anyhow::{Context, Result};
use parcel_core::{BridgeConfig, LifecycleConfig, ResolverConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything the runtime can be configured with.
///
/// Every section and field is optional in the file; missing ones keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Sent to the worker as `Lifecycle.initialize`.
    pub lifecycle: LifecycleConfig,
    /// Retry policy of the background resolver.
    pub resolver: ResolverConfig,
    /// Foreground request deadline.
    pub bridge: BridgeConfig,
}

impl RuntimeConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_core::EmptySceneVariant;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "lifecycle": {{ "contentServer": "http://localhost:6969/content", "emptySceneVariant": "halloween" }},
                "bridge": {{ "request_timeout_ms": 500 }}
            }}"#
        )
        .unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();

        assert_eq!(config.lifecycle.content_server, "http://localhost:6969/content");
        assert_eq!(config.lifecycle.empty_scene_variant, EmptySceneVariant::Halloween);
        assert!(config.lifecycle.empty_scenes);
        assert_eq!(config.bridge.request_timeout_ms, 500);
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn missing_file_is_an_error_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let err = RuntimeConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(RuntimeConfig::load_or_default(None).unwrap(), RuntimeConfig::default());
    }
}
