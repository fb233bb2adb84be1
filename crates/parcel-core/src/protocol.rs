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

//! The messages exchanged between the foreground and the background resolver.
//!
//! Every message is a fire-and-forget notification. Requests and responses are
//! correlated by their key (a tile or a scene id), never by sequence number,
//! so responses may arrive in any order and a duplicated response is harmless.
//!
//! On the wire a message is a JSON object `{"type": <name>, "payload": ...}`.

use crate::config::LifecycleConfig;
use crate::error::{ResolveError, ResolveResult};
use crate::land::LandData;
use crate::tile::{SceneId, Tile};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of `Scene.idRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRequest {
    /// The tiles to resolve.
    #[serde(rename = "sceneIds")]
    pub scene_ids: Vec<Tile>,
}

/// Payload of `Scene.idResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdResponse {
    /// The tile this answer is for.
    pub position: Tile,
    /// The scene on it, `null` for an empty tile.
    pub data: Option<SceneId>,
}

/// Payload of `Scene.dataRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    /// The scene to describe.
    #[serde(rename = "sceneId")]
    pub scene_id: SceneId,
}

/// Payload of `Scene.dataResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    /// The resolved descriptor.
    pub data: LandData,
}

/// Identifies which outstanding request a failure belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum RequestKey {
    /// A `Scene.idRequest` entry.
    Tile(Tile),
    /// A `Scene.dataRequest`.
    Scene(SceneId),
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKey::Tile(tile) => write!(f, "tile {tile}"),
            RequestKey::Scene(scene_id) => write!(f, "scene {scene_id}"),
        }
    }
}

/// Payload of `Scene.failure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureNotice {
    /// The request that failed.
    pub key: RequestKey,
    /// Why it failed.
    pub error: ResolveError,
}

/// A message crossing the context boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BridgeMessage {
    /// Foreground → background, once at startup.
    #[serde(rename = "Lifecycle.initialize")]
    Initialize(LifecycleConfig),
    /// Foreground → background.
    #[serde(rename = "Scene.idRequest")]
    IdRequest(IdRequest),
    /// Background → foreground, one per requested tile.
    #[serde(rename = "Scene.idResponse")]
    IdResponse(IdResponse),
    /// Foreground → background.
    #[serde(rename = "Scene.dataRequest")]
    DataRequest(DataRequest),
    /// Background → foreground.
    #[serde(rename = "Scene.dataResponse")]
    DataResponse(DataResponse),
    /// Background → foreground, when a request cannot be answered.
    #[serde(rename = "Scene.failure")]
    Failure(FailureNotice),
}

impl BridgeMessage {
    /// The protocol name of the message.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeMessage::Initialize(_) => "Lifecycle.initialize",
            BridgeMessage::IdRequest(_) => "Scene.idRequest",
            BridgeMessage::IdResponse(_) => "Scene.idResponse",
            BridgeMessage::DataRequest(_) => "Scene.dataRequest",
            BridgeMessage::DataResponse(_) => "Scene.dataResponse",
            BridgeMessage::Failure(_) => "Scene.failure",
        }
    }

    /// Encodes the message as a JSON frame.
    pub fn to_json(&self) -> ResolveResult<String> {
        serde_json::to_string(self)
            .map_err(|e| ResolveError::Protocol(format!("cannot encode {}: {e}", self.name())))
    }

    /// Decodes a JSON frame.
    pub fn from_json(frame: &str) -> ResolveResult<Self> {
        serde_json::from_str(frame)
            .map_err(|e| ResolveError::Protocol(format!("malformed frame: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_request_matches_the_wire_shape() {
        let message = BridgeMessage::IdRequest(IdRequest {
            scene_ids: vec![Tile::new("0,0"), Tile::new("1,0")],
        });
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "Scene.idRequest",
                "payload": { "sceneIds": ["0,0", "1,0"] }
            })
        );
    }

    #[test]
    fn empty_id_response_carries_null() {
        let frame = r#"{"type":"Scene.idResponse","payload":{"position":"99,99","data":null}}"#;
        let message = BridgeMessage::from_json(frame).unwrap();
        assert_eq!(
            message,
            BridgeMessage::IdResponse(IdResponse {
                position: Tile::new("99,99"),
                data: None,
            })
        );
        assert_eq!(message.name(), "Scene.idResponse");
    }

    #[test]
    fn unknown_frames_are_protocol_errors() {
        let err = BridgeMessage::from_json(r#"{"type":"Scene.teleport","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ResolveError::Protocol(_)));
    }
}
