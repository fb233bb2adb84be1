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

//! The duplex message channel connecting the two contexts.
//!
//! Messages travel as encoded JSON frames, so nothing but plain text crosses
//! the boundary, exactly as it would between isolated workers.

use parcel_core::{BridgeMessage, ResolveError, ResolveResult};

/// Creates a connected pair of endpoints.
///
/// ## Returns
/// `(foreground, background)`: whatever one side notifies, the other receives.
pub fn duplex() -> (Endpoint, Endpoint) {
    let (to_background, from_foreground) = flume::unbounded();
    let (to_foreground, from_background) = flume::unbounded();
    log::debug!("Bridge channel initialized.");

    let foreground = Endpoint {
        outbox: Outbox {
            sender: to_background,
        },
        inbox: Inbox {
            receiver: from_background,
        },
    };
    let background = Endpoint {
        outbox: Outbox {
            sender: to_foreground,
        },
        inbox: Inbox {
            receiver: from_foreground,
        },
    };
    (foreground, background)
}

/// One side of a [`duplex`] channel.
#[derive(Debug)]
pub struct Endpoint {
    outbox: Outbox,
    inbox: Inbox,
}

impl Endpoint {
    /// Separates the sending and receiving halves.
    pub fn split(self) -> (Outbox, Inbox) {
        (self.outbox, self.inbox)
    }
}

/// The sending half of an [`Endpoint`].
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: flume::Sender<String>,
}

impl Outbox {
    /// Encodes and sends a message. Fire-and-forget: there is no reply.
    ///
    /// ## Errors
    /// [`ResolveError::Disconnected`] if the other side is gone.
    pub fn notify(&self, message: &BridgeMessage) -> ResolveResult<()> {
        log::trace!("Notifying {}", message.name());
        self.send_frame(message.to_json()?)
    }

    /// Sends an already encoded frame.
    pub fn send_frame(&self, frame: String) -> ResolveResult<()> {
        self.sender.send(frame).map_err(|_| {
            log::debug!("Bridge peer disconnected, frame dropped.");
            ResolveError::Disconnected
        })
    }

    /// Returns `true` once the receiving side has been dropped.
    pub fn is_disconnected(&self) -> bool {
        self.sender.is_disconnected()
    }
}

/// The receiving half of an [`Endpoint`].
#[derive(Debug)]
pub struct Inbox {
    receiver: flume::Receiver<String>,
}

impl Inbox {
    /// Waits for the next well-formed message.
    ///
    /// Malformed frames are logged and skipped. Returns `None` once every
    /// sender on the other side has been dropped.
    pub async fn next(&self) -> Option<BridgeMessage> {
        loop {
            let frame = self.receiver.recv_async().await.ok()?;
            match BridgeMessage::from_json(&frame) {
                Ok(message) => return Some(message),
                Err(e) => log::warn!("Dropping bridge frame: {e}"),
            }
        }
    }

    /// Number of frames waiting to be read.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if no frame is waiting.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_core::protocol::DataRequest;
    use parcel_core::SceneId;

    fn data_request(id: &str) -> BridgeMessage {
        BridgeMessage::DataRequest(DataRequest {
            scene_id: SceneId::new(id),
        })
    }

    #[tokio::test]
    async fn messages_cross_in_order() {
        let (foreground, background) = duplex();
        let (fg_out, _fg_in) = foreground.split();
        let (_bg_out, bg_in) = background.split();

        fg_out.notify(&data_request("QmA")).unwrap();
        fg_out.notify(&data_request("QmB")).unwrap();

        assert_eq!(bg_in.len(), 2);
        assert_eq!(bg_in.next().await, Some(data_request("QmA")));
        assert_eq!(bg_in.next().await, Some(data_request("QmB")));
        assert!(bg_in.is_empty());
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let (foreground, background) = duplex();
        let (fg_out, _fg_in) = foreground.split();
        let (_bg_out, bg_in) = background.split();

        fg_out.send_frame("not json".to_string()).unwrap();
        fg_out.notify(&data_request("QmA")).unwrap();

        assert_eq!(bg_in.next().await, Some(data_request("QmA")));
    }

    #[tokio::test]
    async fn dropping_one_side_disconnects_the_other() {
        let (foreground, background) = duplex();
        let (fg_out, fg_in) = foreground.split();
        drop(background);

        assert!(fg_out.is_disconnected());
        assert_eq!(fg_out.notify(&data_request("QmA")), Err(ResolveError::Disconnected));
        assert_eq!(fg_in.next().await, None);
    }
}
