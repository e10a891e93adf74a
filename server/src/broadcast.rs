//! Fan-out of server messages to connected peers
//!
//! A message is encoded once and the same frame is handed to every target's
//! outbound queue. Enqueueing never waits, and a failure for one peer is
//! logged and skipped without affecting the rest.

use crate::peer::{PeerHandle, Reliability, Subject};
use crate::registry::PlayerRegistry;
use log::debug;
use shared::{Message, PlayerId};
use std::sync::Arc;

pub struct Broadcaster {
    registry: Arc<PlayerRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<PlayerRegistry>) -> Self {
        Self { registry }
    }

    /// Sends one message to one peer. Returns false if it could not be
    /// queued.
    pub fn send_to(&self, peer: &PeerHandle, message: &Message, class: Reliability) -> bool {
        match peer.send(message, class) {
            Ok(()) => true,
            Err(e) => {
                debug!("Failed to send {:?}: {}", message.packet_type(), e);
                false
            }
        }
    }

    /// Sends to every ready player except `exclude`. Returns how many peers
    /// accepted the message.
    pub async fn broadcast_all(
        &self,
        message: &Message,
        exclude: Option<PlayerId>,
        class: Reliability,
    ) -> usize {
        let targets = self.registry.ready_peers(exclude).await;
        self.fan_out(&targets, message, class)
    }

    /// Sends to an explicit set of peers.
    pub fn fan_out(
        &self,
        targets: &[(PlayerId, PeerHandle)],
        message: &Message,
        class: Reliability,
    ) -> usize {
        let frame = message.encode();
        let subject = Subject::of(message);

        let mut delivered = 0;
        for (player_id, peer) in targets {
            match peer.send_frame(frame.clone(), subject, class) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(
                    "Skipping player {} for {:?}: {}",
                    player_id,
                    message.packet_type(),
                    e
                ),
            }
        }
        delivered
    }
}
