//! State shared by every task of a running server, and the common
//! disconnect path.

use crate::broadcast::Broadcaster;
use crate::catalog::ItemCatalog;
use crate::config::ServerConfig;
use crate::inventory::Inventory;
use crate::peer::Reliability;
use crate::registry::PlayerRegistry;
use log::{debug, info, warn};
use rand::Rng;
use shared::{Message, PlayerId, Vec3};
use std::fmt;
use std::sync::Arc;

/// Why a player left the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientRequest,
    TransportClosed,
    TransportError,
    Timeout,
    HandshakeTimeout,
    ServerFull,
    ProtocolViolation,
    /// The outbound side gave up: write failure or a stalled queue
    PeerClosed,
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::ClientRequest => "client request",
            DisconnectReason::TransportClosed => "connection closed",
            DisconnectReason::TransportError => "transport error",
            DisconnectReason::Timeout => "heartbeat timeout",
            DisconnectReason::HandshakeTimeout => "handshake timeout",
            DisconnectReason::ServerFull => "server full",
            DisconnectReason::ProtocolViolation => "protocol violation",
            DisconnectReason::PeerClosed => "peer closed",
            DisconnectReason::Shutdown => "server shutdown",
        };
        f.write_str(text)
    }
}

pub struct ServerContext {
    pub config: ServerConfig,
    pub catalog: ItemCatalog,
    pub registry: Arc<PlayerRegistry>,
    pub broadcaster: Broadcaster,
}

impl ServerContext {
    pub fn new(config: ServerConfig, catalog: ItemCatalog) -> Arc<Self> {
        let registry = Arc::new(PlayerRegistry::new(config.max_players));
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        Arc::new(Self {
            config,
            catalog,
            registry,
            broadcaster,
        })
    }

    /// Spawn point scattered uniformly over a disc in the x/z plane.
    pub fn spawn_position(&self) -> Vec3 {
        let base = self.config.spawn_point;
        let radius = self.config.spawn_radius;
        if radius <= 0.0 {
            return base;
        }

        let mut rng = rand::thread_rng();
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = radius * rng.gen::<f32>().sqrt();
        Vec3::new(
            base.x + distance * angle.cos(),
            base.y,
            base.z + distance * angle.sin(),
        )
    }

    /// Inventory every new player starts with.
    pub fn starting_inventory(&self) -> Inventory {
        let mut inventory = Inventory::new();
        for &(item_id, quantity) in &self.config.starting_items {
            let leftover = inventory.add_item(item_id, quantity, &self.catalog);
            if leftover > 0 {
                warn!(
                    "Starting kit does not fit: {} of item {} left over",
                    leftover, item_id
                );
            }
        }
        inventory
    }

    /// Removes a player, closes its peer and tells everyone else
    ///
    /// Safe to call any number of times from any task; only the call that
    /// actually removes the player broadcasts. Returns whether it did.
    pub async fn disconnect(&self, player_id: PlayerId, reason: DisconnectReason) -> bool {
        let Some((player, peer)) = self.registry.take(player_id).await else {
            debug!("Player {} already disconnected ({})", player_id, reason);
            return false;
        };

        peer.close();
        info!(
            "Player {} ({}) disconnected: {}",
            player.id, player.name, reason
        );

        let notice = Message::PlayerDisconnect { player_id };
        let notified = self
            .broadcaster
            .broadcast_all(&notice, Some(player_id), Reliability::GuaranteedOrdered)
            .await;
        debug!("Disconnect of {} sent to {} players", player_id, notified);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_context, TestClient};
    use std::time::Duration;

    #[test]
    fn test_spawn_position_within_radius() {
        let ctx = test_context(ServerConfig::default());
        let center = ctx.config.spawn_point;

        for _ in 0..100 {
            let spawn = ctx.spawn_position();
            let dx = spawn.x - center.x;
            let dz = spawn.z - center.z;
            assert!((dx * dx + dz * dz).sqrt() <= ctx.config.spawn_radius + 1e-4);
            assert_eq!(spawn.y, center.y);
        }
    }

    #[test]
    fn test_zero_radius_spawns_on_point() {
        let ctx = test_context(ServerConfig {
            spawn_radius: 0.0,
            ..ServerConfig::default()
        });
        assert_eq!(ctx.spawn_position(), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_starting_inventory() {
        let ctx = test_context(ServerConfig::default());
        let inventory = ctx.starting_inventory();

        assert_eq!(inventory.count(1), 3);
        assert_eq!(inventory.count(4), 2);
        assert_eq!(inventory.count(6), 1);
        assert_eq!(inventory.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_once() {
        let ctx = test_context(ServerConfig::default());
        let (peer_a, _client_a) = TestClient::connect(16);
        let (peer_b, mut client_b) = TestClient::connect(16);

        let a = ctx
            .registry
            .create("A".into(), Vec3::default(), peer_a.clone())
            .await
            .unwrap();
        let b = ctx
            .registry
            .create("B".into(), Vec3::default(), peer_b)
            .await
            .unwrap();
        ctx.registry.activate(a.id, |_, _| ()).await;
        ctx.registry.activate(b.id, |_, _| ()).await;

        // the monitor and the connection task race to disconnect
        let (first, second) = tokio::join!(
            ctx.disconnect(a.id, DisconnectReason::Timeout),
            ctx.disconnect(a.id, DisconnectReason::TransportClosed),
        );
        assert!(first ^ second);
        assert!(peer_a.is_closed());

        assert_eq!(
            client_b.next_message().await,
            Some(Message::PlayerDisconnect { player_id: a.id })
        );
        client_b.expect_silence(Duration::from_millis(100)).await;
        assert_eq!(ctx.registry.len().await, 1);
    }
}
