//! Per-connection protocol state machine
//!
//! Each accepted peer is served by one task running [`serve`]. It reads
//! frames off the socket, decodes them and drives the peer through
//! `Connecting -> AwaitingReady -> Active -> Disconnected`:
//!
//! - ConnectionRequest registers the player and answers with
//!   ConnectionAccept.
//! - ClientReady pushes the player's inventory, then the players already in
//!   the world, then announces the newcomer to everyone else. Each step waits
//!   until the writer has put the previous one on the wire.
//! - While active, movement is relayed, heartbeats keep the player alive and
//!   item frames go to the inventory.
//!
//! Frames that make no sense in the current state are ignored. Whatever ends
//! the connection, the player is removed through the common disconnect path.

use crate::context::{DisconnectReason, ServerContext};
use crate::network::wait_for_shutdown;
use crate::peer::{PeerHandle, Reliability};
use crate::player::sanitize_name;
use crate::stats;
use log::{debug, info, warn};
use shared::{DecodeError, FrameBuffer, Message, PlayerId, Vec2, Vec3};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    AwaitingReady,
    Active,
    Disconnected,
}

/// What the read loop should do after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close(DisconnectReason),
}

pub struct Connection {
    ctx: Arc<ServerContext>,
    peer: PeerHandle,
    state: ConnectionState,
    player_id: Option<PlayerId>,
}

impl Connection {
    pub fn new(ctx: Arc<ServerContext>, peer: PeerHandle) -> Self {
        Self {
            ctx,
            peer,
            state: ConnectionState::Connecting,
            player_id: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Decodes and handles every complete frame in `frames`.
    pub async fn drain_frames(&mut self, frames: &mut FrameBuffer) -> Flow {
        loop {
            let frame = match frames.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Flow::Continue,
                Err(e) => {
                    // the stream cannot be resynchronised after a bad header
                    warn!("Unrecoverable frame from {}: {}", self.peer.addr(), e);
                    return Flow::Close(DisconnectReason::ProtocolViolation);
                }
            };

            match Message::from_frame(&frame) {
                Ok(message) => {
                    if let Flow::Close(reason) = self.handle_message(message).await {
                        return Flow::Close(reason);
                    }
                }
                Err(e) => self.log_dropped(&e),
            }
        }
    }

    fn log_dropped(&self, error: &DecodeError) {
        debug!("Dropping frame from {}: {}", self.peer.addr(), error);
    }

    pub async fn handle_message(&mut self, message: Message) -> Flow {
        match (self.state, message) {
            (ConnectionState::Connecting, Message::ConnectionRequest { player_name }) => {
                self.on_connection_request(&player_name).await
            }
            (ConnectionState::AwaitingReady, Message::ClientReady) => self.on_client_ready().await,
            (
                ConnectionState::Active,
                Message::PlayerMovement {
                    player_id,
                    position,
                    rotation,
                },
            ) => {
                self.on_movement(player_id, position, rotation).await;
                Flow::Continue
            }
            (ConnectionState::AwaitingReady | ConnectionState::Active, Message::Heartbeat) => {
                if let Some(id) = self.player_id {
                    self.ctx
                        .registry
                        .update(id, |player| player.refresh_heartbeat())
                        .await;
                }
                Flow::Continue
            }
            (ConnectionState::Active, Message::ItemUse { slot_index }) => {
                self.on_item_use(slot_index).await;
                Flow::Continue
            }
            (ConnectionState::Active, Message::ItemMove { from_slot, to_slot }) => {
                self.on_item_move(from_slot, to_slot).await;
                Flow::Continue
            }
            (_, Message::PlayerDisconnect { player_id }) => {
                if player_id == 0 || Some(player_id) == self.player_id {
                    Flow::Close(DisconnectReason::ClientRequest)
                } else {
                    debug!(
                        "{} asked to disconnect player {}, ignoring",
                        self.peer.addr(),
                        player_id
                    );
                    Flow::Continue
                }
            }
            (_, Message::PlayerRespawn) => {
                info!("Player {:?} requested a respawn", self.player_id);
                Flow::Continue
            }
            (state, message) => {
                debug!(
                    "Ignoring {:?} from {} in state {:?}",
                    message.packet_type(),
                    self.peer.addr(),
                    state
                );
                Flow::Continue
            }
        }
    }

    async fn on_connection_request(&mut self, requested: &str) -> Flow {
        let name = sanitize_name(requested);
        let spawn = self.ctx.spawn_position();

        let Some(player) = self
            .ctx
            .registry
            .create(name, spawn, self.peer.clone())
            .await
        else {
            warn!(
                "Rejecting {}: server full ({} players)",
                self.peer.addr(),
                self.ctx.registry.capacity()
            );
            return Flow::Close(DisconnectReason::ServerFull);
        };

        self.player_id = Some(player.id);
        self.state = ConnectionState::AwaitingReady;

        let kit = self.ctx.starting_inventory();
        self.ctx
            .registry
            .update(player.id, |player| player.inventory = kit)
            .await;

        let accept = Message::ConnectionAccept {
            player_id: player.id,
            spawn: player.position,
        };
        if !self
            .ctx
            .broadcaster
            .send_to(&self.peer, &accept, Reliability::GuaranteedOrdered)
        {
            return Flow::Close(DisconnectReason::PeerClosed);
        }
        Flow::Continue
    }

    async fn on_client_ready(&mut self) -> Flow {
        let Some(id) = self.player_id else {
            return Flow::Continue;
        };
        let ctx = Arc::clone(&self.ctx);
        let broadcaster = &ctx.broadcaster;
        let peer = &self.peer;

        // inventory first, so the client has its items before the world
        let Some(inventory) = ctx.registry.get(id).await.map(|p| p.inventory_message()) else {
            return Flow::Close(DisconnectReason::PeerClosed);
        };
        if !broadcaster.send_to(peer, &inventory, Reliability::GuaranteedOrdered) {
            return Flow::Close(DisconnectReason::PeerClosed);
        }
        if peer.barrier().await.is_err() {
            return Flow::Close(DisconnectReason::PeerClosed);
        }

        let known = ctx
            .registry
            .activate(id, |own_peer, others| {
                for other in others {
                    broadcaster.send_to(
                        own_peer,
                        &other.spawn_message(),
                        Reliability::GuaranteedOrdered,
                    );
                }
                others.len()
            })
            .await;
        let Some(known) = known else {
            return Flow::Close(DisconnectReason::PeerClosed);
        };
        if peer.barrier().await.is_err() {
            return Flow::Close(DisconnectReason::PeerClosed);
        }

        let notified = ctx
            .registry
            .announce(id, |player, targets| {
                broadcaster.fan_out(
                    targets,
                    &player.spawn_message(),
                    Reliability::GuaranteedOrdered,
                )
            })
            .await;
        let Some(notified) = notified else {
            return Flow::Close(DisconnectReason::PeerClosed);
        };

        self.state = ConnectionState::Active;
        info!(
            "Player {} is in the world ({} already present, announced to {})",
            id, known, notified
        );
        Flow::Continue
    }

    async fn on_movement(&self, player_id: PlayerId, position: Vec3, rotation: Vec2) {
        let Some(id) = self.player_id else { return };
        if player_id != id {
            debug!("Player {} sent movement for {}, dropping", id, player_id);
            return;
        }
        if !position.is_finite() || !rotation.is_finite() {
            debug!("Player {} sent non-finite movement, dropping", id);
            return;
        }

        let moved = self
            .ctx
            .registry
            .update(id, |player| {
                player.apply_movement(position, rotation);
                player.movement_message()
            })
            .await;
        if let Some(movement) = moved {
            self.ctx
                .broadcaster
                .broadcast_all(&movement, Some(id), Reliability::BestEffortLatest)
                .await;
        }
    }

    async fn on_item_use(&self, slot: i32) {
        let Some(id) = self.player_id else { return };
        let catalog = &self.ctx.catalog;

        let update = self
            .ctx
            .registry
            .update(id, |player| {
                if player.dead {
                    return None;
                }
                let effect = player.inventory.consume(slot, catalog)?;
                stats::restore(&mut player.vitals, &effect);
                Some(player.inventory_message())
            })
            .await
            .flatten();

        match update {
            Some(update) => {
                self.ctx
                    .broadcaster
                    .send_to(&self.peer, &update, Reliability::GuaranteedOrdered);
            }
            None => debug!("Player {} could not use slot {}", id, slot),
        }
    }

    async fn on_item_move(&self, from: i32, to: i32) {
        let Some(id) = self.player_id else { return };
        let catalog = &self.ctx.catalog;

        let update = self
            .ctx
            .registry
            .update(id, |player| {
                player
                    .inventory
                    .move_item(from, to, catalog)
                    .then(|| player.inventory_message())
            })
            .await
            .flatten();

        match update {
            Some(update) => {
                self.ctx
                    .broadcaster
                    .send_to(&self.peer, &update, Reliability::GuaranteedOrdered);
            }
            None => debug!("Player {} could not move {} -> {}", id, from, to),
        }
    }

    /// Tears the connection down. Safe to call more than once.
    pub async fn close(&mut self, reason: DisconnectReason) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;

        match self.player_id {
            Some(id) => {
                self.ctx.disconnect(id, reason).await;
            }
            None => debug!("Connection {} closed: {}", self.peer.addr(), reason),
        }
        self.peer.close();
    }
}

/// Serves one peer until it disconnects, misbehaves, times out during the
/// handshake or the server shuts down.
pub async fn serve<R>(
    ctx: Arc<ServerContext>,
    peer: PeerHandle,
    mut reader: R,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let handshake_deadline = Instant::now() + ctx.config.heartbeat_timeout;
    let mut connection = Connection::new(ctx, peer.clone());
    let mut frames = FrameBuffer::new();

    let reason = loop {
        tokio::select! {
            read = reader.read_buf(frames.buffer_mut()) => match read {
                Ok(0) => break DisconnectReason::TransportClosed,
                Ok(_) => {
                    if let Flow::Close(reason) = connection.drain_frames(&mut frames).await {
                        break reason;
                    }
                }
                Err(e) => {
                    debug!("Read from {} failed: {}", peer.addr(), e);
                    break DisconnectReason::TransportError;
                }
            },
            _ = peer.closed() => break DisconnectReason::PeerClosed,
            _ = wait_for_shutdown(&mut shutdown) => break DisconnectReason::Shutdown,
            _ = tokio::time::sleep_until(handshake_deadline),
                if connection.state() == ConnectionState::Connecting =>
            {
                break DisconnectReason::HandshakeTimeout;
            }
        }
    };

    connection.close(reason).await;
}
