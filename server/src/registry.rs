//! Player registry: the only shared mutable state of the server
//!
//! The registry owns every [`Player`] together with the [`PeerHandle`] of
//! the connection it belongs to. A single async mutex guards the table. It
//! is held for the map mutation or the copy and released before anything is
//! written to a socket; the closures accepted by [`PlayerRegistry::activate`]
//! and [`PlayerRegistry::announce`] run under the lock and may only enqueue.
//!
//! Two lifecycle flags drive the handshake:
//! - `ready`: the peer receives broadcasts
//! - `announced`: other peers have been sent this player's PlayerSpawn
//!
//! Because both flags flip under the same lock as the snapshot taken with
//! them, every pair of players learns about each other exactly once.

use crate::peer::PeerHandle;
use crate::player::Player;
use log::{debug, info};
use shared::{PlayerId, Vec3, Vitals};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;

struct Entry {
    player: Player,
    peer: PeerHandle,
    ready: bool,
    announced: bool,
}

struct Inner {
    players: BTreeMap<PlayerId, Entry>,
    next_id: PlayerId,
}

pub struct PlayerRegistry {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl PlayerRegistry {
    /// Creates an empty registry admitting at most `capacity` players.
    /// Ids start from 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                players: BTreeMap::new(),
                next_id: 1,
            }),
            capacity,
        }
    }

    /// Registers a new player bound to `peer`
    ///
    /// Returns a copy of the created player, or None if the server is at
    /// capacity.
    pub async fn create(&self, name: String, position: Vec3, peer: PeerHandle) -> Option<Player> {
        let mut inner = self.inner.lock().await;
        if inner.players.len() >= self.capacity {
            return None;
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let player = Player::new(id, name, position);
        info!("Player {} ({}) joined from {}", id, player.name, peer.addr());
        inner.players.insert(
            id,
            Entry {
                player: player.clone(),
                peer,
                ready: false,
                announced: false,
            },
        );
        Some(player)
    }

    pub async fn remove(&self, id: PlayerId) -> bool {
        self.take(id).await.is_some()
    }

    /// Removes a player and hands back its state and peer.
    pub async fn take(&self, id: PlayerId) -> Option<(Player, PeerHandle)> {
        let removed = self.inner.lock().await.players.remove(&id);
        if removed.is_none() {
            debug!("Player {} is not registered", id);
        }
        removed.map(|entry| (entry.player, entry.peer))
    }

    pub async fn get(&self, id: PlayerId) -> Option<Player> {
        let inner = self.inner.lock().await;
        inner.players.get(&id).map(|entry| entry.player.clone())
    }

    /// Copies of every registered player, ordered by id
    pub async fn snapshot_all(&self) -> Vec<Player> {
        let inner = self.inner.lock().await;
        inner
            .players
            .values()
            .map(|entry| entry.player.clone())
            .collect()
    }

    /// Runs `f` against one player. Returns None when the id is unknown.
    pub async fn update<R>(&self, id: PlayerId, f: impl FnOnce(&mut Player) -> R) -> Option<R> {
        let mut inner = self.inner.lock().await;
        match inner.players.get_mut(&id) {
            Some(entry) => Some(f(&mut entry.player)),
            None => {
                debug!("Update for unknown player {}", id);
                None
            }
        }
    }

    /// Runs `f` against every player in id order and collects what it
    /// returns.
    pub async fn update_all<R>(&self, mut f: impl FnMut(&mut Player) -> Option<R>) -> Vec<R> {
        let mut inner = self.inner.lock().await;
        inner
            .players
            .values_mut()
            .filter_map(|entry| f(&mut entry.player))
            .collect()
    }

    /// Marks a player ready to receive broadcasts
    ///
    /// `deliver` is called under the lock with the player's own peer and
    /// every other player already announced.
    pub async fn activate<R>(
        &self,
        id: PlayerId,
        deliver: impl FnOnce(&PeerHandle, &[Player]) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock().await;
        let announced: Vec<Player> = inner
            .players
            .values()
            .filter(|entry| entry.announced && entry.player.id != id)
            .map(|entry| entry.player.clone())
            .collect();

        let entry = inner.players.get_mut(&id)?;
        entry.ready = true;
        Some(deliver(&entry.peer, &announced))
    }

    /// Marks a player announced
    ///
    /// `deliver` is called under the lock with the player and the peers of
    /// every other ready player.
    pub async fn announce<R>(
        &self,
        id: PlayerId,
        deliver: impl FnOnce(&Player, &[(PlayerId, PeerHandle)]) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock().await;
        let ready: Vec<(PlayerId, PeerHandle)> = inner
            .players
            .iter()
            .filter(|(other, entry)| entry.ready && **other != id)
            .map(|(other, entry)| (*other, entry.peer.clone()))
            .collect();

        let entry = inner.players.get_mut(&id)?;
        entry.announced = true;
        Some(deliver(&entry.player, &ready))
    }

    pub async fn is_ready(&self, id: PlayerId) -> bool {
        let inner = self.inner.lock().await;
        inner.players.get(&id).is_some_and(|entry| entry.ready)
    }

    /// Peers of every ready player, optionally leaving one out
    pub async fn ready_peers(&self, exclude: Option<PlayerId>) -> Vec<(PlayerId, PeerHandle)> {
        let inner = self.inner.lock().await;
        inner
            .players
            .iter()
            .filter(|(id, entry)| entry.ready && Some(**id) != exclude)
            .map(|(id, entry)| (*id, entry.peer.clone()))
            .collect()
    }

    /// Current vitals of every ready player along with its own peer
    pub async fn ready_vitals(&self) -> Vec<(PlayerId, Vitals, PeerHandle)> {
        let inner = self.inner.lock().await;
        inner
            .players
            .iter()
            .filter(|(_, entry)| entry.ready)
            .map(|(id, entry)| (*id, entry.player.vitals, entry.peer.clone()))
            .collect()
    }

    /// Ids of players whose last heartbeat is older than `timeout`
    pub async fn stale(&self, timeout: Duration) -> Vec<PlayerId> {
        let inner = self.inner.lock().await;
        inner
            .players
            .values()
            .filter(|entry| entry.player.is_timed_out(timeout))
            .map(|entry| entry.player.id)
            .collect()
    }

    /// Removes every player at once, used on shutdown.
    pub async fn drain(&self) -> Vec<(Player, PeerHandle)> {
        let mut inner = self.inner.lock().await;
        std::mem::take(&mut inner.players)
            .into_values()
            .map(|entry| (entry.player, entry.peer))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.players.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.players.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
