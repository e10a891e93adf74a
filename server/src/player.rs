//! Server-side player state
//!
//! A [`Player`] is owned by the registry; everything outside it works on
//! copies taken under the registry lock. This module also builds the
//! outbound messages that describe a player to peers.

use crate::inventory::Inventory;
use shared::{Message, PlayerId, Vec2, Vec3, Vitals};
use std::time::{Duration, Instant};

/// Longest name, in characters, the server keeps.
pub const MAX_NAME_LEN: usize = 32;

/// Name given to players whose requested name is empty after cleanup.
pub const DEFAULT_NAME: &str = "Survivor";

/// Cleans up a requested player name
///
/// Surrounding whitespace and control characters are removed and the
/// result is cut to [`MAX_NAME_LEN`] characters. An empty result falls
/// back to [`DEFAULT_NAME`].
pub fn sanitize_name(requested: &str) -> String {
    let name: String = requested
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    let name = name.trim();

    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Authoritative state of one connected player
#[derive(Debug, Clone)]
pub struct Player {
    /// Unique id assigned by the registry, never reused
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
    /// Yaw and pitch of the player's view
    pub rotation: Vec2,
    /// Last time a heartbeat or movement frame arrived from this player
    pub last_heartbeat: Instant,
    pub vitals: Vitals,
    pub inventory: Inventory,
    /// Set once the death of the player has been reported
    pub dead: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String, position: Vec3) -> Self {
        Self {
            id,
            name,
            position,
            rotation: Vec2::default(),
            last_heartbeat: Instant::now(),
            vitals: Vitals::default(),
            inventory: Inventory::new(),
            dead: false,
        }
    }

    pub fn refresh_heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    /// Checks whether the player has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_heartbeat.elapsed() > timeout
    }

    /// Applies a validated movement frame. Movement also counts as a
    /// heartbeat.
    pub fn apply_movement(&mut self, position: Vec3, rotation: Vec2) {
        self.position = position;
        self.rotation = rotation;
        self.refresh_heartbeat();
    }

    pub fn spawn_message(&self) -> Message {
        Message::PlayerSpawn {
            player_id: self.id,
            name: self.name.clone(),
            position: self.position,
        }
    }

    pub fn movement_message(&self) -> Message {
        Message::PlayerMovement {
            player_id: self.id,
            position: self.position,
            rotation: self.rotation,
        }
    }

    pub fn stats_message(&self) -> Message {
        Message::StatsUpdate {
            player_id: self.id,
            vitals: self.vitals,
        }
    }

    pub fn inventory_message(&self) -> Message {
        Message::InventoryUpdate {
            slots: self.inventory.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_defaults() {
        let player = Player::new(7, "Alice".to_string(), Vec3::new(1.0, 1.0, 2.0));

        assert_eq!(player.id, 7);
        assert_eq!(player.vitals, Vitals::default());
        assert!(!player.dead);
        assert!(player.inventory.snapshot().is_empty());
        assert!(!player.is_timed_out(Duration::from_secs(10)));
    }

    #[test]
    fn test_apply_movement_refreshes_heartbeat() {
        let mut player = Player::new(1, "Bob".to_string(), Vec3::default());
        player.last_heartbeat = Instant::now() - Duration::from_secs(30);
        assert!(player.is_timed_out(Duration::from_secs(10)));

        player.apply_movement(Vec3::new(4.0, 1.0, -2.0), Vec2::new(90.0, 5.0));

        assert!(!player.is_timed_out(Duration::from_secs(10)));
        assert_eq!(player.position, Vec3::new(4.0, 1.0, -2.0));
        assert_eq!(
            player.movement_message(),
            Message::PlayerMovement {
                player_id: 1,
                position: Vec3::new(4.0, 1.0, -2.0),
                rotation: Vec2::new(90.0, 5.0),
            }
        );
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Alice  "), "Alice");
        assert_eq!(sanitize_name("Bo\u{7}b\n"), "Bob");
        assert_eq!(sanitize_name(""), DEFAULT_NAME);
        assert_eq!(sanitize_name(" \t\r\n"), DEFAULT_NAME);

        let long = "x".repeat(100);
        assert_eq!(sanitize_name(&long).chars().count(), MAX_NAME_LEN);

        // multi-byte characters are counted, not bytes
        let accented = "é".repeat(40);
        assert_eq!(sanitize_name(&accented), "é".repeat(MAX_NAME_LEN));
    }
}
