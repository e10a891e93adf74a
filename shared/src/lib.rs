//! Wire protocol shared between the survival server and its clients.
//!
//! Every frame on the wire is `[type:u8][payloadLength:u32 LE][payload]`.
//! [`codec`] handles the framing, [`messages`] the per-message payload
//! layouts. Plain data types used inside messages live here.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_frame, encode_frame, DecodeError, Frame, FrameBuffer, HEADER_LEN, MAX_FRAME_LEN,
};
pub use messages::{Message, PacketType};

/// Player identifiers are signed 32-bit on the wire.
pub type PlayerId = i32;

/// Item identifiers as defined by the item catalog.
pub type ItemId = i32;

/// Number of slots in every player inventory.
pub const INVENTORY_SIZE: usize = 24;

/// Upper bound for health, hunger and thirst.
pub const MAX_VITAL: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Look direction: yaw around the vertical axis, pitch up/down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub yaw: f32,
    pub pitch: f32,
}

impl Vec2 {
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }

    pub fn is_finite(&self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite()
    }
}

/// Survival vitals of a player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vitals {
    pub health: f32,
    pub hunger: f32,
    pub thirst: f32,
    pub temperature: f32,
}

impl Vitals {
    pub const fn new(health: f32, hunger: f32, thirst: f32, temperature: f32) -> Self {
        Self {
            health,
            hunger,
            thirst,
            temperature,
        }
    }

    /// True once health, hunger or thirst has reached zero.
    pub fn is_depleted(&self) -> bool {
        self.health <= 0.0 || self.hunger <= 0.0 || self.thirst <= 0.0
    }
}

impl Default for Vitals {
    fn default() -> Self {
        Self::new(MAX_VITAL, MAX_VITAL, MAX_VITAL, 20.0)
    }
}

/// One occupied inventory slot as sent in an InventoryUpdate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    pub slot_index: i32,
    pub item_id: ItemId,
    pub quantity: i32,
}
