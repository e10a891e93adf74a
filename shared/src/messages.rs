//! Message kinds and their payload layouts.
//!
//! All integers and floats are little-endian. Strings are UTF-8 prefixed by
//! an i32 byte length, except the ConnectionRequest name which is the whole
//! payload.

use crate::codec::{decode_frame, encode_frame, DecodeError, Frame};
use crate::{PlayerId, SlotEntry, Vec2, Vec3, Vitals};
use bytes::{Buf, BufMut, Bytes, BytesMut};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    ConnectionRequest = 0,
    ConnectionAccept = 1,
    PlayerSpawn = 2,
    PlayerMovement = 3,
    PlayerDisconnect = 4,
    /// Reserved by older clients, never produced.
    WorldState = 5,
    Heartbeat = 6,
    ClientReady = 7,
    StatsUpdate = 8,
    PlayerDeath = 9,
    PlayerRespawn = 10,
    InventoryUpdate = 11,
    ItemUse = 12,
    ItemMove = 13,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let kind = match value {
            0 => PacketType::ConnectionRequest,
            1 => PacketType::ConnectionAccept,
            2 => PacketType::PlayerSpawn,
            3 => PacketType::PlayerMovement,
            4 => PacketType::PlayerDisconnect,
            5 => PacketType::WorldState,
            6 => PacketType::Heartbeat,
            7 => PacketType::ClientReady,
            8 => PacketType::StatsUpdate,
            9 => PacketType::PlayerDeath,
            10 => PacketType::PlayerRespawn,
            11 => PacketType::InventoryUpdate,
            12 => PacketType::ItemUse,
            13 => PacketType::ItemMove,
            other => return Err(DecodeError::UnknownType(other)),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ConnectionRequest {
        player_name: String,
    },
    ConnectionAccept {
        player_id: PlayerId,
        spawn: Vec3,
    },
    PlayerSpawn {
        player_id: PlayerId,
        name: String,
        position: Vec3,
    },
    PlayerMovement {
        player_id: PlayerId,
        position: Vec3,
        rotation: Vec2,
    },
    /// From a client, id 0 (or an empty payload) means "this connection".
    PlayerDisconnect {
        player_id: PlayerId,
    },
    Heartbeat,
    ClientReady,
    StatsUpdate {
        player_id: PlayerId,
        vitals: Vitals,
    },
    /// `killer_name` is empty for environmental deaths.
    PlayerDeath {
        player_id: PlayerId,
        killer_name: String,
    },
    PlayerRespawn,
    InventoryUpdate {
        slots: Vec<SlotEntry>,
    },
    ItemUse {
        slot_index: i32,
    },
    ItemMove {
        from_slot: i32,
        to_slot: i32,
    },
}

impl Message {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Message::ConnectionRequest { .. } => PacketType::ConnectionRequest,
            Message::ConnectionAccept { .. } => PacketType::ConnectionAccept,
            Message::PlayerSpawn { .. } => PacketType::PlayerSpawn,
            Message::PlayerMovement { .. } => PacketType::PlayerMovement,
            Message::PlayerDisconnect { .. } => PacketType::PlayerDisconnect,
            Message::Heartbeat => PacketType::Heartbeat,
            Message::ClientReady => PacketType::ClientReady,
            Message::StatsUpdate { .. } => PacketType::StatsUpdate,
            Message::PlayerDeath { .. } => PacketType::PlayerDeath,
            Message::PlayerRespawn => PacketType::PlayerRespawn,
            Message::InventoryUpdate { .. } => PacketType::InventoryUpdate,
            Message::ItemUse { .. } => PacketType::ItemUse,
            Message::ItemMove { .. } => PacketType::ItemMove,
        }
    }

    /// Encodes the payload only, without the frame header.
    pub fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Message::ConnectionRequest { player_name } => {
                buf.extend_from_slice(player_name.as_bytes());
            }
            Message::ConnectionAccept { player_id, spawn } => {
                buf.put_i32_le(*player_id);
                put_vec3(&mut buf, spawn);
            }
            Message::PlayerSpawn {
                player_id,
                name,
                position,
            } => {
                buf.put_i32_le(*player_id);
                put_string(&mut buf, name);
                put_vec3(&mut buf, position);
            }
            Message::PlayerMovement {
                player_id,
                position,
                rotation,
            } => {
                buf.put_i32_le(*player_id);
                put_vec3(&mut buf, position);
                buf.put_f32_le(rotation.yaw);
                buf.put_f32_le(rotation.pitch);
            }
            Message::PlayerDisconnect { player_id } => {
                buf.put_i32_le(*player_id);
            }
            Message::Heartbeat | Message::ClientReady | Message::PlayerRespawn => {}
            Message::StatsUpdate { player_id, vitals } => {
                buf.put_i32_le(*player_id);
                buf.put_f32_le(vitals.health);
                buf.put_f32_le(vitals.hunger);
                buf.put_f32_le(vitals.thirst);
                buf.put_f32_le(vitals.temperature);
            }
            Message::PlayerDeath {
                player_id,
                killer_name,
            } => {
                buf.put_i32_le(*player_id);
                put_string(&mut buf, killer_name);
            }
            Message::InventoryUpdate { slots } => {
                buf.put_i32_le(slots.len() as i32);
                for slot in slots {
                    buf.put_i32_le(slot.slot_index);
                    buf.put_i32_le(slot.item_id);
                    buf.put_i32_le(slot.quantity);
                }
            }
            Message::ItemUse { slot_index } => {
                buf.put_i32_le(*slot_index);
            }
            Message::ItemMove { from_slot, to_slot } => {
                buf.put_i32_le(*from_slot);
                buf.put_i32_le(*to_slot);
            }
        }
        buf.freeze()
    }

    /// Encodes the message as a complete frame.
    pub fn encode(&self) -> Bytes {
        encode_frame(self.packet_type() as u8, &self.encode_payload())
    }

    /// Decodes one complete frame from the front of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
        let (frame, _) = decode_frame(bytes)?;
        Self::from_frame(&frame)
    }

    pub fn from_frame(frame: &Frame) -> Result<Message, DecodeError> {
        let kind = PacketType::try_from(frame.kind)?;
        Self::decode_payload(kind, &frame.payload)
    }

    pub fn decode_payload(kind: PacketType, payload: &[u8]) -> Result<Message, DecodeError> {
        let mut r = PayloadReader { kind, buf: payload };
        let message = match kind {
            PacketType::ConnectionRequest => Message::ConnectionRequest {
                player_name: String::from_utf8(payload.to_vec())
                    .map_err(|_| DecodeError::InvalidUtf8(kind))?,
            },
            PacketType::ConnectionAccept => Message::ConnectionAccept {
                player_id: r.i32()?,
                spawn: r.vec3()?,
            },
            PacketType::PlayerSpawn => Message::PlayerSpawn {
                player_id: r.i32()?,
                name: r.string()?,
                position: r.vec3()?,
            },
            PacketType::PlayerMovement => Message::PlayerMovement {
                player_id: r.i32()?,
                position: r.vec3()?,
                rotation: Vec2::new(r.f32()?, r.f32()?),
            },
            PacketType::PlayerDisconnect => Message::PlayerDisconnect {
                player_id: if payload.is_empty() { 0 } else { r.i32()? },
            },
            PacketType::WorldState => return Err(DecodeError::Unsupported(kind)),
            PacketType::Heartbeat => Message::Heartbeat,
            PacketType::ClientReady => Message::ClientReady,
            PacketType::PlayerRespawn => Message::PlayerRespawn,
            PacketType::StatsUpdate => Message::StatsUpdate {
                player_id: r.i32()?,
                vitals: Vitals::new(r.f32()?, r.f32()?, r.f32()?, r.f32()?),
            },
            PacketType::PlayerDeath => Message::PlayerDeath {
                player_id: r.i32()?,
                killer_name: r.string()?,
            },
            PacketType::InventoryUpdate => {
                let count = r.len_prefix()?;
                if count.saturating_mul(12) > r.buf.remaining() {
                    return Err(r.malformed("slot count exceeds payload"));
                }
                let mut slots = Vec::with_capacity(count);
                for _ in 0..count {
                    slots.push(SlotEntry {
                        slot_index: r.i32()?,
                        item_id: r.i32()?,
                        quantity: r.i32()?,
                    });
                }
                Message::InventoryUpdate { slots }
            }
            PacketType::ItemUse => Message::ItemUse {
                slot_index: r.i32()?,
            },
            PacketType::ItemMove => Message::ItemMove {
                from_slot: r.i32()?,
                to_slot: r.i32()?,
            },
        };
        Ok(message)
    }
}

fn put_vec3(buf: &mut BytesMut, v: &Vec3) {
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
    buf.put_f32_le(v.z);
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_i32_le(s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

/// Bounds-checked cursor over a payload.
struct PayloadReader<'a> {
    kind: PacketType,
    buf: &'a [u8],
}

impl PayloadReader<'_> {
    fn malformed(&self, reason: &'static str) -> DecodeError {
        DecodeError::Malformed {
            kind: self.kind,
            reason,
        }
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        if self.buf.remaining() < 4 {
            return Err(self.malformed("payload too short"));
        }
        Ok(self.buf.get_i32_le())
    }

    fn f32(&mut self) -> Result<f32, DecodeError> {
        if self.buf.remaining() < 4 {
            return Err(self.malformed("payload too short"));
        }
        Ok(self.buf.get_f32_le())
    }

    fn vec3(&mut self) -> Result<Vec3, DecodeError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn len_prefix(&mut self) -> Result<usize, DecodeError> {
        let len = self.i32()?;
        usize::try_from(len).map_err(|_| self.malformed("negative length"))
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.len_prefix()?;
        if len > self.buf.remaining() {
            return Err(self.malformed("string length exceeds payload"));
        }
        let (head, tail) = self.buf.split_at(len);
        let s = std::str::from_utf8(head).map_err(|_| DecodeError::InvalidUtf8(self.kind))?;
        self.buf = tail;
        Ok(s.to_owned())
    }
}
