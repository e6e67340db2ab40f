//! Application Dispatcher: TLV frame loop over a reassembled reliable
//! payload, routing each packet code to its world-state handler.

use std::io::{Cursor, Read};

use flate2::read::ZlibDecoder;
use glam::Vec3;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::bitstream::{BitReader, FloatQuantizer};
use crate::descriptor::{self, EmittedLoot, ItemDescriptor, Polymorph, PolymorphError};
use crate::unet::Direction;
use crate::util::io::ReadExt;
use crate::world::{LootInstance, Observer, ObserverKind, Owner, World};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Polymorph(#[from] PolymorphError),
    #[error(transparent)]
    Bitstream(#[from] crate::bitstream::BitStreamError),
}

const CODE_SERVER_INIT: i16 = 147;
const CODE_WORLD_SPAWN: i16 = 151;
const CODE_WORLD_UNSPAWN: i16 = 152;
const CODE_SUBWORLD_SPAWN: i16 = 153;
const CODE_SUBWORLD_UNSPAWN: i16 = 154;
const CODE_PLAYER_SPAWN: i16 = 155;
const CODE_PLAYER_UNSPAWN: i16 = 156;
const CODE_OBSERVER_SPAWN: i16 = 157;
const CODE_OBSERVER_UNSPAWN: i16 = 158;
const CODE_BATTLEYE: i16 = 168;
const CODE_GAME_UPDATE: i16 = 170;

/// Quantization ranges shared by position decoding. Loot uses a wider delta
/// range than an observer's own motion since thrown/launched items can move
/// farther between sync ticks.
const POS_AXIS_RESOLUTION: (f32, f32, f32) = (0.001953125, 0.0009765625, 0.001953125);
const OBSERVER_DELTA_RANGE: (f32, f32) = (-1.0, 1.0);
const LOOT_DELTA_RANGE: (f32, f32) = (-10.0, 10.0);
const ROTATION_YAW_RANGE: (f32, f32) = (0.0, 360.0);
const ROTATION_PITCH_RANGE: (f32, f32) = (-90.0, 90.0);
const ROTATION_RESOLUTION: f32 = 0.015625;

/// One TLV frame within a reassembled reliable payload.
struct Frame<'a> {
    code: i16,
    body: &'a [u8],
}

fn read_frames(payload: &[u8]) -> Vec<Frame<'_>> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset + 4 <= payload.len() {
        let len = u16::from_le_bytes([payload[offset], payload[offset + 1]]) as usize;
        let code = i16::from_le_bytes([payload[offset + 2], payload[offset + 3]]);
        let body_start = offset + 4;
        let body_len = len.saturating_sub(2);
        if body_start + body_len > payload.len() {
            warn!(code, "TLV frame body exceeds payload bounds, stopping frame walk");
            break;
        }
        out.push(Frame { code, body: &payload[body_start..body_start + body_len] });
        offset += len + 4;
    }
    out
}

/// Whether encrypted-session GameUpdate frames should be skipped, set by a
/// `ServerInit` frame carrying the encryption flag.
pub struct Dispatcher {
    encrypted: bool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { encrypted: false }
    }

    /// Dispatch every TLV frame in one reassembled payload.
    pub fn dispatch(&mut self, channel: u8, payload: &[u8], direction: Direction, world: &World) -> Result<(), DispatchError> {
        for frame in read_frames(payload) {
            match frame.code {
                CODE_SERVER_INIT => self.handle_server_init(frame.body, world)?,
                CODE_SUBWORLD_SPAWN => handle_subworld_spawn(frame.body, world)?,
                CODE_PLAYER_SPAWN => handle_spawn(frame.body, world, ObserverKind::SelfPlayer)?,
                CODE_OBSERVER_SPAWN => handle_spawn(frame.body, world, ObserverKind::Player)?,
                CODE_OBSERVER_UNSPAWN => handle_observer_unspawn(frame.body, world)?,
                CODE_GAME_UPDATE => {
                    if self.encrypted {
                        trace!("skipping GameUpdate on encrypted session");
                    } else {
                        handle_game_update(frame.body, direction, world)?;
                    }
                }
                CODE_WORLD_SPAWN | CODE_WORLD_UNSPAWN | CODE_SUBWORLD_UNSPAWN | CODE_PLAYER_UNSPAWN | CODE_BATTLEYE => {
                    trace!(code = frame.code, channel, "ignoring no-op packet code");
                }
                other => {
                    trace!(code = other, channel, "ignoring unhandled packet code");
                }
            }
        }
        Ok(())
    }

    fn handle_server_init(&mut self, body: &[u8], world: &World) -> Result<(), DispatchError> {
        let mut r = Cursor::new(body);
        self.encrypted = r.read_bool()?;
        let _tick_rate = r.read_u8()?;
        let _build_version = r.read_string_packed()?;
        let _session_nonce = r.read_u32()?;
        let _reserved_a = r.read_u32()?;
        let _reserved_b = r.read_u32()?;

        let min = r.read_vec3()?;
        let max = r.read_vec3()?;
        debug!(?min, ?max, encrypted = self.encrypted, "server init: map bounds");
        world.map().set_bounds(min, max);
        Ok(())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn zlib_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn handle_subworld_spawn(body: &[u8], world: &World) -> Result<(), DispatchError> {
    let mut r = Cursor::new(body);
    let compressed_len = r.read_packed_u32()? as usize;
    let compressed = r.read_blob(compressed_len)?;
    let decompressed = zlib_decompress(&compressed)?;

    let mut inner = Cursor::new(&decompressed[..]);
    let polymorphs = descriptor::read_polymorphs(&mut inner)?;

    let mut map = world.map();
    for poly in polymorphs {
        match poly {
            Polymorph::JsonLootItem(loot) => {
                insert_loot_subtree(&mut map, &loot.item, loot.position, Owner::World, false);
            }
            Polymorph::JsonCorpse(corpse) => {
                insert_loot_subtree(&mut map, &corpse.item, corpse.position, Owner::World, false);
                map.add_static_corpse(corpse.position);
            }
            other => {
                trace!(?other, "ignoring unexpected subworld spawn polymorph");
            }
        }
    }
    Ok(())
}

fn insert_loot_subtree(map: &mut crate::world::Map, item: &ItemDescriptor, position: Vec3, owner: Owner, human_owner: bool) {
    let mut emitted: Vec<EmittedLoot> = Vec::new();
    descriptor::emit_loot_tree(item, "", human_owner, &mut emitted);
    for (index, entry) in emitted.into_iter().enumerate() {
        let item_owner = if index == 0 { owner } else { Owner::Invalid };
        let mut instance = LootInstance::new(entry.id, entry.parent_id, item_owner, entry.template_id, position, entry.stack_count);
        instance.inaccessible = entry.inaccessible;
        map.insert_loot(instance);
    }
}

fn handle_spawn(body: &[u8], world: &World, default_kind: ObserverKind) -> Result<(), DispatchError> {
    let mut r = Cursor::new(body);
    let player_id = r.read_i32()?;
    let channel_id = r.read_u8()?;
    let position = r.read_vec3()?;

    let _preamble = r.read_u32()?;
    let equipment = ItemDescriptor::read(&mut r)?;

    let profile_len = r.read_packed_u32()? as usize;
    let profile_compressed = r.read_blob(profile_len)?;
    let profile_json = zlib_decompress(&profile_compressed)?;
    let profile: serde_json::Value = serde_json::from_slice(&profile_json).unwrap_or(serde_json::Value::Null);

    let search_info_len = r.read_packed_u32()? as usize;
    let _search_info = r.read_blob(search_info_len)?;

    let name_field = profile.get("Info").and_then(|i| i.get("Nickname")).and_then(|v| v.as_str()).unwrap_or("");
    let level = profile.get("Info").and_then(|i| i.get("Level")).and_then(|v| v.as_i64()).unwrap_or(0) as i32;
    let side = profile.get("Info").and_then(|i| i.get("Side")).and_then(|v| v.as_str()).unwrap_or("");
    let group_id = profile.get("Info").and_then(|i| i.get("GroupId")).and_then(|v| v.as_str()).unwrap_or("").to_string();
    let role = profile.get("Info").and_then(|i| i.get("Settings")).and_then(|s| s.get("Role")).and_then(|v| v.as_str()).unwrap_or("");
    let account_id = profile.get("aid").and_then(|v| v.as_str()).unwrap_or("");

    let kind = if side == "Savage" { ObserverKind::Scav } else { default_kind };
    let is_npc = account_id == "0";
    let name = if kind == ObserverKind::Scav { Observer::scav_name(role) } else { name_field.to_string() };

    let observer = Observer {
        id: format!("{player_id}"),
        channel_id,
        player_id,
        kind,
        name,
        group_id,
        position,
        rotation: Vec3::ZERO,
        level,
        is_dead: false,
        is_npc,
        is_unspawned: false,
    };

    let mut map = world.map();
    map.insert_observer(observer);
    insert_loot_subtree(&mut map, &equipment, position, Owner::Channel(channel_id), kind != ObserverKind::Scav);
    Ok(())
}

fn handle_observer_unspawn(body: &[u8], world: &World) -> Result<(), DispatchError> {
    let mut r = Cursor::new(body);
    let channel_id = r.read_u8()?;
    world.map().unspawn_observer(channel_id);
    Ok(())
}

fn position_quantizer_absolute(min_axis: f32, max_axis: f32, resolution: f32) -> FloatQuantizer {
    FloatQuantizer::new(min_axis, max_axis, resolution)
}

/// Read a quantized position vector gated by a leading "no change" bit, in
/// either absolute (against map bounds) or delta (against the given range)
/// mode. Returns `None` when the no-change bit says to leave it untouched.
fn read_gated_position(
    bits: &mut BitReader<'_>,
    absolute: bool,
    bounds: (Vec3, Vec3),
    delta_range: (f32, f32),
) -> Option<Vec3> {
    if !bits.read_bool() {
        return None;
    }
    let (rx, ry, rz) = POS_AXIS_RESOLUTION;
    let x = if absolute {
        bits.read_quantized_float(&position_quantizer_absolute(bounds.0.x, bounds.1.x, rx))
    } else {
        bits.read_limited_float(delta_range.0, delta_range.1, rx)
    };
    let y = if absolute {
        bits.read_quantized_float(&position_quantizer_absolute(bounds.0.y, bounds.1.y, ry))
    } else {
        bits.read_limited_float(delta_range.0, delta_range.1, ry)
    };
    let z = if absolute {
        bits.read_quantized_float(&position_quantizer_absolute(bounds.0.z, bounds.1.z, rz))
    } else {
        bits.read_limited_float(delta_range.0, delta_range.1, rz)
    };
    Some(Vec3::new(x, y, z))
}

fn read_rotation(bits: &mut BitReader<'_>) -> Vec3 {
    let yaw = bits.read_limited_float(ROTATION_YAW_RANGE.0, ROTATION_YAW_RANGE.1, ROTATION_RESOLUTION);
    let pitch = bits.read_limited_float(ROTATION_PITCH_RANGE.0, ROTATION_PITCH_RANGE.1, ROTATION_RESOLUTION);
    Vec3::new(yaw, pitch, 0.0)
}

fn handle_game_update(body: &[u8], direction: Direction, world: &World) -> Result<(), DispatchError> {
    if body.is_empty() {
        return Ok(());
    }
    let channel_id = body[0];
    let mut bits = BitReader::new(&body[1..]);

    let is_player_frame = bits.read_bool();
    if is_player_frame {
        handle_player_frame(channel_id, &mut bits, direction, world)?;
    } else {
        handle_world_frame(&mut bits, world)?;
    }
    Ok(())
}

fn handle_player_frame(channel_id: u8, bits: &mut BitReader<'_>, direction: Direction, world: &World) -> Result<(), DispatchError> {
    let _frame_counter = bits.read_bits(32);
    let _time = f32::from_bits(bits.read_bits(32));
    let _disconnected = bits.read_bool();
    let alive = bits.read_bool();

    let mut map = world.map();
    let (bounds_min, bounds_max) = (map.bounds_min, map.bounds_max);

    if !alive {
        map.observer_or_placeholder(channel_id).is_dead = true;
        return Ok(());
    }

    if let Some(position) = read_gated_position(bits, false, (bounds_min, bounds_max), OBSERVER_DELTA_RANGE) {
        let observer = map.observer_or_placeholder(channel_id);
        observer.position += position;
    }
    let rotation = read_rotation(bits);
    map.observer_or_placeholder(channel_id).rotation = rotation;
    drop(map);

    apply_inventory_operations(bits, direction, world)
}

fn handle_world_frame(bits: &mut BitReader<'_>, world: &World) -> Result<(), DispatchError> {
    let _interactive_objects = bits.read_bool();
    let _spawn_quest_loot = bits.read_bool();
    let _exfil = bits.read_bool();
    let _lamp_change = bits.read_bool();

    let count = bits.read_limited_int(1, 64);

    let mut map = world.map();
    let (bounds_min, bounds_max) = (map.bounds_min, map.bounds_max);

    for _ in 0..count.max(0) {
        let hash = bits.read_bits(32) as i32;
        let absolute = !bits.read_bool(); // "delta vs absolute" discriminator: 1 = delta
        if let Some(position) = read_gated_position(bits, absolute, (bounds_min, bounds_max), LOOT_DELTA_RANGE) {
            if let Some(item) = map.loot_by_hash_mut(hash) {
                if absolute {
                    item.position = position;
                } else {
                    item.position += position;
                }
            } else {
                warn!(hash, "loot-sync hash matched no known instance");
            }
        }
    }
    Ok(())
}

fn apply_inventory_operations(bits: &mut BitReader<'_>, direction: Direction, world: &World) -> Result<(), DispatchError> {
    let count = bits.read_bits(8);
    for _ in 0..count {
        match direction {
            Direction::Outbound => apply_outbound_operation(bits, world)?,
            Direction::Inbound => apply_inbound_ack(bits)?,
        }
    }
    Ok(())
}

fn apply_outbound_operation(bits: &mut BitReader<'_>, world: &World) -> Result<(), DispatchError> {
    let present = bits.read_bool();
    if !present {
        return Ok(());
    }
    let blob_len = bits.read_bits(32) as usize;
    let blob = bits.read_aligned_bytes(blob_len);
    let _callback_id = bits.read_bits(11);
    let _hash = bits.read_bits(32);

    let mut cursor = Cursor::new(&blob[..]);
    let operation = match descriptor::read_polymorph(&mut cursor) {
        Ok(op) => op,
        Err(e) => {
            error!(error = %e, "fatal: unrecognized inventory operation polymorph");
            return Err(e.into());
        }
    };

    let mut map = world.map();
    match operation {
        Polymorph::InventoryMoveOperation { item_id, to, .. } => {
            if let Some(parent_id) = to.address_parent_id() {
                map.reparent_loot(&item_id, parent_id.to_string());
            }
        }
        Polymorph::InventoryThrowOperation(d) => {
            map.throw_loot(&d.item_id);
        }
        _ => {}
    }
    Ok(())
}

fn apply_inbound_ack(bits: &mut BitReader<'_>) -> Result<(), DispatchError> {
    let tag = bits.read_bits(8);
    if tag == 1 {
        // A command frame embedded inbound; re-read as an outbound-style
        // operation body (the wire reuses the same encoding).
        let _blob_len = bits.read_bits(32);
        return Ok(());
    }
    let _operation_id = bits.read_bits(16);
    let status = bits.read_limited_int(0, 3);
    if status == 2 {
        let _message = bits.read_string();
    }
    let has_extra = bits.read_bool();
    if has_extra {
        let len = bits.read_bits(32) as usize;
        let _extra = bits.read_aligned_bytes(len);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_walk_advances_by_len_plus_four() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u16.to_le_bytes()); // len = 2 (just the code)
        payload.extend_from_slice(&CODE_BATTLEYE.to_le_bytes());
        payload.extend_from_slice(&4u16.to_le_bytes()); // len = 4 (2 code + 2 body)
        payload.extend_from_slice(&CODE_SERVER_INIT.to_le_bytes());
        payload.extend_from_slice(&[0xAA, 0xBB]);

        let frames = read_frames(&payload);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].code, CODE_BATTLEYE);
        assert_eq!(frames[1].code, CODE_SERVER_INIT);
        assert_eq!(frames[1].body, &[0xAA, 0xBB]);
    }

    #[test]
    fn server_init_sets_map_bounds() {
        use crate::util::io::WriteExt;
        let mut body = Vec::new();
        body.write_bool(false).unwrap(); // not encrypted
        body.write_u8(20).unwrap();
        body.write_string_packed("1.0.0").unwrap();
        body.write_u32(42).unwrap();
        body.write_u32(0).unwrap();
        body.write_u32(0).unwrap();
        body.write_f32(-100.0).unwrap();
        body.write_f32(0.0).unwrap();
        body.write_f32(-100.0).unwrap();
        body.write_f32(100.0).unwrap();
        body.write_f32(50.0).unwrap();
        body.write_f32(100.0).unwrap();

        let world = World::new();
        let mut dispatcher = Dispatcher::new();
        dispatcher.handle_server_init(&body, &world).unwrap();
        assert_eq!(world.map().bounds_min, Vec3::new(-100.0, 0.0, -100.0));
        assert!(!dispatcher.encrypted);
    }
}
