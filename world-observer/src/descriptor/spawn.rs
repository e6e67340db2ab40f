//! Top-level spawn wrappers: world loot and corpse loot, each carrying an
//! embedded [`ItemDescriptor`] tree plus placement metadata.

use std::collections::HashMap;
use std::io::Read;

use glam::{Quat, Vec3};

use crate::util::io::ReadExt;

use super::item::ItemDescriptor;
use super::PolymorphError;

fn read_optional_id<R: Read>(r: &mut R) -> Result<String, PolymorphError> {
    if r.read_bool()? {
        Ok(r.read_string_7bit()?)
    } else {
        Ok(String::new())
    }
}

fn read_optional_profiles<R: Read>(r: &mut R) -> Result<Vec<String>, PolymorphError> {
    if !r.read_bool()? {
        return Ok(Vec::new());
    }
    let count = r.read_i32()?;
    let mut profiles = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        profiles.push(r.read_string_7bit()?);
    }
    Ok(profiles)
}

/// World-loot spawn: an item dropped directly in the map, not inside a
/// corpse.
#[derive(Debug, Clone)]
pub struct JsonLootItemDescriptor {
    pub id: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub item: ItemDescriptor,
    pub profiles: Vec<String>,
    pub is_static: bool,
    pub use_gravity: bool,
    pub random_rotation: bool,
    pub shift: Vec3,
    pub platform_id: i16,
}

impl JsonLootItemDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let id = read_optional_id(r)?;
        let position = r.read_vec3()?;
        let rotation = r.read_vec3()?;
        let item = ItemDescriptor::read(r)?;
        let profiles = read_optional_profiles(r)?;
        let is_static = r.read_bool()?;
        let use_gravity = r.read_bool()?;
        let random_rotation = r.read_bool()?;
        let shift = r.read_vec3()?;
        let platform_id = r.read_i16()?;
        Ok(Self { id, position, rotation, item, profiles, is_static, use_gravity, random_rotation, shift, platform_id })
    }
}

/// A skeletal bone transform, used by [`JsonCorpseDescriptor::bones`].
#[derive(Debug, Clone, Copy)]
pub struct ClassTransformSync {
    pub position: Vec3,
    pub rotation: Quat,
}

impl ClassTransformSync {
    fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let position = r.read_vec3()?;
        let rotation = Quat::from_xyzw(r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?);
        Ok(Self { position, rotation })
    }
}

/// A dead player's loot tree, placed as a static corpse marker in addition
/// to carrying its own world-owned [`ItemDescriptor`] tree.
#[derive(Debug, Clone)]
pub struct JsonCorpseDescriptor {
    pub customization: HashMap<i32, String>,
    pub side: i32,
    pub bones: Vec<ClassTransformSync>,
    pub id: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub item: ItemDescriptor,
    pub profiles: Vec<String>,
    pub is_static: bool,
    pub use_gravity: bool,
    pub random_rotation: bool,
    pub shift: Vec3,
    pub platform_id: i16,
}

impl JsonCorpseDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let customization_count = r.read_i32()?;
        let mut customization = HashMap::with_capacity(customization_count.max(0) as usize);
        for _ in 0..customization_count {
            let key = r.read_i32()?;
            let value = r.read_string_7bit()?;
            customization.insert(key, value);
        }

        let side = r.read_i32()?;

        let bone_count = r.read_i32()?;
        let mut bones = Vec::with_capacity(bone_count.max(0) as usize);
        for _ in 0..bone_count {
            bones.push(ClassTransformSync::read(r)?);
        }

        let id = read_optional_id(r)?;
        let position = r.read_vec3()?;
        let rotation = r.read_vec3()?;
        let item = ItemDescriptor::read(r)?;
        let profiles = read_optional_profiles(r)?;
        let is_static = r.read_bool()?;
        let use_gravity = r.read_bool()?;
        let random_rotation = r.read_bool()?;
        let shift = r.read_vec3()?;
        let platform_id = r.read_i16()?;

        Ok(Self { customization, side, bones, id, position, rotation, item, profiles, is_static, use_gravity, random_rotation, shift, platform_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::io::WriteExt;
    use std::io::Cursor;

    fn write_empty_item(buf: &mut Vec<u8>) {
        buf.write_string_7bit("item").unwrap();
        buf.write_string_7bit("tpl").unwrap();
        buf.write_i32(1).unwrap();
        buf.write_bool(false).unwrap();
        buf.write_i32(0).unwrap();
        buf.write_i32(0).unwrap();
        buf.write_i32(0).unwrap();
        buf.write_i32(0).unwrap();
    }

    #[test]
    fn loot_item_with_no_id_and_no_profiles() {
        let mut buf = Vec::new();
        buf.write_bool(false).unwrap(); // no id
        buf.write_f32(1.0).unwrap();
        buf.write_f32(2.0).unwrap();
        buf.write_f32(3.0).unwrap();
        buf.write_f32(0.0).unwrap();
        buf.write_f32(0.0).unwrap();
        buf.write_f32(0.0).unwrap();
        write_empty_item(&mut buf);
        buf.write_bool(false).unwrap(); // no profiles
        buf.write_bool(true).unwrap();
        buf.write_bool(false).unwrap();
        buf.write_bool(false).unwrap();
        buf.write_f32(0.0).unwrap();
        buf.write_f32(0.0).unwrap();
        buf.write_f32(0.0).unwrap();
        buf.write_i16(-1).unwrap();

        let mut cur = Cursor::new(buf);
        let descriptor = JsonLootItemDescriptor::read(&mut cur).unwrap();
        assert!(descriptor.id.is_empty());
        assert_eq!(descriptor.position, Vec3::new(1.0, 2.0, 3.0));
        assert!(descriptor.is_static);
        assert!(descriptor.profiles.is_empty());
    }
}
