//! Tagged polymorphic descriptor parser.
//!
//! A one-byte tag selects one of ~35 concrete variants; tag values are
//! non-contiguous and must match the source table exactly (see the
//! `Polymorph::Type` enum they were lifted from). Every variant composes
//! primitive reads (via the 7-bit string convention, §4.4.1) and, where the
//! variant is itself recursive, further polymorph reads.

pub mod item;
pub mod operation;
pub mod spawn;

use std::io::Read;

use glam::Vec3;
use thiserror::Error;

use crate::util::io::ReadExt;

pub use item::{GridDescriptor, ItemDescriptor, ItemInGridDescriptor, LocationInGrid, SlotDescriptor, StackSlotDescriptor};
pub use operation::*;
pub use spawn::{ClassTransformSync, JsonCorpseDescriptor, JsonLootItemDescriptor};

#[derive(Debug, Error)]
pub enum PolymorphError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unknown polymorph tag {0}")]
    UnknownTag(u8),
}

#[derive(Debug, Clone, Copy)]
pub struct MapMarker {
    pub kind: i32,
    pub x: i32,
    pub y: i32,
}

impl MapMarker {
    fn read<R: Read>(r: &mut R) -> Result<(Self, String), PolymorphError> {
        let kind = r.read_i32()?;
        let x = r.read_i32()?;
        let y = r.read_i32()?;
        let note = r.read_string_7bit()?;
        Ok((Self { kind, x, y }, note))
    }
}

/// One of the ~35 tagged descriptor variants. Component descriptors (tags
/// 13-27) are embedded directly as item components; address descriptors
/// (32-36) describe where an item lives; operation descriptors (39-65)
/// describe a single inventory mutation.
#[derive(Debug, Clone)]
pub enum Polymorph {
    FoodDrinkComponent { hp_percent: f32 },
    ResourceItemComponent { resource: f32 },
    LightComponent { active: bool, mode: i32 },
    LockableComponent { locked: bool },
    MapComponent { markers: Vec<(MapMarker, String)> },
    MedKitComponent { hp: f32 },
    RepairableComponent { durability: f32, max_durability: f32 },
    SightComponent { sight_mode: i32 },
    TogglableComponent { on: bool },
    FaceShieldComponent { hits: u8, hit_seed: u8 },
    FoldableComponent { folded: bool },
    FireModeComponent { fire_mode: i32 },
    DogTagComponent {
        name: String,
        side: i32,
        level: i32,
        time: f64,
        status: String,
        killer_name: String,
        weapon_name: String,
    },
    TagComponent { name: String, colour: i32 },
    KeyComponent { uses: i32 },
    JsonLootItem(Box<JsonLootItemDescriptor>),
    JsonCorpse(Box<JsonCorpseDescriptor>),
    InventorySlotItemAddress(InventorySlotItemAddressDescriptor),
    InventoryStackSlotItemAddress(InventoryStackSlotItemAddressDescriptor),
    InventoryContainer(InventoryContainerDescriptor),
    InventoryGridItemAddress(InventoryGridItemAddressDescriptor),
    InventoryOwnerItself(InventoryOwnerItselfDescriptor),
    InventoryRemoveOperation(InventoryRemoveOperationDescriptor),
    InventoryExamineOperation(InventoryExamineOperationDescriptor),
    InventoryCheckMagazineOperation(InventoryCheckMagazineOperationDescriptor),
    InventoryBindItemOperation(InventoryBindItemOperationDescriptor),
    InventoryMoveOperation {
        item_id: String,
        from: Box<Polymorph>,
        to: Box<Polymorph>,
        operation_id: u16,
    },
    InventorySplitOperation {
        item_id: String,
        from: Box<Polymorph>,
        to: Box<Polymorph>,
        count: i32,
        operation_id: u16,
    },
    InventoryMergeOperation(InventoryMergeOperationDescriptor),
    InventoryTransferOperation(InventoryTransferOperationDescriptor),
    InventorySwapOperation {
        item_id: String,
        to: Box<Polymorph>,
        item1_id: String,
        to1: Box<Polymorph>,
        operation_id: u16,
    },
    InventoryThrowOperation(InventoryThrowOperationDescriptor),
    InventoryToggleOperation(InventoryToggleOperationDescriptor),
    InventoryFoldOperation(InventoryFoldOperationDescriptor),
    InventoryShotOperation(InventoryShotOperationDescriptor),
    SetupItemOperation(SetupItemOperationDescriptor),
    ApplyHealthOperation(ApplyHealthOperationDescriptor),
    OperateStationaryWeaponOperation(OperateStationaryWeaponOperationDescriptor),
}

impl Polymorph {
    /// The operation id carried by every inventory operation variant, used
    /// to match the TLV-layer acknowledgment trailer to the operation it
    /// confirms. `None` for component and address variants.
    pub fn operation_id(&self) -> Option<u16> {
        use Polymorph::*;
        match self {
            InventoryRemoveOperation(d) => Some(d.operation_id),
            InventoryExamineOperation(d) => Some(d.operation_id),
            InventoryCheckMagazineOperation(d) => Some(d.operation_id),
            InventoryBindItemOperation(d) => Some(d.operation_id),
            InventoryMoveOperation { operation_id, .. } => Some(*operation_id),
            InventorySplitOperation { operation_id, .. } => Some(*operation_id),
            InventoryMergeOperation(d) => Some(d.operation_id),
            InventoryTransferOperation(d) => Some(d.operation_id),
            InventorySwapOperation { operation_id, .. } => Some(*operation_id),
            InventoryThrowOperation(d) => Some(d.operation_id),
            InventoryToggleOperation(d) => Some(d.operation_id),
            InventoryFoldOperation(d) => Some(d.operation_id),
            InventoryShotOperation(d) => Some(d.operation_id),
            SetupItemOperation(d) => Some(d.operation_id),
            ApplyHealthOperation(d) => Some(d.operation_id),
            OperateStationaryWeaponOperation(d) => Some(d.operation_id),
            _ => None,
        }
    }

    /// The parent container id of an address descriptor (one of the four
    /// `Inventory*ItemAddress`/`InventoryOwnerItself` variants). Used by the
    /// move/split/swap handlers to reparent a loot instance.
    pub fn address_parent_id(&self) -> Option<&str> {
        use Polymorph::*;
        match self {
            InventorySlotItemAddress(d) => Some(d.container.parent_id.as_str()),
            InventoryStackSlotItemAddress(d) => Some(d.container.parent_id.as_str()),
            InventoryGridItemAddress(d) => Some(d.container.parent_id.as_str()),
            InventoryOwnerItself(d) => Some(d.container.parent_id.as_str()),
            _ => None,
        }
    }
}

const TAG_FOOD_DRINK_COMPONENT: u8 = 13;
const TAG_RESOURCE_ITEM_COMPONENT: u8 = 14;
const TAG_LIGHT_COMPONENT: u8 = 15;
const TAG_LOCKABLE_COMPONENT: u8 = 16;
const TAG_MAP_COMPONENT: u8 = 17;
const TAG_MEDKIT_COMPONENT: u8 = 18;
const TAG_REPAIRABLE_COMPONENT: u8 = 19;
const TAG_SIGHT_COMPONENT: u8 = 20;
const TAG_TOGGLABLE_COMPONENT: u8 = 21;
const TAG_FACE_SHIELD_COMPONENT: u8 = 22;
const TAG_FOLDABLE_COMPONENT: u8 = 23;
const TAG_FIRE_MODE_COMPONENT: u8 = 24;
const TAG_DOG_TAG_COMPONENT: u8 = 25;
const TAG_TAG_COMPONENT: u8 = 26;
const TAG_KEY_COMPONENT: u8 = 27;
const TAG_JSON_LOOT_ITEM: u8 = 28;
const TAG_JSON_CORPSE: u8 = 29;
const TAG_SLOT_ITEM_ADDRESS: u8 = 32;
const TAG_STACK_SLOT_ITEM_ADDRESS: u8 = 33;
const TAG_CONTAINER: u8 = 34;
const TAG_GRID_ITEM_ADDRESS: u8 = 35;
const TAG_OWNER_ITSELF: u8 = 36;
const TAG_REMOVE_OPERATION: u8 = 39;
const TAG_EXAMINE_OPERATION: u8 = 40;
const TAG_CHECK_MAGAZINE_OPERATION: u8 = 41;
const TAG_BIND_ITEM_OPERATION: u8 = 42;
const TAG_MOVE_OPERATION: u8 = 45;
const TAG_SPLIT_OPERATION: u8 = 47;
const TAG_MERGE_OPERATION: u8 = 48;
const TAG_TRANSFER_OPERATION: u8 = 49;
const TAG_SWAP_OPERATION: u8 = 50;
const TAG_THROW_OPERATION: u8 = 51;
const TAG_TOGGLE_OPERATION: u8 = 52;
const TAG_FOLD_OPERATION: u8 = 53;
const TAG_SHOT_OPERATION: u8 = 54;
const TAG_SETUP_ITEM_OPERATION: u8 = 55;
const TAG_APPLY_HEALTH_OPERATION: u8 = 57;
const TAG_OPERATE_STATIONARY_WEAPON_OPERATION: u8 = 65;

/// Read one tagged polymorph. An unknown tag is a fatal parse error: it
/// indicates the sub-message stream has desynchronized and nothing after
/// it can be trusted.
pub fn read_polymorph<R: Read>(r: &mut R) -> Result<Polymorph, PolymorphError> {
    let tag = r.read_u8()?;
    Ok(match tag {
        TAG_FOOD_DRINK_COMPONENT => Polymorph::FoodDrinkComponent { hp_percent: r.read_f32()? },
        TAG_RESOURCE_ITEM_COMPONENT => Polymorph::ResourceItemComponent { resource: r.read_f32()? },
        TAG_LIGHT_COMPONENT => Polymorph::LightComponent { active: r.read_bool()?, mode: r.read_i32()? },
        TAG_LOCKABLE_COMPONENT => Polymorph::LockableComponent { locked: r.read_bool()? },
        TAG_MAP_COMPONENT => {
            let count = r.read_i32()?;
            let mut markers = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                markers.push(MapMarker::read(r)?);
            }
            Polymorph::MapComponent { markers }
        }
        TAG_MEDKIT_COMPONENT => Polymorph::MedKitComponent { hp: r.read_f32()? },
        TAG_REPAIRABLE_COMPONENT => Polymorph::RepairableComponent {
            durability: r.read_f32()?,
            max_durability: r.read_f32()?,
        },
        TAG_SIGHT_COMPONENT => Polymorph::SightComponent { sight_mode: r.read_i32()? },
        TAG_TOGGLABLE_COMPONENT => Polymorph::TogglableComponent { on: r.read_bool()? },
        TAG_FACE_SHIELD_COMPONENT => Polymorph::FaceShieldComponent { hits: r.read_u8()?, hit_seed: r.read_u8()? },
        TAG_FOLDABLE_COMPONENT => Polymorph::FoldableComponent { folded: r.read_bool()? },
        TAG_FIRE_MODE_COMPONENT => Polymorph::FireModeComponent { fire_mode: r.read_i32()? },
        TAG_DOG_TAG_COMPONENT => Polymorph::DogTagComponent {
            name: r.read_string_7bit()?,
            side: r.read_i32()?,
            level: r.read_i32()?,
            time: {
                let mut buf = [0u8; 8];
                r.read_exact(&mut buf)?;
                f64::from_le_bytes(buf)
            },
            status: r.read_string_7bit()?,
            killer_name: r.read_string_7bit()?,
            weapon_name: r.read_string_7bit()?,
        },
        TAG_TAG_COMPONENT => Polymorph::TagComponent { name: r.read_string_7bit()?, colour: r.read_i32()? },
        TAG_KEY_COMPONENT => Polymorph::KeyComponent { uses: r.read_i32()? },
        TAG_JSON_LOOT_ITEM => Polymorph::JsonLootItem(Box::new(JsonLootItemDescriptor::read(r)?)),
        TAG_JSON_CORPSE => Polymorph::JsonCorpse(Box::new(JsonCorpseDescriptor::read(r)?)),
        TAG_SLOT_ITEM_ADDRESS => Polymorph::InventorySlotItemAddress(InventorySlotItemAddressDescriptor::read(r)?),
        TAG_STACK_SLOT_ITEM_ADDRESS => Polymorph::InventoryStackSlotItemAddress(InventoryStackSlotItemAddressDescriptor::read(r)?),
        TAG_CONTAINER => Polymorph::InventoryContainer(InventoryContainerDescriptor::read(r)?),
        TAG_GRID_ITEM_ADDRESS => Polymorph::InventoryGridItemAddress(InventoryGridItemAddressDescriptor::read(r)?),
        TAG_OWNER_ITSELF => Polymorph::InventoryOwnerItself(InventoryOwnerItselfDescriptor::read(r)?),
        TAG_REMOVE_OPERATION => Polymorph::InventoryRemoveOperation(InventoryRemoveOperationDescriptor::read(r)?),
        TAG_EXAMINE_OPERATION => Polymorph::InventoryExamineOperation(InventoryExamineOperationDescriptor::read(r)?),
        TAG_CHECK_MAGAZINE_OPERATION => Polymorph::InventoryCheckMagazineOperation(InventoryCheckMagazineOperationDescriptor::read(r)?),
        TAG_BIND_ITEM_OPERATION => Polymorph::InventoryBindItemOperation(InventoryBindItemOperationDescriptor::read(r)?),
        TAG_MOVE_OPERATION => {
            let item_id = r.read_string_7bit()?;
            let from = Box::new(read_polymorph(r)?);
            let to = Box::new(read_polymorph(r)?);
            let operation_id = r.read_u16()?;
            Polymorph::InventoryMoveOperation { item_id, from, to, operation_id }
        }
        TAG_SPLIT_OPERATION => {
            let item_id = r.read_string_7bit()?;
            let from = Box::new(read_polymorph(r)?);
            let to = Box::new(read_polymorph(r)?);
            let count = r.read_i32()?;
            let operation_id = r.read_u16()?;
            Polymorph::InventorySplitOperation { item_id, from, to, count, operation_id }
        }
        TAG_MERGE_OPERATION => Polymorph::InventoryMergeOperation(InventoryMergeOperationDescriptor::read(r)?),
        TAG_TRANSFER_OPERATION => Polymorph::InventoryTransferOperation(InventoryTransferOperationDescriptor::read(r)?),
        TAG_SWAP_OPERATION => {
            let item_id = r.read_string_7bit()?;
            let to = Box::new(read_polymorph(r)?);
            let item1_id = r.read_string_7bit()?;
            let to1 = Box::new(read_polymorph(r)?);
            let operation_id = r.read_u16()?;
            Polymorph::InventorySwapOperation { item_id, to, item1_id, to1, operation_id }
        }
        TAG_THROW_OPERATION => Polymorph::InventoryThrowOperation(InventoryThrowOperationDescriptor::read(r)?),
        TAG_TOGGLE_OPERATION => Polymorph::InventoryToggleOperation(InventoryToggleOperationDescriptor::read(r)?),
        TAG_FOLD_OPERATION => Polymorph::InventoryFoldOperation(InventoryFoldOperationDescriptor::read(r)?),
        TAG_SHOT_OPERATION => Polymorph::InventoryShotOperation(InventoryShotOperationDescriptor::read(r)?),
        TAG_SETUP_ITEM_OPERATION => Polymorph::SetupItemOperation(SetupItemOperationDescriptor::read(r)?),
        TAG_APPLY_HEALTH_OPERATION => Polymorph::ApplyHealthOperation(ApplyHealthOperationDescriptor::read(r)?),
        TAG_OPERATE_STATIONARY_WEAPON_OPERATION => Polymorph::OperateStationaryWeaponOperation(OperateStationaryWeaponOperationDescriptor::read(r)?),
        other => return Err(PolymorphError::UnknownTag(other)),
    })
}

/// Read a length-prefixed array of polymorphs, as carried by a `SubworldSpawn`
/// blob after zlib decompression.
pub fn read_polymorphs<R: Read>(r: &mut R) -> Result<Vec<Polymorph>, PolymorphError> {
    let count = r.read_i32()?;
    let mut out = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        out.push(read_polymorph(r)?);
    }
    Ok(out)
}

/// One loot instance emitted from an [`ItemDescriptor`] tree, ready for
/// insertion into the world's loot table.
#[derive(Debug, Clone)]
pub struct EmittedLoot {
    pub id: String,
    pub parent_id: String,
    pub template_id: String,
    pub stack_count: i32,
    /// Set when this instance sits directly inside a `SecuredContainer`
    /// slot, or a `Scabbard` slot whose tree root is a human observer.
    pub inaccessible: bool,
}

/// Post-order traversal of an item tree: itself first, then each grid item,
/// then each slot's contained item, then each stack slot's items. Positions
/// are left to the caller (world loot uses the spawn's own position; nested
/// items inherit their container's).
pub fn emit_loot_tree(item: &ItemDescriptor, parent_id: &str, human_owner: bool, out: &mut Vec<EmittedLoot>) {
    out.push(EmittedLoot {
        id: item.id.clone(),
        parent_id: parent_id.to_string(),
        template_id: item.template_id.clone(),
        stack_count: item.stack_count,
        inaccessible: false,
    });

    for grid in &item.grids {
        for entry in &grid.items {
            emit_loot_tree(&entry.item, &item.id, human_owner, out);
        }
    }

    for slot in &item.slots {
        let inaccessible = crate::world::Map::slot_marks_inaccessible(&slot.id, human_owner);
        let start = out.len();
        emit_loot_tree(&slot.contained_item, &item.id, human_owner, out);
        if inaccessible {
            if let Some(entry) = out.get_mut(start) {
                entry.inaccessible = true;
            }
        }
    }

    for stack_slot in &item.stack_slots {
        for child in &stack_slot.items {
            emit_loot_tree(child, &item.id, human_owner, out);
        }
    }
}

/// Position used for a nested loot instance: always the parent's position,
/// since only the tree root carries an explicit world position.
pub fn root_position(descriptor_position: Vec3) -> Vec3 {
    descriptor_position
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::io::WriteExt;
    use std::io::Cursor;

    #[test]
    fn unknown_tag_is_fatal() {
        let buf = vec![200u8];
        let mut cur = Cursor::new(buf);
        let err = read_polymorph(&mut cur).unwrap_err();
        assert!(matches!(err, PolymorphError::UnknownTag(200)));
    }

    #[test]
    fn food_drink_component_reads_single_float() {
        let mut buf = vec![TAG_FOOD_DRINK_COMPONENT];
        buf.write_f32(0.5).unwrap();
        let mut cur = Cursor::new(buf);
        match read_polymorph(&mut cur).unwrap() {
            Polymorph::FoodDrinkComponent { hp_percent } => assert_eq!(hp_percent, 0.5),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn throw_operation_exposes_operation_id() {
        let mut buf = vec![TAG_THROW_OPERATION];
        buf.write_string_7bit("item1").unwrap();
        buf.write_u16(77).unwrap();
        let mut cur = Cursor::new(buf);
        let poly = read_polymorph(&mut cur).unwrap();
        assert_eq!(poly.operation_id(), Some(77));
    }

    #[test]
    fn owner_itself_exposes_parent_id() {
        let mut buf = vec![TAG_OWNER_ITSELF];
        buf.write_string_7bit("P1").unwrap();
        buf.write_string_7bit("main").unwrap();
        let mut cur = Cursor::new(buf);
        let poly = read_polymorph(&mut cur).unwrap();
        assert_eq!(poly.address_parent_id(), Some("P1"));
    }

    #[test]
    fn emit_loot_tree_walks_grids_slots_and_stack_slots_in_order() {
        let root = ItemDescriptor {
            id: "root".into(),
            template_id: "T".into(),
            stack_count: 1,
            spawned_in_session: false,
            components: vec![],
            slots: vec![],
            grids: vec![],
            stack_slots: vec![],
        };
        let mut out = Vec::new();
        emit_loot_tree(&root, "", false, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "root");
        assert!(out[0].parent_id.is_empty());
    }
}
