//! Inventory address descriptors (where an item lives) and inventory
//! operation descriptors (what changed), as carried by `GameUpdate`'s
//! outbound operation stream.

use std::io::Read;

use glam::{Quat, Vec3};

use crate::util::io::ReadExt;

use super::item::LocationInGrid;
use super::PolymorphError;

/// The parent container an address descriptor resolves to: a container id
/// nested under `parent_id` (an observer's equipment root, another item, or
/// a world container).
#[derive(Debug, Clone)]
pub struct InventoryContainerDescriptor {
    pub parent_id: String,
    pub container_id: String,
}

impl InventoryContainerDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self {
            parent_id: r.read_string_7bit()?,
            container_id: r.read_string_7bit()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct InventorySlotItemAddressDescriptor {
    pub container: InventoryContainerDescriptor,
}

#[derive(Debug, Clone)]
pub struct InventoryStackSlotItemAddressDescriptor {
    pub container: InventoryContainerDescriptor,
}

#[derive(Debug, Clone)]
pub struct InventoryGridItemAddressDescriptor {
    pub location_in_grid: LocationInGrid,
    pub container: InventoryContainerDescriptor,
}

#[derive(Debug, Clone)]
pub struct InventoryOwnerItselfDescriptor {
    pub container: InventoryContainerDescriptor,
}

impl InventoryGridItemAddressDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let location_in_grid = LocationInGrid::read(r)?;
        let container = InventoryContainerDescriptor::read(r)?;
        Ok(Self { location_in_grid, container })
    }
}

macro_rules! container_only_descriptor {
    ($name:ident) => {
        impl $name {
            pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
                Ok(Self { container: InventoryContainerDescriptor::read(r)? })
            }
        }
    };
}

container_only_descriptor!(InventorySlotItemAddressDescriptor);
container_only_descriptor!(InventoryStackSlotItemAddressDescriptor);
container_only_descriptor!(InventoryOwnerItselfDescriptor);

#[derive(Debug, Clone)]
pub struct InventoryRemoveOperationDescriptor {
    pub item_id: String,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryExamineOperationDescriptor {
    pub item_id: String,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryCheckMagazineOperationDescriptor {
    pub item_id: String,
    pub check_status: bool,
    pub skill_level: i32,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryBindItemOperationDescriptor {
    pub item_id: String,
    pub index: i32,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryMergeOperationDescriptor {
    pub item_id: String,
    pub item1_id: String,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryTransferOperationDescriptor {
    pub item_id: String,
    pub item1_id: String,
    pub count: i32,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryThrowOperationDescriptor {
    pub item_id: String,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryToggleOperationDescriptor {
    pub item_id: String,
    pub value: bool,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryFoldOperationDescriptor {
    pub item_id: String,
    pub value: bool,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct InventoryShotOperationDescriptor {
    pub item_id: String,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct SetupItemOperationDescriptor {
    pub item_id: String,
    pub zone_id: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub setup_time: f32,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct ApplyHealthOperationDescriptor {
    pub item_id: String,
    pub body_part: i32,
    pub count: i32,
    pub operation_id: u16,
}

#[derive(Debug, Clone)]
pub struct OperateStationaryWeaponOperationDescriptor {
    pub weapon_id: String,
    pub operation_id: u16,
}

impl InventoryRemoveOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self { item_id: r.read_string_7bit()?, operation_id: r.read_u16()? })
    }
}

impl InventoryExamineOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self { item_id: r.read_string_7bit()?, operation_id: r.read_u16()? })
    }
}

impl InventoryCheckMagazineOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self {
            item_id: r.read_string_7bit()?,
            check_status: r.read_bool()?,
            skill_level: r.read_i32()?,
            operation_id: r.read_u16()?,
        })
    }
}

impl InventoryBindItemOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self {
            item_id: r.read_string_7bit()?,
            index: r.read_i32()?,
            operation_id: r.read_u16()?,
        })
    }
}

impl InventoryMergeOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self {
            item_id: r.read_string_7bit()?,
            item1_id: r.read_string_7bit()?,
            operation_id: r.read_u16()?,
        })
    }
}

impl InventoryTransferOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self {
            item_id: r.read_string_7bit()?,
            item1_id: r.read_string_7bit()?,
            count: r.read_i32()?,
            operation_id: r.read_u16()?,
        })
    }
}

impl InventoryThrowOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self { item_id: r.read_string_7bit()?, operation_id: r.read_u16()? })
    }
}

impl InventoryToggleOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self {
            item_id: r.read_string_7bit()?,
            value: r.read_bool()?,
            operation_id: r.read_u16()?,
        })
    }
}

impl InventoryFoldOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self {
            item_id: r.read_string_7bit()?,
            value: r.read_bool()?,
            operation_id: r.read_u16()?,
        })
    }
}

impl InventoryShotOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self { item_id: r.read_string_7bit()?, operation_id: r.read_u16()? })
    }
}

impl SetupItemOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let item_id = r.read_string_7bit()?;
        let zone_id = r.read_string_7bit()?;
        let position = r.read_vec3()?;
        let rotation = Quat::from_xyzw(r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?);
        let setup_time = r.read_f32()?;
        let operation_id = r.read_u16()?;
        Ok(Self { item_id, zone_id, position, rotation, setup_time, operation_id })
    }
}

impl ApplyHealthOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self {
            item_id: r.read_string_7bit()?,
            body_part: r.read_i32()?,
            count: r.read_i32()?,
            operation_id: r.read_u16()?,
        })
    }
}

impl OperateStationaryWeaponOperationDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        Ok(Self { weapon_id: r.read_string_7bit()?, operation_id: r.read_u16()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::io::WriteExt;
    use std::io::Cursor;

    #[test]
    fn container_descriptor_reads_two_strings() {
        let mut buf = Vec::new();
        buf.write_string_7bit("parent").unwrap();
        buf.write_string_7bit("container").unwrap();
        let mut cur = Cursor::new(buf);
        let d = InventoryContainerDescriptor::read(&mut cur).unwrap();
        assert_eq!(d.parent_id, "parent");
        assert_eq!(d.container_id, "container");
    }
}
