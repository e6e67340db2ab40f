//! The recursive item/slot/grid/stack-slot descriptor family, shared by
//! equipment inventories, world loot spawns, and corpse loot spawns.

use std::io::{self, Read};

use crate::util::io::ReadExt;

use super::{read_polymorph, Polymorph, PolymorphError};

/// A single item occurrence, recursively nested through its slots, grids,
/// and stack slots.
#[derive(Debug, Clone)]
pub struct ItemDescriptor {
    pub id: String,
    pub template_id: String,
    pub stack_count: i32,
    pub spawned_in_session: bool,
    pub components: Vec<Polymorph>,
    pub slots: Vec<SlotDescriptor>,
    pub grids: Vec<GridDescriptor>,
    pub stack_slots: Vec<StackSlotDescriptor>,
}

impl ItemDescriptor {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let id = r.read_string_7bit()?;
        let template_id = r.read_string_7bit()?;
        let stack_count = r.read_i32()?;
        let spawned_in_session = r.read_bool()?;

        let component_count = r.read_i32()?;
        let mut components = Vec::with_capacity(component_count.max(0) as usize);
        for _ in 0..component_count {
            components.push(read_polymorph(r)?);
        }

        let slot_count = r.read_i32()?;
        let mut slots = Vec::with_capacity(slot_count.max(0) as usize);
        for _ in 0..slot_count {
            slots.push(SlotDescriptor::read(r)?);
        }

        let grid_count = r.read_i32()?;
        let mut grids = Vec::with_capacity(grid_count.max(0) as usize);
        for _ in 0..grid_count {
            grids.push(GridDescriptor::read(r)?);
        }

        let stack_slot_count = r.read_i32()?;
        let mut stack_slots = Vec::with_capacity(stack_slot_count.max(0) as usize);
        for _ in 0..stack_slot_count {
            stack_slots.push(StackSlotDescriptor::read(r)?);
        }

        Ok(Self { id, template_id, stack_count, spawned_in_session, components, slots, grids, stack_slots })
    }
}

#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    pub id: String,
    pub contained_item: Box<ItemDescriptor>,
}

impl SlotDescriptor {
    fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let id = r.read_string_7bit()?;
        let contained_item = Box::new(ItemDescriptor::read(r)?);
        Ok(Self { id, contained_item })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocationInGrid {
    pub x: i32,
    pub y: i32,
    pub rotation: i32,
    pub searched: bool,
}

impl LocationInGrid {
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            x: r.read_i32()?,
            y: r.read_i32()?,
            rotation: r.read_i32()?,
            searched: r.read_bool()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ItemInGridDescriptor {
    pub location: LocationInGrid,
    pub item: Box<ItemDescriptor>,
}

#[derive(Debug, Clone)]
pub struct GridDescriptor {
    pub id: String,
    pub items: Vec<ItemInGridDescriptor>,
}

impl GridDescriptor {
    fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let id = r.read_string_7bit()?;
        let count = r.read_i32()?;
        let mut items = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let location = LocationInGrid::read(r)?;
            let item = Box::new(ItemDescriptor::read(r)?);
            items.push(ItemInGridDescriptor { location, item });
        }
        Ok(Self { id, items })
    }
}

#[derive(Debug, Clone)]
pub struct StackSlotDescriptor {
    pub id: String,
    pub items: Vec<ItemDescriptor>,
}

impl StackSlotDescriptor {
    fn read<R: Read>(r: &mut R) -> Result<Self, PolymorphError> {
        let id = r.read_string_7bit()?;
        let count = r.read_i32()?;
        let mut items = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            items.push(ItemDescriptor::read(r)?);
        }
        Ok(Self { id, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::io::WriteExt;
    use std::io::Cursor;

    #[test]
    fn item_with_no_children_round_trips() {
        let mut buf = Vec::new();
        buf.write_string_7bit("item1").unwrap();
        buf.write_string_7bit("tpl").unwrap();
        buf.write_i32(3).unwrap();
        buf.write_bool(true).unwrap();
        buf.write_i32(0).unwrap(); // components
        buf.write_i32(0).unwrap(); // slots
        buf.write_i32(0).unwrap(); // grids
        buf.write_i32(0).unwrap(); // stack slots

        let mut cur = Cursor::new(buf);
        let item = ItemDescriptor::read(&mut cur).unwrap();
        assert_eq!(item.id, "item1");
        assert_eq!(item.stack_count, 3);
        assert!(item.spawned_in_session);
        assert!(item.slots.is_empty());
    }
}
