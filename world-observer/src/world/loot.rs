//! Loot instances: single item occurrences tracked in the world's loot table.

use glam::Vec3;

use crate::loot_db::LootDatabase;
use crate::util::csharp_string_hash;

/// Sentinel owner of a loot instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Not contained in any observer's inventory.
    World,
    /// Owner has been detached from its previous parent (e.g. mid-move) and
    /// must be resolved lazily by walking ancestors.
    Invalid,
    /// Owned by the observer with this channel id.
    Channel(u8),
}

impl Owner {
    pub const WORLD_SENTINEL: i32 = -1;
    pub const INVALID_SENTINEL: i32 = -2;

    pub fn as_i32(self) -> i32 {
        match self {
            Owner::World => Self::WORLD_SENTINEL,
            Owner::Invalid => Self::INVALID_SENTINEL,
            Owner::Channel(cid) => cid as i32,
        }
    }
}

/// The two slot ids whose contents are inaccessible to inspection; the
/// second only applies when the root owner is a human observer, not a scav.
pub const SECURED_CONTAINER_SLOT: &str = "SecuredContainer";
pub const SCABBARD_SLOT: &str = "Scabbard";

/// A single item occurrence in the world or in an observer's inventory.
#[derive(Debug, Clone)]
pub struct LootInstance {
    pub id: String,
    pub parent_id: String,
    pub csharp_hash: i32,
    pub owner: Owner,
    pub template_id: String,
    pub position: Vec3,
    pub stack_count: i32,
    pub highlighted: bool,
    /// Set when this instance was placed directly inside a `SecuredContainer`
    /// slot, or a `Scabbard` slot on a human-owned tree. Ancestor inaccessibility
    /// is a separate, tree-wide computation (see [`super::Map::is_accessible`]).
    pub inaccessible: bool,
}

impl LootInstance {
    pub fn new(id: String, parent_id: String, owner: Owner, template_id: String, position: Vec3, stack_count: i32) -> Self {
        let csharp_hash = csharp_string_hash(&id);
        Self {
            id,
            parent_id,
            csharp_hash,
            owner,
            template_id,
            position,
            stack_count,
            highlighted: false,
            inaccessible: false,
        }
    }

    /// Total credit value: `template.price * stack_count`.
    pub fn value(&self, db: &LootDatabase) -> Option<f64> {
        let template = db.query_template(&self.template_id)?;
        Some(template.credit_price as f64 * self.stack_count as f64)
    }

    /// Value per occupied grid slot: `value / (template.width * template.height)`.
    pub fn value_per_slot(&self, db: &LootDatabase) -> Option<f64> {
        let template = db.query_template(&self.template_id)?;
        let slots = (template.grid_width as f64) * (template.grid_height as f64);
        if slots <= 0.0 {
            return None;
        }
        Some(self.value(db)? / slots)
    }
}
