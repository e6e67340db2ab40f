//! In-world character records.

use glam::Vec3;

/// The kind of character an [`Observer`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    /// The locally-controlled player, spawned via `PlayerSpawn`.
    SelfPlayer,
    /// A human-controlled player other than the local one.
    Player,
    /// An NPC ("scav") side character.
    Scav,
}

/// An in-world entity tracked by its wire channel id.
#[derive(Debug, Clone)]
pub struct Observer {
    pub id: String,
    pub channel_id: u8,
    pub player_id: i32,
    pub kind: ObserverKind,
    pub name: String,
    pub group_id: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub level: i32,
    pub is_dead: bool,
    pub is_npc: bool,
    pub is_unspawned: bool,
}

impl Observer {
    /// Build the placeholder observer fabricated when a `GameUpdate` frame
    /// references a channel id with no known spawn record.
    pub fn placeholder(channel_id: u8) -> Self {
        Self {
            id: format!("placeholder-{channel_id}"),
            channel_id,
            player_id: -1,
            kind: ObserverKind::Player,
            name: "UNKNOWN?!".to_string(),
            group_id: String::new(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            level: 0,
            is_dead: false,
            is_npc: false,
            is_unspawned: false,
        }
    }

    /// `kind=Scav`'s display name is `"Scav"` concatenated directly with
    /// the role string, with no separator.
    pub fn scav_name(role: &str) -> String {
        format!("Scav{role}")
    }
}
