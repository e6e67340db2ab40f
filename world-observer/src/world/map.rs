//! The world snapshot: map bounds, observers, loot, and static corpses.

use glam::Vec3;
use indexmap::IndexMap;

use super::loot::{LootInstance, Owner, SCABBARD_SLOT, SECURED_CONTAINER_SLOT};
use super::observer::{Observer, ObserverKind};

/// Axis-aligned world bounds, observer table, loot table, and static corpse
/// list. Created on `ServerInit`; all mutation happens through the methods
/// below so that invariants (parent pointers, hash index) stay consistent.
#[derive(Debug)]
pub struct Map {
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    observers: IndexMap<u8, Observer>,
    loot: IndexMap<String, LootInstance>,
    static_corpses: Vec<Vec3>,
}

impl Map {
    pub fn new() -> Self {
        Self {
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::ZERO,
            observers: IndexMap::new(),
            loot: IndexMap::new(),
            static_corpses: Vec::new(),
        }
    }

    pub fn set_bounds(&mut self, min: Vec3, max: Vec3) {
        self.bounds_min = min;
        self.bounds_max = max;
    }

    // --- Observers -----------------------------------------------------

    pub fn insert_observer(&mut self, observer: Observer) {
        self.observers.insert(observer.channel_id, observer);
    }

    /// Look up an observer by channel id. On a miss, also tries
    /// `channel_id - 1` — an empirically observed off-by-one in the
    /// server's channel encoding. This is preserved as-is; see the design
    /// notes for the open question around its root cause.
    pub fn observer(&self, channel_id: u8) -> Option<&Observer> {
        self.observers.get(&channel_id).or_else(|| {
            channel_id.checked_sub(1).and_then(|cid| self.observers.get(&cid))
        })
    }

    pub fn observer_mut(&mut self, channel_id: u8) -> Option<&mut Observer> {
        if self.observers.contains_key(&channel_id) {
            return self.observers.get_mut(&channel_id);
        }
        let fallback = channel_id.checked_sub(1)?;
        self.observers.get_mut(&fallback)
    }

    /// Look up an observer for `GameUpdate` processing, fabricating an
    /// `"UNKNOWN?!"` placeholder on a total miss (§4.8's error policy for
    /// observer lookup misses).
    pub fn observer_or_placeholder(&mut self, channel_id: u8) -> &mut Observer {
        if self.observer(channel_id).is_none() {
            self.insert_observer(Observer::placeholder(channel_id));
        }
        self.observer_mut(channel_id).expect("just inserted")
    }

    pub fn unspawn_observer(&mut self, channel_id: u8) {
        if let Some(observer) = self.observer_mut(channel_id) {
            observer.is_unspawned = true;
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn observers(&self) -> impl Iterator<Item = &Observer> {
        self.observers.values()
    }

    // --- Loot ------------------------------------------------------------

    pub fn insert_loot(&mut self, instance: LootInstance) {
        self.loot.insert(instance.id.clone(), instance);
    }

    pub fn loot(&self, id: &str) -> Option<&LootInstance> {
        self.loot.get(id)
    }

    pub fn loot_mut(&mut self, id: &str) -> Option<&mut LootInstance> {
        self.loot.get_mut(id)
    }

    pub fn loot_count(&self) -> usize {
        self.loot.len()
    }

    pub fn loot_items(&self) -> impl Iterator<Item = &LootInstance> {
        self.loot.values()
    }

    /// Find a loot instance by its csharp hash, as referenced by
    /// loot-position-sync packets.
    pub fn loot_by_hash(&self, hash: i32) -> Option<&LootInstance> {
        self.loot.values().find(|l| l.csharp_hash == hash)
    }

    pub fn loot_by_hash_mut(&mut self, hash: i32) -> Option<&mut LootInstance> {
        self.loot.values_mut().find(|l| l.csharp_hash == hash)
    }

    pub fn highlight_loot(&mut self, id: &str, highlighted: bool) {
        if let Some(item) = self.loot_mut(id) {
            item.highlighted = highlighted;
        }
    }

    /// Reparent an existing loot instance, clearing its owner to [`Owner::Invalid`]
    /// so it is resolved lazily by the next ancestor walk (§4.8 move operation).
    pub fn reparent_loot(&mut self, id: &str, new_parent_id: String) {
        if let Some(item) = self.loot_mut(id) {
            item.parent_id = new_parent_id;
            item.owner = Owner::Invalid;
        }
    }

    /// Detach a loot instance to the world root (§4.8 throw operation).
    pub fn throw_loot(&mut self, id: &str) {
        if let Some(item) = self.loot_mut(id) {
            item.parent_id.clear();
            item.owner = Owner::World;
        }
    }

    /// Walk parent pointers to the root and return its owner. Terminates
    /// because every insertion path produces a finite parent chain rooted
    /// at an item with an empty `parent_id`.
    pub fn resolve_owner(&self, id: &str) -> Owner {
        let mut current = id;
        let mut guard = 0usize;
        loop {
            guard += 1;
            if guard > self.loot.len() + 1 {
                // Defensive bound: a cycle would otherwise loop forever.
                return Owner::Invalid;
            }
            let Some(item) = self.loot.get(current) else {
                return Owner::Invalid;
            };
            if item.parent_id.is_empty() {
                return item.owner;
            }
            current = item.parent_id.as_str();
        }
    }

    /// A loot instance is inaccessible iff it, or any ancestor, was placed
    /// through a `SecuredContainer` slot, or through a `Scabbard` slot when
    /// the root owner is a human observer (not a scav NPC).
    pub fn is_accessible(&self, id: &str) -> bool {
        let root_owner = self.resolve_owner(id);
        let owner_is_human = match root_owner {
            Owner::Channel(cid) => self.observer(cid).map(|o| o.kind != ObserverKind::Scav).unwrap_or(true),
            _ => false,
        };

        let mut current = id;
        let mut guard = 0usize;
        loop {
            guard += 1;
            if guard > self.loot.len() + 1 {
                return true;
            }
            let Some(item) = self.loot.get(current) else {
                return true;
            };
            if item.inaccessible {
                return false;
            }
            if item.parent_id.is_empty() {
                return true;
            }
            current = item.parent_id.as_str();
            let _ = owner_is_human;
        }
    }

    /// Whether an enclosing slot id makes its contents inaccessible, given
    /// whether the tree's root owner is a human observer.
    pub fn slot_marks_inaccessible(slot_id: &str, owner_is_human: bool) -> bool {
        slot_id == SECURED_CONTAINER_SLOT || (slot_id == SCABBARD_SLOT && owner_is_human)
    }

    // --- Corpses ---------------------------------------------------------

    pub fn add_static_corpse(&mut self, position: Vec3) {
        self.static_corpses.push(position);
    }

    pub fn static_corpses(&self) -> &[Vec3] {
        &self.static_corpses
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_lookup_falls_back_to_off_by_one() {
        let mut map = Map::new();
        map.insert_observer(Observer::placeholder(5));
        assert!(map.observer(5).is_some());
        assert!(map.observer(6).is_some(), "cid 6 should fall back to cid 5");
        assert!(map.observer(10).is_none());
    }

    #[test]
    fn loot_tree_parenting_terminates_at_valid_root() {
        let mut map = Map::new();
        map.insert_loot(LootInstance::new("root".into(), String::new(), Owner::World, "T".into(), Vec3::ZERO, 1));
        map.insert_loot(LootInstance::new("child".into(), "root".into(), Owner::Invalid, "T".into(), Vec3::ZERO, 1));
        assert_eq!(map.resolve_owner("child"), Owner::World);
    }

    #[test]
    fn secured_container_marks_whole_subtree_inaccessible() {
        let mut map = Map::new();
        map.insert_observer(Observer { kind: ObserverKind::Player, ..placeholder_observer(1) });

        map.insert_loot(LootInstance::new("root".into(), String::new(), Owner::Channel(1), "T".into(), Vec3::ZERO, 1));
        let mut s = LootInstance::new("S".into(), "root".into(), Owner::Invalid, "T".into(), Vec3::ZERO, 1);
        s.inaccessible = true;
        map.insert_loot(s);
        map.insert_loot(LootInstance::new("S2".into(), "S".into(), Owner::Invalid, "T".into(), Vec3::ZERO, 1));
        map.insert_loot(LootInstance::new("sibling".into(), "root".into(), Owner::Invalid, "T".into(), Vec3::ZERO, 1));

        assert!(!map.is_accessible("S"));
        assert!(!map.is_accessible("S2"));
        assert!(map.is_accessible("sibling"));
    }

    fn placeholder_observer(cid: u8) -> Observer {
        Observer::placeholder(cid)
    }
}
