//! Reassembly of reliable-fragmented sub-messages.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FragmentError {
    #[error("fragment index {index} is out of bounds for declared count {count}")]
    BrokenFragment { index: u8, count: u8 },
}

/// A partially-received fragmented message, keyed by `(channel << 8) | id`.
#[derive(Debug)]
struct FragmentEntry {
    count: u8,
    parts: Vec<Option<Vec<u8>>>,
    received: usize,
}

impl FragmentEntry {
    fn new(count: u8) -> Self {
        Self { count, parts: vec![None; count as usize], received: 0 }
    }

    fn is_complete(&self) -> bool {
        self.received == self.count as usize
    }

    fn assemble(self) -> Vec<u8> {
        self.parts.into_iter().flatten().flatten().collect()
    }
}

/// Table of in-flight fragmented messages for a single session. No eviction
/// exists beyond a full [`Self::reset`] on session boundary: an incomplete
/// key lives until the session that owns it ends.
#[derive(Debug, Default)]
pub struct FragmentTable {
    entries: HashMap<u16, FragmentEntry>,
}

impl FragmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert one fragment. Returns the assembled payload once every index
    /// for this key has been received, consuming the entry. A broken
    /// fragment (`index >= count`) is dropped but does not disturb other
    /// fragments already buffered under the same or other keys.
    pub fn insert(
        &mut self,
        channel: u8,
        id: u8,
        index: u8,
        count: u8,
        payload: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, FragmentError> {
        if index >= count {
            return Err(FragmentError::BrokenFragment { index, count });
        }

        let key = ((channel as u16) << 8) | id as u16;
        let entry = self.entries.entry(key).or_insert_with(|| FragmentEntry::new(count));

        if entry.parts[index as usize].is_none() {
            entry.parts[index as usize] = Some(payload);
            entry.received += 1;
        }

        if entry.is_complete() {
            let entry = self.entries.remove(&key).unwrap();
            Ok(Some(entry.assemble()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_in_index_order_regardless_of_arrival_order() {
        let mut t = FragmentTable::new();
        assert_eq!(t.insert(0, 1, 1, 3, vec![2, 2]).unwrap(), None);
        assert_eq!(t.insert(0, 1, 0, 3, vec![1, 1]).unwrap(), None);
        let result = t.insert(0, 1, 2, 3, vec![3, 3]).unwrap();
        assert_eq!(result, Some(vec![1, 1, 2, 2, 3, 3]));
        assert!(t.is_empty());
    }

    #[test]
    fn broken_fragment_does_not_disturb_others() {
        let mut t = FragmentTable::new();
        t.insert(0, 1, 0, 2, vec![9]).unwrap();
        assert!(t.insert(0, 1, 5, 2, vec![0]).is_err());
        let result = t.insert(0, 1, 1, 2, vec![8]).unwrap();
        assert_eq!(result, Some(vec![9, 8]));
    }

    #[test]
    fn distinct_channels_do_not_collide() {
        let mut t = FragmentTable::new();
        t.insert(0, 5, 0, 1, vec![1]).unwrap();
        t.insert(1, 5, 0, 1, vec![2]).unwrap();
        assert!(t.is_empty());
    }
}
