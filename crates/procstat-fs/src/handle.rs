//! Kernel-visible handles (inode numbers) and the slot table behind them.
//!
//! A handle packs a slot index and that slot's generation:
//! `(generation << 32) | index`. Freeing a slot bumps its generation, so a
//! handle the kernel still remembers after the item is gone resolves to
//! nothing instead of to a reused slot.
//!
//! Slot 0 belongs to the root and is only reachable through
//! [`Handle::ROOT`], the reserved FUSE root id.

use crate::error::{StatsError, StatsResult};

/// Inode number FUSE reserves for the mount root.
pub const ROOT_INO: u64 = fuser::FUSE_ROOT_ID;

const ROOT_SLOT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub const ROOT: Handle = Handle(ROOT_INO);

    fn new(index: u32, generation: u32) -> Self {
        Handle((u64::from(generation) << 32) | u64::from(index))
    }

    /// Wrap an inode number received from the kernel.
    pub fn from_ino(ino: u64) -> Self {
        Handle(ino)
    }

    pub fn ino(self) -> u64 {
        self.0
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// Generation reported to the kernel alongside the inode number.
    pub fn generation(self) -> u32 {
        if self.is_root() { 0 } else { (self.0 >> 32) as u32 }
    }

    fn index(self) -> u32 {
        if self.is_root() { ROOT_SLOT } else { self.0 as u32 }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generation-tagged arena. O(1) resolve, insert and remove.
#[derive(Debug)]
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> SlotTable<T> {
    /// Create a table whose slot 0 permanently holds `root`.
    pub fn with_root(root: T) -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                value: Some(root),
            }],
            free: Vec::new(),
            live: 1,
        }
    }

    pub fn insert(&mut self, value: T) -> StatsResult<Handle> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.live += 1;
            return Ok(Handle::new(index, slot.generation));
        }

        let index = u32::try_from(self.slots.len()).map_err(|_| StatsError::OutOfMemory)?;
        self.slots
            .try_reserve(1)
            .map_err(|_| StatsError::OutOfMemory)?;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        self.live += 1;
        Ok(Handle::new(index, 1))
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        let index = handle.index();
        if index == ROOT_SLOT && !handle.is_root() {
            return None;
        }
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == handle.generation())
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle).and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slot(handle)?;
        self.slots[handle.index() as usize].value.as_mut()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Empty the slot and retire its generation. The root slot is never removed.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        if handle.is_root() || !self.contains(handle) {
            return None;
        }
        let index = handle.index();
        let slot = &mut self.slots[index as usize];
        let value = slot.value.take();
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.free.push(index);
        self.live -= 1;
        value
    }

    /// Handles of every occupied slot except the root.
    pub fn handles(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| Handle::new(index as u32, slot.generation))
            .collect()
    }

    /// Number of occupied slots, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_handle_is_fuse_root() {
        let table = SlotTable::with_root("root");
        assert_eq!(Handle::ROOT.ino(), 1);
        assert_eq!(table.get(Handle::ROOT), Some(&"root"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut table = SlotTable::with_root("root");
        assert!(table.remove(Handle::ROOT).is_none());
        assert!(table.contains(Handle::ROOT));
    }

    #[test]
    fn test_slot_zero_only_via_root() {
        let table = SlotTable::with_root("root");
        let forged = Handle::new(0, 1);
        assert!(table.get(forged).is_none());
    }

    #[test]
    fn test_handles_never_collide_with_reserved_ids() {
        let mut table = SlotTable::with_root(0);
        for i in 1..100 {
            let handle = table.insert(i).unwrap();
            assert!(handle.ino() > ROOT_INO);
            assert_ne!(handle.ino(), 0);
        }
    }

    #[test]
    fn test_stale_handle_rejected_after_reuse() {
        let mut table = SlotTable::with_root(0);
        let first = table.insert(1).unwrap();
        assert_eq!(table.remove(first), Some(1));
        assert!(table.get(first).is_none());

        let second = table.insert(2).unwrap();
        // Same slot, new generation.
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(table.get(first).is_none());
        assert_eq!(table.get(second), Some(&2));
        assert!(table.remove(first).is_none());
    }

    #[test]
    fn test_handles_lists_live_items() {
        let mut table = SlotTable::with_root(0);
        let a = table.insert(1).unwrap();
        let b = table.insert(2).unwrap();
        table.remove(a);
        assert_eq!(table.handles(), vec![b]);
        assert_eq!(table.len(), 2);
    }
}
