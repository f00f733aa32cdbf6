//! Fixed-capacity slabs with generation-tagged handles
//!
//! Slots are recycled through a free-index stack; every release bumps the
//! slot's generation so handles held across a delete stop resolving
//! instead of aliasing the next occupant.

use pm_core::Handle;

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

pub(crate) struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u16>,
}

impl<T> Pool<T> {
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity as usize;
        Self {
            slots: (0..capacity).map(|_| Slot { generation: 0, value: None }).collect(),
            free: (0..capacity as u16).rev().collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slot count.
    pub fn active_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn remaining(&self) -> usize {
        self.free.len()
    }

    pub fn acquire(&mut self, value: T) -> Option<Handle> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        Some(Handle::new(index, slot.generation))
    }

    pub fn release(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index() as u16);
        Some(value)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Mutable access by slot index, for mixer iteration.
    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.value.as_mut()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|s| s.value.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|s| s.value.as_ref())
    }
}
