//! Growable slot storage with an embedded LIFO free list.
//!
//! Records are addressed by `(index, generation)` keys. Growth only
//! appends slots, so keys held elsewhere (cache lists, indexes) stay
//! valid across growth; a key goes stale once its slot is freed.

use crate::error::{HgfsError, HgfsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct Slots<T> {
    slots: Vec<Slot<T>>,
    /// Vacant indices; the last element is the head.
    free: Vec<u32>,
    in_use: usize,
}

impl<T> Slots<T> {
    pub fn with_capacity(initial: usize) -> HgfsResult<Self> {
        let mut slots = Self {
            slots: Vec::new(),
            free: Vec::new(),
            in_use: 0,
        };
        slots.grow(initial.max(1))?;
        Ok(slots)
    }

    /// Append `additional` vacant slots. The lowest new index ends up
    /// at the head of the free list.
    fn grow(&mut self, additional: usize) -> HgfsResult<()> {
        let old_len = self.slots.len();
        let new_len = old_len
            .checked_add(additional)
            .filter(|len| *len <= u32::MAX as usize)
            .ok_or(HgfsError::OutOfMemory)?;

        self.slots
            .try_reserve_exact(additional)
            .map_err(|_| HgfsError::OutOfMemory)?;
        self.free
            .try_reserve(additional)
            .map_err(|_| HgfsError::OutOfMemory)?;

        self.slots.extend((old_len..new_len).map(|_| Slot {
            generation: 0,
            value: None,
        }));
        self.free.extend((old_len..new_len).rev().map(|i| i as u32));
        Ok(())
    }

    /// Store `value` in the slot at the head of the free list, doubling
    /// the storage first if no slot is vacant.
    pub fn insert(&mut self, value: T) -> HgfsResult<SlotKey> {
        self.try_insert(value).map_err(|(e, _)| e)
    }

    /// Like `insert`, but a failed insert hands the value back.
    pub fn try_insert(&mut self, value: T) -> Result<SlotKey, (HgfsError, T)> {
        if self.free.is_empty() {
            if let Err(e) = self.grow(self.slots.len()) {
                return Err((e, value));
            }
        }
        let Some(index) = self.free.pop() else {
            return Err((HgfsError::OutOfMemory, value));
        };
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.in_use += 1;
        Ok(SlotKey {
            index,
            generation: slot.generation,
        })
    }

    /// Vacate the slot and push it on the head of the free list.
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.in_use -= 1;
        Some(value)
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SlotKey {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotKey, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|value| {
                (
                    SlotKey {
                        index: i as u32,
                        generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn keys(&self) -> Vec<SlotKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    pub fn is_vacant(&self, index: u32) -> bool {
        self.slots
            .get(index as usize)
            .is_none_or(|slot| slot.value.is_none())
    }

    /// Index the next insert will use, unless storage has to grow.
    pub fn free_head(&self) -> Option<u32> {
        self.free.last().copied()
    }

    pub fn len(&self) -> usize {
        self.in_use
    }

    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
