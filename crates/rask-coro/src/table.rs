// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Slot table: ids are indices.
//!
//! Free slots are found by scanning from a rotating offset (the live
//! count), wrapping once around. A full table doubles and the new entry
//! takes the first fresh slot. Entries are boxed so growth never moves a
//! coroutine whose context is saved somewhere.

pub(crate) struct SlotTable<T> {
    slots: Vec<Option<Box<T>>>,
    count: usize,
}

impl<T> SlotTable<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, count: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Store `value` in a free slot and return its index.
    pub fn insert(&mut self, value: T) -> usize {
        let cap = self.slots.len();
        let free = if self.count < cap {
            (0..cap)
                .map(|i| (i + self.count) % cap)
                .find(|&id| self.slots[id].is_none())
        } else {
            None
        };

        let id = match free {
            Some(id) => id,
            None => {
                self.slots.resize_with((cap * 2).max(1), || None);
                cap
            }
        };
        self.slots[id] = Some(Box::new(value));
        self.count += 1;
        id
    }

    pub fn get(&self, id: usize) -> Option<&T> {
        self.slots.get(id).and_then(|s| s.as_deref())
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.slots.get_mut(id).and_then(|s| s.as_deref_mut())
    }

    /// Empty a slot, handing back what it held.
    pub fn remove(&mut self, id: usize) -> Option<Box<T>> {
        let taken = self.slots.get_mut(id).and_then(Option::take);
        if taken.is_some() {
            self.count -= 1;
        }
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, s)| s.as_deref().map(|v| (id, v)))
    }
}
