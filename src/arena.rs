//! Generation-checked slab arena.
//!
//! Heads and entries form a cyclic structure: a head's member list links
//! entries, and each entry links back to its head. Rather than model
//! that with owning `Rc`/`Weak` cycles, both live in a flat [Arena]
//! addressed by a small integer handle tagged with a generation counter.
//! Reusing a freed slot bumps its generation, so a handle captured before
//! the slot was freed and reused compares unequal and is rejected by
//! [Arena::get] -- an always-on, allocation-free use-after-free check.

type Gen = u32;

struct Slot<T> {
    generation: Gen,
    value: Option<T>,
}

pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Arena<T> {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> (u32, Gen) {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                (index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                (index, 0)
            }
        }
    }

    pub(crate) fn get(&self, index: u32, generation: Gen) -> Option<&T> {
        match self.slots.get(index as usize) {
            Some(slot) if slot.generation == generation => slot.value.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, index: u32, generation: Gen) -> Option<&mut T> {
        match self.slots.get_mut(index as usize) {
            Some(slot) if slot.generation == generation => slot.value.as_mut(),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, index: u32, generation: Gen) -> Option<T> {
        match self.slots.get_mut(index as usize) {
            Some(slot) if slot.generation == generation && slot.value.is_some() => {
                let value = slot.value.take();
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index);
                value
            }
            _ => None,
        }
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub struct $name {
            index: u32,
            generation: Gen,
        }

        impl $name {
            pub(crate) fn new(index: u32, generation: Gen) -> $name {
                $name { index, generation }
            }

            pub(crate) fn index(&self) -> u32 {
                self.index
            }

            pub(crate) fn generation(&self) -> Gen {
                self.generation
            }
        }
    };
}

define_handle!(
    /// Opaque handle to one member entry. Valid until the entry is
    /// removed; a stale handle is rejected with
    /// [Error::StaleHandle](crate::error::Error::StaleHandle) rather than
    /// dereferenced.
    EntryId
);
define_handle!(
    /// Opaque handle to a partition's head entry.
    HeadId
);
define_handle!(
    /// Opaque handle to a registered index-type instance.
    IdxTypeId
);

#[cfg(test)]
#[path = "arena_test.rs"]
mod arena_test;
