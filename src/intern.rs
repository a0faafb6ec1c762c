//! Interning table (C3): canonicalizes records by full structural
//! equality so structurally identical objects share one heap
//! allocation.

use std::collections::HashMap;
use std::rc::Rc;

use crate::obj::ObjDescriptor;

struct Slot<R> {
    record: Rc<R>,
    /// Number of member entries, across the whole multi-index, currently
    /// referencing this canonical record. Bumped/dropped in lock-step
    /// with [InternTable::acquire]/[InternTable::release_entry], called
    /// only by `MultiIndex`'s own entry bookkeeping (`add`,
    /// `replace_record`, `remove_entry`).
    entry_refs: usize,
    /// Number of outstanding external holds taken via
    /// [InternTable::hold] (`MultiIndex::intern`/`find_interned`) and
    /// not yet given back via [InternTable::unhold]
    /// (`MultiIndex::release`). Deliberately a separate count from
    /// `entry_refs`: a caller holding a canonical record without having
    /// turned it into a member entry must not be able to evict a record
    /// a live `Entry` still points at, and vice versa.
    external_holds: usize,
}

impl<R> Slot<R> {
    fn live(&self) -> bool {
        self.entry_refs > 0 || self.external_holds > 0
    }
}

pub(crate) struct InternTable<R> {
    descriptor: Box<dyn ObjDescriptor<R>>,
    buckets: HashMap<u64, Vec<Slot<R>>>,
}

impl<R> InternTable<R> {
    pub(crate) fn new(descriptor: impl ObjDescriptor<R> + 'static) -> InternTable<R> {
        InternTable {
            descriptor: Box::new(descriptor),
            buckets: HashMap::new(),
        }
    }

    /// Probe for an already-canonical record without interning
    /// `candidate`.
    pub(crate) fn find(&self, candidate: &R) -> Option<Rc<R>> {
        let descriptor = &self.descriptor;
        let hash = descriptor.full_hash(candidate);
        self.buckets
            .get(&hash)?
            .iter()
            .find(|slot| descriptor.full_equal(candidate, &slot.record))
            .map(|slot| Rc::clone(&slot.record))
    }

    /// Intern `candidate`, returning the canonical record. If an
    /// equivalent record is already interned, `candidate` is discarded
    /// in favor of the existing canonical copy.
    ///
    /// Does not by itself count as a reference on the result -- callers
    /// that hand the returned `Rc` to a member entry must pair it with
    /// [InternTable::acquire]; callers that hold onto it independently
    /// of any entry must pair it with [InternTable::hold].
    pub(crate) fn intern(&mut self, candidate: R) -> Rc<R> {
        let descriptor = &self.descriptor;
        let hash = descriptor.full_hash(&candidate);
        let bucket = self.buckets.entry(hash).or_default();
        if let Some(slot) = bucket
            .iter()
            .find(|slot| descriptor.full_equal(&candidate, &slot.record))
        {
            return Rc::clone(&slot.record);
        }

        let owned = if descriptor.needs_clone(&candidate) {
            descriptor.clone_obj(&candidate)
        } else {
            candidate
        };
        let record = Rc::new(owned);
        bucket.push(Slot {
            record: Rc::clone(&record),
            entry_refs: 0,
            external_holds: 0,
        });
        record
    }

    /// Record that one more member entry now references `canonical`.
    pub(crate) fn acquire(&mut self, canonical: &Rc<R>) {
        if let Some(slot) = self.find_slot_mut(canonical) {
            slot.entry_refs += 1;
        }
    }

    /// Record that one member entry no longer references `canonical`.
    /// Evicts the canonical copy from the table once neither a member
    /// entry nor an external hold references it.
    pub(crate) fn release_entry(&mut self, canonical: &Rc<R>) {
        self.release_count(canonical, |slot| {
            slot.entry_refs = slot.entry_refs.saturating_sub(1)
        });
    }

    /// Record a new external hold on `canonical`, independent of any
    /// member entry.
    pub(crate) fn hold(&mut self, canonical: &Rc<R>) {
        if let Some(slot) = self.find_slot_mut(canonical) {
            slot.external_holds += 1;
        }
    }

    /// Give back an external hold taken via [InternTable::hold]. Evicts
    /// the canonical copy from the table once neither an external hold
    /// nor a member entry references it.
    pub(crate) fn unhold(&mut self, canonical: &Rc<R>) {
        self.release_count(canonical, |slot| {
            slot.external_holds = slot.external_holds.saturating_sub(1)
        });
    }

    fn release_count(&mut self, canonical: &Rc<R>, decrement: impl FnOnce(&mut Slot<R>)) {
        let hash = self.descriptor.full_hash(canonical);
        let bucket_now_empty = match self.buckets.get_mut(&hash) {
            Some(bucket) => {
                if let Some(pos) = bucket
                    .iter()
                    .position(|slot| Rc::ptr_eq(&slot.record, canonical))
                {
                    decrement(&mut bucket[pos]);
                    if !bucket[pos].live() {
                        let slot = bucket.remove(pos);
                        self.descriptor.destroy(&slot.record);
                    }
                }
                bucket.is_empty()
            }
            None => false,
        };
        if bucket_now_empty {
            self.buckets.remove(&hash);
        }
    }

    fn find_slot_mut(&mut self, canonical: &Rc<R>) -> Option<&mut Slot<R>> {
        let descriptor = &self.descriptor;
        let hash = descriptor.full_hash(canonical);
        self.buckets
            .get_mut(&hash)?
            .iter_mut()
            .find(|slot| Rc::ptr_eq(&slot.record, canonical))
    }
}

#[cfg(test)]
#[path = "intern_test.rs"]
mod intern_test;
