//! Multi-index container (C4): the top-level type. Interns records
//! (C1+C3), partitions them per registered index-type (C2), and
//! maintains the ordered per-partition member lists on an arena of
//! heads and entries.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::arena::{Arena, EntryId, HeadId, IdxTypeId};
use crate::err_at;
use crate::error::{Error, Result};
use crate::idx_type::IdxTypeDescriptor;
use crate::intern::InternTable;
use crate::obj::ObjDescriptor;

/// Insertion mode: the `{prepend, append} x {lazy, force}` lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// New member: insert at the head of its partition. An existing
    /// id-equal member is left in place, its record replaced.
    Prepend,
    /// New member: insert at the head of its partition. An existing
    /// id-equal member is moved to the head, its record replaced.
    PrependForce,
    /// New member: insert at the tail of its partition. An existing
    /// id-equal member is left in place, its record replaced.
    Append,
    /// New member: insert at the tail of its partition. An existing
    /// id-equal member is moved to the tail, its record replaced.
    AppendForce,
}

/// A three-valued lookup outcome, distinguishing "looked, and it is
/// absent" ([Lookup::Missing]) from "no lookup performed yet"
/// ([Lookup::NotLooked]) -- so a caller can cache a negative lookup as a
/// fast-path hint without confusing it with "no hint at all".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Missing,
    NotLooked,
}

impl<T> Default for Lookup<T> {
    fn default() -> Lookup<T> {
        Lookup::NotLooked
    }
}

impl<T: Copy> Lookup<T> {
    pub fn found(&self) -> Option<T> {
        match self {
            Lookup::Found(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing)
    }
}

/// Fast-path hints for [MultiIndex::add]. Every hint is verified before
/// being trusted; a stale or mismatched hint is silently recomputed, it
/// is never treated as an error.
#[derive(Clone, Copy, Default)]
pub struct AddHints {
    /// For a newly created member, insert immediately before (prepend
    /// modes) or after (append modes) this existing entry of the same
    /// partition, instead of at the head/tail.
    pub order: Option<EntryId>,
    /// A previously looked-up entry for this (index-type, record) pair.
    pub entry: Lookup<EntryId>,
    /// A previously looked-up head for this record's partition.
    pub head: Lookup<HeadId>,
    /// The head's [MultiIndex::head_version] observed at the moment
    /// `entry` was determined [Lookup::Missing]. Required to trust that
    /// hint: if the head has been linked/unlinked against since, nothing
    /// is assumed and the member scan runs again. Ignored unless `entry`
    /// is `Lookup::Missing`.
    pub entry_as_of: Option<u64>,
}

struct Head {
    first: Option<EntryId>,
    last: Option<EntryId>,
    len: usize,
    partition_hash: u64,
    idx_type: IdxTypeId,
    /// Bumped by every `link_*`/`unlink` call against this head. Lets a
    /// cached "no id-equal member" scan result be verified cheaply: if
    /// the version a caller observed still matches, nothing has been
    /// linked or unlinked since, so the scan need not be repeated.
    membership_version: u64,
}

struct Entry<R> {
    record: Rc<R>,
    head: HeadId,
    prev: Option<EntryId>,
    next: Option<EntryId>,
    dirty: Cell<bool>,
}

struct IdxTypeSlot<R> {
    descriptor: Box<dyn IdxTypeDescriptor<R>>,
    heads: HashMap<u64, Vec<HeadId>>,
}

impl<R> IdxTypeSlot<R> {
    fn partitionable(&self, obj: &R) -> bool {
        self.descriptor
            .partition()
            .map_or(true, |p| p.partitionable(obj))
    }

    fn partition_hash(&self, obj: &R) -> u64 {
        self.descriptor
            .partition()
            .map_or(0, |p| p.partition_hash(obj))
    }

    fn partition_equal(&self, a: &R, b: &R) -> bool {
        self.descriptor
            .partition()
            .map_or(true, |p| p.partition_equal(a, b))
    }

    fn id_equal(&self, a: &R, b: &R) -> bool {
        self.descriptor.id_equal(a, b)
    }
}

fn idx_type_ref<'a, R>(
    idx_types: &'a Arena<IdxTypeSlot<R>>,
    id: IdxTypeId,
    at: &'static str,
) -> Result<&'a IdxTypeSlot<R>> {
    idx_types
        .get(id.index(), id.generation())
        .ok_or_else(|| Error::StaleHandle {
            at,
            detail: format!("idx_type {:?} is not live", id),
        })
}

/// The deduplicating, multi-index container.
///
/// Single-threaded by design: no internal locking. Callers needing
/// cross-thread access must serialize externally or keep one
/// `MultiIndex` per thread -- see the crate-level docs.
pub struct MultiIndex<R> {
    intern: InternTable<R>,
    idx_types: Arena<IdxTypeSlot<R>>,
    heads: Arena<Head>,
    entries: Arena<Entry<R>>,
    #[cfg(feature = "debug")]
    stats: DebugStats,
}

/// Counters kept only under the `debug` feature, exposed via
/// [MultiIndex::stats]. Cheap enough to always compute, but off by
/// default since most callers don't need them.
#[cfg(feature = "debug")]
#[derive(Default)]
pub struct DebugStats {
    hint_hits: Cell<u64>,
    hint_misses: Cell<u64>,
}

#[cfg(feature = "debug")]
impl DebugStats {
    /// Number of [AddHints::entry] / [AddHints::head] hints that were
    /// verified and trusted.
    pub fn hint_hits(&self) -> u64 {
        self.hint_hits.get()
    }

    /// Number of hints that were supplied but failed verification and
    /// had to be recomputed.
    pub fn hint_misses(&self) -> u64 {
        self.hint_misses.get()
    }
}

impl<R> MultiIndex<R> {
    /// Create an empty multi-index, interning records via `descriptor`.
    pub fn new(descriptor: impl ObjDescriptor<R> + 'static) -> MultiIndex<R> {
        MultiIndex {
            intern: InternTable::new(descriptor),
            idx_types: Arena::new(),
            heads: Arena::new(),
            entries: Arena::new(),
            #[cfg(feature = "debug")]
            stats: DebugStats::default(),
        }
    }

    /// Hint-verification counters. Only meaningful when built with the
    /// `debug` feature.
    #[cfg(feature = "debug")]
    pub fn stats(&self) -> &DebugStats {
        &self.stats
    }

    /// Register a new, empty index-type instance bound to `descriptor`.
    pub fn init_idx_type(&mut self, descriptor: impl IdxTypeDescriptor<R> + 'static) -> IdxTypeId {
        let (index, generation) = self.idx_types.insert(IdxTypeSlot {
            descriptor: Box::new(descriptor),
            heads: HashMap::new(),
        });
        IdxTypeId::new(index, generation)
    }

    /// Discard an index-type instance. Fails with
    /// [Error::InstanceNotEmpty] unless it has no live heads; call
    /// [MultiIndex::remove_instance] first to empty it.
    pub fn close_idx_type(&mut self, idx_type: IdxTypeId) -> Result<()> {
        {
            let slot = idx_type_ref(&self.idx_types, idx_type, "close_idx_type")?;
            if !slot.heads.is_empty() {
                let live: usize = slot.heads.values().map(Vec::len).sum();
                return err_at!(
                    InstanceNotEmpty,
                    msg: "idx_type {:?} still has {} live head(s)",
                    idx_type,
                    live
                );
            }
        }
        self.idx_types.remove(idx_type.index(), idx_type.generation());
        Ok(())
    }

    /// Intern `candidate` directly, without any index-type partitioning.
    /// Takes out an external hold on the result, independent of any
    /// member-entry bookkeeping; give it back with [MultiIndex::release]
    /// once done, or hand the record to [MultiIndex::add] (which takes
    /// out its own, separately-counted member-entry reference).
    pub fn intern(&mut self, candidate: R) -> Rc<R> {
        let canonical = self.intern.intern(candidate);
        self.intern.hold(&canonical);
        canonical
    }

    /// Probe for an already-canonical record without interning. Like
    /// [MultiIndex::intern], a hit takes out an external hold that must
    /// be given back via [MultiIndex::release].
    pub fn find_interned(&mut self, candidate: &R) -> Option<Rc<R>> {
        let found = self.intern.find(candidate)?;
        self.intern.hold(&found);
        Some(found)
    }

    /// Release an external hold taken by [MultiIndex::intern] or
    /// [MultiIndex::find_interned]. Never call this on a record that was
    /// instead turned into a member entry via [MultiIndex::add] --
    /// those release automatically on [MultiIndex::remove_entry] (and
    /// friends), through a separate, member-entry-only count.
    pub fn release(&mut self, canonical: &Rc<R>) {
        self.intern.unhold(canonical);
    }

    /// Insert `record` into the partition of `idx_type` it belongs to,
    /// per `mode`'s rules. Returns the member entry and, if an id-equal
    /// predecessor's record was replaced, the record it displaced.
    pub fn add(
        &mut self,
        idx_type: IdxTypeId,
        record: R,
        mode: Mode,
        hints: AddHints,
    ) -> Result<(EntryId, Option<Rc<R>>)> {
        {
            let slot = idx_type_ref(&self.idx_types, idx_type, "add")?;
            if !slot.partitionable(&record) {
                return err_at!(NotPartitionable, msg: "record rejected by idx_type {:?}", idx_type);
            }
        }

        let canonical = self.intern.intern(record);

        let phash = idx_type_ref(&self.idx_types, idx_type, "add")?.partition_hash(&canonical);

        let head_id = match hints.head.found() {
            Some(h) if self.head_matches(h, idx_type, &canonical) => {
                self.note_hint(true);
                h
            }
            Some(_) => {
                self.note_hint(false);
                self.find_or_create_head(idx_type, phash, &canonical)
            }
            None => self.find_or_create_head(idx_type, phash, &canonical),
        };

        let existing = match hints.entry.found() {
            Some(e) if self.entry_matches(e, head_id, idx_type, &canonical) => {
                self.note_hint(true);
                Some(e)
            }
            Some(_) => {
                self.note_hint(false);
                self.scan_for_id(head_id, idx_type, &canonical)
            }
            None if hints.entry.is_missing() && self.head_matches(head_id, idx_type, &canonical)
                && hints.entry_as_of == Some(self.head_ref(head_id).membership_version) =>
            {
                // The caller already confirmed no id-equal member exists
                // in this head, and nothing has been linked or unlinked
                // since -- trust it and skip the rescan.
                self.note_hint(true);
                None
            }
            None => {
                if hints.entry.is_missing() {
                    self.note_hint(false);
                }
                self.scan_for_id(head_id, idx_type, &canonical)
            }
        };

        if let Some(entry_id) = existing {
            if let Ok(slot) = idx_type_ref(&self.idx_types, idx_type, "add") {
                debug_assert!(
                    slot.partition_equal(&canonical, &self.entry_ref(entry_id).record),
                    "id_equal must refine partition_equal"
                );
            }
            let displaced = self.replace_record(entry_id, &canonical);
            if matches!(mode, Mode::PrependForce | Mode::AppendForce) {
                unlink(&mut self.heads, &mut self.entries, entry_id, head_id);
                match mode {
                    Mode::PrependForce => self.relink_front_or_before(entry_id, head_id, hints.order),
                    Mode::AppendForce => self.relink_back_or_after(entry_id, head_id, hints.order),
                    _ => unreachable!(),
                }
            }
            self.entry_ref(entry_id).dirty.set(false);
            Ok((entry_id, displaced))
        } else {
            self.intern.acquire(&canonical);
            let (index, generation) = self.entries.insert(Entry {
                record: canonical,
                head: head_id,
                prev: None,
                next: None,
                dirty: Cell::new(false),
            });
            let entry_id = EntryId::new(index, generation);
            match mode {
                Mode::Prepend | Mode::PrependForce => {
                    self.relink_front_or_before(entry_id, head_id, hints.order)
                }
                Mode::Append | Mode::AppendForce => {
                    self.relink_back_or_after(entry_id, head_id, hints.order)
                }
            }
            Ok((entry_id, None))
        }
    }

    /// Look up the head of the partition `record` belongs to under
    /// `idx_type`.
    pub fn lookup_head(&self, idx_type: IdxTypeId, record: &R) -> Result<Lookup<HeadId>> {
        let slot = idx_type_ref(&self.idx_types, idx_type, "lookup_head")?;
        let phash = slot.partition_hash(record);
        match self.lookup_head_in_bucket(idx_type, phash, record) {
            Some(hid) => Ok(Lookup::Found(hid)),
            None => Ok(Lookup::Missing),
        }
    }

    /// Look up the member entry id-equal to `record` under `idx_type`. A
    /// `Lookup::Missing` result can be cached as an [AddHints] fast-path
    /// hint -- pair it with [MultiIndex::head_version] of the
    /// corresponding head in [AddHints::entry_as_of].
    pub fn lookup_entry(&self, idx_type: IdxTypeId, record: &R) -> Result<Lookup<EntryId>> {
        match self.lookup_head(idx_type, record)? {
            Lookup::Found(head_id) => {
                let slot = idx_type_ref(&self.idx_types, idx_type, "lookup_entry")?;
                let mut cur = self
                    .heads
                    .get(head_id.index(), head_id.generation())
                    .expect("internal: head just found")
                    .first;
                while let Some(e) = cur {
                    let entry = self.entry_ref(e);
                    if slot.id_equal(record, &entry.record) {
                        return Ok(Lookup::Found(e));
                    }
                    cur = entry.next;
                }
                Ok(Lookup::Missing)
            }
            _ => Ok(Lookup::Missing),
        }
    }

    /// Remove a single member entry. Destroys its head if that was the
    /// last member.
    pub fn remove_entry(&mut self, entry_id: EntryId) -> Result<()> {
        let (head_id, record) = {
            let entry = self
                .entries
                .get(entry_id.index(), entry_id.generation())
                .ok_or_else(|| Error::StaleHandle {
                    at: "remove_entry",
                    detail: format!("entry {:?} is not live", entry_id),
                })?;
            (entry.head, Rc::clone(&entry.record))
        };
        unlink(&mut self.heads, &mut self.entries, entry_id, head_id);
        self.intern.release_entry(&record);
        self.entries.remove(entry_id.index(), entry_id.generation());

        let empty = self
            .heads
            .get(head_id.index(), head_id.generation())
            .map_or(false, |h| h.len == 0);
        if empty {
            self.free_empty_head(head_id);
        }
        Ok(())
    }

    /// Remove `record`'s member entry under `idx_type`, if any. Returns
    /// whether a member was removed.
    pub fn remove_object(&mut self, idx_type: IdxTypeId, record: &R) -> Result<bool> {
        match self.lookup_entry(idx_type, record)? {
            Lookup::Found(entry_id) => {
                self.remove_entry(entry_id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Remove every member of the partition containing `record` under
    /// `idx_type`, destroying the head. Returns the number removed.
    pub fn remove_head(&mut self, idx_type: IdxTypeId, record: &R) -> Result<usize> {
        match self.lookup_head(idx_type, record)? {
            Lookup::Found(head_id) => Ok(self.destroy_head_members(head_id)),
            _ => Ok(0),
        }
    }

    /// Remove every head owned by `idx_type`. Returns the number of
    /// member entries removed.
    pub fn remove_instance(&mut self, idx_type: IdxTypeId) -> Result<usize> {
        let heads = self.heads_of_instance(idx_type, "remove_instance")?;
        let mut total = 0;
        for head_id in heads {
            total += self.destroy_head_members(head_id);
        }
        Ok(total)
    }

    /// Mark every member of `record`'s partition under `idx_type` dirty.
    pub fn dirty_set_head(&mut self, idx_type: IdxTypeId, record: &R) -> Result<()> {
        if let Lookup::Found(head_id) = self.lookup_head(idx_type, record)? {
            self.mark_head_dirty(head_id, true);
        }
        Ok(())
    }

    /// Mark every member owned by `idx_type` dirty, across all
    /// partitions.
    pub fn dirty_set_instance(&mut self, idx_type: IdxTypeId) -> Result<()> {
        let heads = self.heads_of_instance(idx_type, "dirty_set_instance")?;
        for head_id in heads {
            self.mark_head_dirty(head_id, true);
        }
        Ok(())
    }

    /// Sweep: remove every entry still marked dirty under `idx_type`. If
    /// `mark_survivors_dirty` is set, every surviving member is
    /// re-marked dirty, ready for the next mark/sweep round. Returns the
    /// number of entries removed.
    pub fn dirty_remove_instance(
        &mut self,
        idx_type: IdxTypeId,
        mark_survivors_dirty: bool,
    ) -> Result<usize> {
        let heads = self.heads_of_instance(idx_type, "dirty_remove_instance")?;
        let mut removed = 0;
        for head_id in heads {
            let dirty_entries: Vec<EntryId> = {
                let mut v = Vec::new();
                let mut cur = self
                    .heads
                    .get(head_id.index(), head_id.generation())
                    .and_then(|h| h.first);
                while let Some(e) = cur {
                    let entry = self.entry_ref(e);
                    if entry.dirty.get() {
                        v.push(e);
                    }
                    cur = entry.next;
                }
                v
            };
            for e in dirty_entries {
                self.remove_entry(e).expect("internal: entry was just live");
                removed += 1;
            }
            if mark_survivors_dirty && self.heads.get(head_id.index(), head_id.generation()).is_some() {
                self.mark_head_dirty(head_id, true);
            }
        }
        Ok(removed)
    }

    /// Snapshot the records of a head's members matching `predicate`,
    /// preserving head order.
    pub fn collect_head(&self, head_id: HeadId, mut predicate: impl FnMut(&R) -> bool) -> Vec<Rc<R>> {
        let mut out = Vec::new();
        let mut cur = self
            .heads
            .get(head_id.index(), head_id.generation())
            .and_then(|h| h.first);
        while let Some(e) = cur {
            let entry = self.entry_ref(e);
            if predicate(&entry.record) {
                out.push(Rc::clone(&entry.record));
            }
            cur = entry.next;
        }
        out
    }

    /// The canonical record backing a live entry.
    pub fn entry_record(&self, entry_id: EntryId) -> Result<Rc<R>> {
        self.entries
            .get(entry_id.index(), entry_id.generation())
            .map(|e| Rc::clone(&e.record))
            .ok_or_else(|| Error::StaleHandle {
                at: "entry_record",
                detail: format!("entry {:?} is not live", entry_id),
            })
    }

    /// Number of members in a live head.
    pub fn head_len(&self, head_id: HeadId) -> Result<usize> {
        self.heads
            .get(head_id.index(), head_id.generation())
            .map(|h| h.len)
            .ok_or_else(|| Error::StaleHandle {
                at: "head_len",
                detail: format!("head {:?} is not live", head_id),
            })
    }

    /// A counter bumped every time a member entry is linked into or
    /// unlinked out of `head_id`. Pair with a `Lookup::Missing` entry
    /// hint (via [AddHints::entry_as_of]) to let a later [MultiIndex::add]
    /// trust that the scan need not be repeated.
    pub fn head_version(&self, head_id: HeadId) -> Result<u64> {
        self.heads
            .get(head_id.index(), head_id.generation())
            .map(|h| h.membership_version)
            .ok_or_else(|| Error::StaleHandle {
                at: "head_version",
                detail: format!("head {:?} is not live", head_id),
            })
    }

    /// An iterator over `head`'s member entries, for use with
    /// [HeadIter].
    pub fn iter_head(&self, head: HeadId) -> HeadIter {
        HeadIter::init(self, head)
    }

    #[cfg(feature = "debug")]
    fn note_hint(&self, hit: bool) {
        if hit {
            self.stats.hint_hits.set(self.stats.hint_hits.get() + 1);
        } else {
            self.stats.hint_misses.set(self.stats.hint_misses.get() + 1);
        }
    }

    #[cfg(not(feature = "debug"))]
    fn note_hint(&self, _hit: bool) {}

    fn heads_of_instance(&self, idx_type: IdxTypeId, at: &'static str) -> Result<Vec<HeadId>> {
        Ok(idx_type_ref(&self.idx_types, idx_type, at)?
            .heads
            .values()
            .flatten()
            .copied()
            .collect())
    }

    fn entry_ref(&self, e: EntryId) -> &Entry<R> {
        self.entries
            .get(e.index(), e.generation())
            .expect("internal: dangling entry id")
    }

    fn head_ref(&self, h: HeadId) -> &Head {
        self.heads
            .get(h.index(), h.generation())
            .expect("internal: dangling head id")
    }

    fn head_matches(&self, head_id: HeadId, idx_type: IdxTypeId, candidate: &R) -> bool {
        let head = match self.heads.get(head_id.index(), head_id.generation()) {
            Some(h) => h,
            None => return false,
        };
        if head.idx_type != idx_type {
            return false;
        }
        let slot = match idx_type_ref(&self.idx_types, idx_type, "add") {
            Ok(s) => s,
            Err(_) => return false,
        };
        match head.first {
            Some(first) => slot.partition_equal(candidate, &self.entry_ref(first).record),
            None => true,
        }
    }

    fn entry_matches(&self, entry_id: EntryId, head_id: HeadId, idx_type: IdxTypeId, candidate: &R) -> bool {
        let entry = match self.entries.get(entry_id.index(), entry_id.generation()) {
            Some(e) => e,
            None => return false,
        };
        if entry.head != head_id {
            return false;
        }
        match idx_type_ref(&self.idx_types, idx_type, "add") {
            Ok(slot) => slot.id_equal(candidate, &entry.record),
            Err(_) => false,
        }
    }

    fn scan_for_id(&self, head_id: HeadId, idx_type: IdxTypeId, candidate: &Rc<R>) -> Option<EntryId> {
        let slot = idx_type_ref(&self.idx_types, idx_type, "add").ok()?;
        let mut cur = self.heads.get(head_id.index(), head_id.generation())?.first;
        while let Some(e) = cur {
            let entry = self.entry_ref(e);
            if slot.id_equal(candidate, &entry.record) {
                return Some(e);
            }
            cur = entry.next;
        }
        None
    }

    fn lookup_head_in_bucket(&self, idx_type: IdxTypeId, phash: u64, candidate: &R) -> Option<HeadId> {
        let slot = idx_type_ref(&self.idx_types, idx_type, "add").ok()?;
        let bucket = slot.heads.get(&phash)?;
        bucket.iter().copied().find(|&hid| {
            let head = match self.heads.get(hid.index(), hid.generation()) {
                Some(h) => h,
                None => return false,
            };
            match head.first {
                Some(first) => slot.partition_equal(candidate, &self.entry_ref(first).record),
                None => false,
            }
        })
    }

    fn find_or_create_head(&mut self, idx_type: IdxTypeId, phash: u64, candidate: &Rc<R>) -> HeadId {
        if let Some(hid) = self.lookup_head_in_bucket(idx_type, phash, candidate) {
            return hid;
        }
        let (index, generation) = self.heads.insert(Head {
            first: None,
            last: None,
            len: 0,
            partition_hash: phash,
            idx_type,
            membership_version: 0,
        });
        let head_id = HeadId::new(index, generation);
        if let Some(slot) = self.idx_types.get_mut(idx_type.index(), idx_type.generation()) {
            slot.heads.entry(phash).or_default().push(head_id);
        }
        head_id
    }

    fn relink_front_or_before(&mut self, e: EntryId, h: HeadId, order: Option<EntryId>) {
        match order.filter(|&o| self.entry_in_head(o, h)) {
            Some(before) => link_before(&mut self.heads, &mut self.entries, e, h, before),
            None => link_front(&mut self.heads, &mut self.entries, e, h),
        }
    }

    fn relink_back_or_after(&mut self, e: EntryId, h: HeadId, order: Option<EntryId>) {
        match order.filter(|&o| self.entry_in_head(o, h)) {
            Some(after) => link_after(&mut self.heads, &mut self.entries, e, h, after),
            None => link_back(&mut self.heads, &mut self.entries, e, h),
        }
    }

    fn entry_in_head(&self, e: EntryId, h: HeadId) -> bool {
        self.entries
            .get(e.index(), e.generation())
            .map_or(false, |entry| entry.head == h)
    }

    fn replace_record(&mut self, entry_id: EntryId, canonical: &Rc<R>) -> Option<Rc<R>> {
        let entry = self
            .entries
            .get_mut(entry_id.index(), entry_id.generation())
            .expect("internal: dangling entry id");
        if Rc::ptr_eq(&entry.record, canonical) {
            None
        } else {
            self.intern.acquire(canonical);
            let old = std::mem::replace(&mut entry.record, Rc::clone(canonical));
            self.intern.release_entry(&old);
            Some(old)
        }
    }

    fn mark_head_dirty(&self, head_id: HeadId, dirty: bool) {
        let mut cur = self
            .heads
            .get(head_id.index(), head_id.generation())
            .and_then(|h| h.first);
        while let Some(e) = cur {
            let entry = self.entry_ref(e);
            entry.dirty.set(dirty);
            cur = entry.next;
        }
    }

    fn destroy_head_members(&mut self, head_id: HeadId) -> usize {
        let mut removed = 0;
        let mut cur = self
            .heads
            .get(head_id.index(), head_id.generation())
            .and_then(|h| h.first);
        while let Some(e) = cur {
            let next = self.entry_ref(e).next;
            self.remove_entry(e).expect("internal: entry was just live");
            removed += 1;
            cur = next;
        }
        removed
    }

    fn free_empty_head(&mut self, head_id: HeadId) {
        let (idx_type, phash) = {
            let head = self
                .heads
                .get(head_id.index(), head_id.generation())
                .expect("internal: dangling head id");
            (head.idx_type, head.partition_hash)
        };
        if let Some(slot) = self.idx_types.get_mut(idx_type.index(), idx_type.generation()) {
            if let Some(bucket) = slot.heads.get_mut(&phash) {
                bucket.retain(|h| *h != head_id);
                if bucket.is_empty() {
                    slot.heads.remove(&phash);
                }
            }
        }
        self.heads.remove(head_id.index(), head_id.generation());
    }
}

fn link_front<R>(heads: &mut Arena<Head>, entries: &mut Arena<Entry<R>>, e: EntryId, h: HeadId) {
    let old_first = {
        let head = heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id");
        let old_first = head.first;
        head.first = Some(e);
        if old_first.is_none() {
            head.last = Some(e);
        }
        head.len += 1;
        head.membership_version += 1;
        old_first
    };
    {
        let entry = entries.get_mut(e.index(), e.generation()).expect("internal: dangling entry id");
        entry.prev = None;
        entry.next = old_first;
    }
    if let Some(of) = old_first {
        entries.get_mut(of.index(), of.generation()).expect("internal: dangling entry id").prev = Some(e);
    }
}

fn link_back<R>(heads: &mut Arena<Head>, entries: &mut Arena<Entry<R>>, e: EntryId, h: HeadId) {
    let old_last = {
        let head = heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id");
        let old_last = head.last;
        head.last = Some(e);
        if old_last.is_none() {
            head.first = Some(e);
        }
        head.len += 1;
        head.membership_version += 1;
        old_last
    };
    {
        let entry = entries.get_mut(e.index(), e.generation()).expect("internal: dangling entry id");
        entry.next = None;
        entry.prev = old_last;
    }
    if let Some(ol) = old_last {
        entries.get_mut(ol.index(), ol.generation()).expect("internal: dangling entry id").next = Some(e);
    }
}

fn link_before<R>(
    heads: &mut Arena<Head>,
    entries: &mut Arena<Entry<R>>,
    e: EntryId,
    h: HeadId,
    before: EntryId,
) {
    let prev = entries
        .get(before.index(), before.generation())
        .expect("internal: dangling entry id")
        .prev;
    match prev {
        Some(p) => {
            entries.get_mut(p.index(), p.generation()).expect("internal: dangling entry id").next = Some(e);
        }
        None => {
            heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id").first = Some(e);
        }
    }
    entries.get_mut(before.index(), before.generation()).expect("internal: dangling entry id").prev = Some(e);
    {
        let entry = entries.get_mut(e.index(), e.generation()).expect("internal: dangling entry id");
        entry.prev = prev;
        entry.next = Some(before);
    }
    let head = heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id");
    head.len += 1;
    head.membership_version += 1;
}

fn link_after<R>(
    heads: &mut Arena<Head>,
    entries: &mut Arena<Entry<R>>,
    e: EntryId,
    h: HeadId,
    after: EntryId,
) {
    let next = entries
        .get(after.index(), after.generation())
        .expect("internal: dangling entry id")
        .next;
    match next {
        Some(n) => {
            entries.get_mut(n.index(), n.generation()).expect("internal: dangling entry id").prev = Some(e);
        }
        None => {
            heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id").last = Some(e);
        }
    }
    entries.get_mut(after.index(), after.generation()).expect("internal: dangling entry id").next = Some(e);
    {
        let entry = entries.get_mut(e.index(), e.generation()).expect("internal: dangling entry id");
        entry.next = next;
        entry.prev = Some(after);
    }
    let head = heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id");
    head.len += 1;
    head.membership_version += 1;
}

fn unlink<R>(heads: &mut Arena<Head>, entries: &mut Arena<Entry<R>>, e: EntryId, h: HeadId) {
    let (prev, next) = {
        let entry = entries.get(e.index(), e.generation()).expect("internal: dangling entry id");
        (entry.prev, entry.next)
    };
    match prev {
        Some(p) => {
            entries.get_mut(p.index(), p.generation()).expect("internal: dangling entry id").next = next;
        }
        None => {
            heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id").first = next;
        }
    }
    match next {
        Some(n) => {
            entries.get_mut(n.index(), n.generation()).expect("internal: dangling entry id").prev = prev;
        }
        None => {
            heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id").last = prev;
        }
    }
    let head = heads.get_mut(h.index(), h.generation()).expect("internal: dangling head id");
    head.len -= 1;
    head.membership_version += 1;
}

/// Iterates a head's member entries with look-ahead-one semantics: the
/// successor is computed before yielding the current entry, so the
/// caller may remove the just-yielded entry mid-iteration without
/// invalidating the walk. Removing any *other* entry of the same head
/// while iterating is not supported.
///
/// Unlike [std::iter::Iterator], each step takes the [MultiIndex]
/// explicitly rather than borrowing it for the iterator's lifetime --
/// that is what lets the caller interleave [HeadIter::next] with
/// mutating calls such as [MultiIndex::remove_entry] on the very index
/// being walked.
#[derive(Clone, Copy)]
pub struct HeadIter {
    head: HeadId,
    current: Option<EntryId>,
    next: Option<EntryId>,
}

impl HeadIter {
    /// Start iterating `head`'s members, oldest-inserted (per current
    /// order) first.
    pub fn init<R>(mi: &MultiIndex<R>, head: HeadId) -> HeadIter {
        let next = mi.heads.get(head.index(), head.generation()).and_then(|h| h.first);
        HeadIter { head, current: None, next }
    }

    /// Advance and return the next member, or `None` at the end of the
    /// head.
    pub fn next<R>(&mut self, mi: &MultiIndex<R>) -> Option<EntryId> {
        let cur = self.next?;
        self.current = Some(cur);
        self.next = mi.entries.get(cur.index(), cur.generation()).and_then(|e| e.next);
        Some(cur)
    }

    /// The entry most recently returned by [HeadIter::next], if any.
    pub fn current(&self) -> Option<EntryId> {
        self.current
    }

    /// Restart iteration against the same head. Invalid once the head
    /// itself has been destroyed by removing its last member -- in that
    /// case re-derive a fresh head via [MultiIndex::lookup_head] instead.
    pub fn rewind<R>(&mut self, mi: &MultiIndex<R>) {
        *self = HeadIter::init(mi, self.head);
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
