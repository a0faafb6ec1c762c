//! Object descriptor (C1): per-record-type capability vtable telling the
//! interning table how to hash, compare, and optionally deep-copy values
//! of type `R`.

use std::hash::Hash;

/// Capability vtable for a record type `R` interned by a
/// [MultiIndex](crate::index::MultiIndex).
///
/// Implementations must uphold `full_equal(a, b) => full_hash(a) ==
/// full_hash(b)`, and `full_equal` must be a true equivalence relation
/// (reflexive, symmetric, transitive). Both properties are exactly what
/// canonicalization depends on.
pub trait ObjDescriptor<R> {
    /// Structural hash used to find `obj`'s equivalence class in the
    /// interning table. Must be stable for the life of the process but
    /// need not be stable across runs.
    fn full_hash(&self, obj: &R) -> u64;

    /// Full structural equality -- every field, not just identity
    /// fields.
    fn full_equal(&self, a: &R, b: &R) -> bool;

    /// True if `obj` is a shallow candidate borrowing transient storage
    /// that must be deep-copied before the table retains it. Records
    /// that are already self-contained should leave this `false`.
    fn needs_clone(&self, obj: &R) -> bool {
        let _ = obj;
        false
    }

    /// Produce a self-contained copy of `obj`, used only when
    /// [needs_clone](Self::needs_clone) returns `true`.
    fn clone_obj(&self, obj: &R) -> R;

    /// Called once, when the canonical copy of an equivalence class is
    /// evicted from the table -- its last member entry was removed and
    /// its last external hold (if any) was released. `R`'s own `Drop`
    /// already reclaims memory; this hook exists for descriptors that
    /// need a side-effecting teardown notification.
    fn destroy(&self, obj: &R) {
        let _ = obj;
    }
}

/// Descriptor for record types that are already [Eq] + [Hash] + [Clone]
/// and never need deep-copying -- the common case.
pub struct DefaultObjDescriptor;

impl<R> ObjDescriptor<R> for DefaultObjDescriptor
where
    R: Eq + Hash + Clone,
{
    fn full_hash(&self, obj: &R) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::Hasher;

        let mut hasher = DefaultHasher::new();
        obj.hash(&mut hasher);
        hasher.finish()
    }

    fn full_equal(&self, a: &R, b: &R) -> bool {
        a == b
    }

    fn clone_obj(&self, obj: &R) -> R {
        obj.clone()
    }
}

#[cfg(test)]
#[path = "obj_test.rs"]
mod obj_test;
