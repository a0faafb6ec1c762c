use std::cell::Cell;

use super::*;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct Rec {
    id: i64,
    payload: String,
}

/// A record type that may borrow transient storage: a `~`-prefixed
/// payload stands in for a shallow candidate that must be materialized
/// into an owned copy before the table retains it.
struct ShallowRec {
    id: i64,
    payload: String,
}

struct ShallowDescriptor;

impl ObjDescriptor<ShallowRec> for ShallowDescriptor {
    fn full_hash(&self, obj: &ShallowRec) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        obj.id.hash(&mut hasher);
        obj.payload.trim_start_matches('~').hash(&mut hasher);
        hasher.finish()
    }

    fn full_equal(&self, a: &ShallowRec, b: &ShallowRec) -> bool {
        a.id == b.id && a.payload.trim_start_matches('~') == b.payload.trim_start_matches('~')
    }

    fn needs_clone(&self, obj: &ShallowRec) -> bool {
        obj.payload.starts_with('~')
    }

    fn clone_obj(&self, obj: &ShallowRec) -> ShallowRec {
        ShallowRec {
            id: obj.id,
            payload: obj.payload.trim_start_matches('~').to_string(),
        }
    }
}

/// A descriptor whose `destroy` hook records its argument instead of
/// doing nothing, standing in for a caller that needs a teardown
/// notification on eviction.
struct TrackingDescriptor {
    last_destroyed: Cell<Option<i64>>,
}

impl ObjDescriptor<Rec> for TrackingDescriptor {
    fn full_hash(&self, obj: &Rec) -> u64 {
        DefaultObjDescriptor.full_hash(obj)
    }

    fn full_equal(&self, a: &Rec, b: &Rec) -> bool {
        DefaultObjDescriptor.full_equal(a, b)
    }

    fn clone_obj(&self, obj: &Rec) -> Rec {
        obj.clone()
    }

    fn destroy(&self, obj: &Rec) {
        self.last_destroyed.set(Some(obj.id));
    }
}

#[test]
fn test_full_equal_matches_structural_eq() {
    let d = DefaultObjDescriptor;
    let a = Rec { id: 1, payload: "x".into() };
    let b = Rec { id: 1, payload: "x".into() };
    let c = Rec { id: 1, payload: "y".into() };
    assert!(d.full_equal(&a, &b));
    assert!(!d.full_equal(&a, &c));
}

#[test]
fn test_full_hash_agrees_with_full_equal() {
    let d = DefaultObjDescriptor;
    let a = Rec { id: 1, payload: "x".into() };
    let b = Rec { id: 1, payload: "x".into() };
    assert!(d.full_equal(&a, &b));
    assert_eq!(d.full_hash(&a), d.full_hash(&b));
}

#[test]
fn test_default_needs_clone_is_false() {
    let d = DefaultObjDescriptor;
    let a = Rec { id: 1, payload: "x".into() };
    assert!(!d.needs_clone(&a));
    assert_eq!(d.clone_obj(&a), a);
}

#[test]
fn test_needs_clone_true_triggers_materializing_copy() {
    let d = ShallowDescriptor;
    let shallow = ShallowRec { id: 1, payload: "~borrowed".into() };
    assert!(d.needs_clone(&shallow));
    let owned = d.clone_obj(&shallow);
    assert_eq!(owned.payload, "borrowed");
    assert!(!d.needs_clone(&owned));
}

#[test]
fn test_shallow_and_materialized_candidates_still_compare_equal() {
    let d = ShallowDescriptor;
    let shallow = ShallowRec { id: 1, payload: "~borrowed".into() };
    let owned = ShallowRec { id: 1, payload: "borrowed".into() };
    assert!(d.full_equal(&shallow, &owned));
    assert_eq!(d.full_hash(&shallow), d.full_hash(&owned));
}

#[test]
fn test_destroy_hook_fires_with_the_evicted_record() {
    let d = TrackingDescriptor { last_destroyed: Cell::new(None) };
    let a = Rec { id: 7, payload: "x".into() };
    assert_eq!(d.last_destroyed.get(), None);
    d.destroy(&a);
    assert_eq!(d.last_destroyed.get(), Some(7));
}
