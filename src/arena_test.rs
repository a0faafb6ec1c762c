use super::*;

#[test]
fn test_insert_get() {
    let mut arena: Arena<&'static str> = Arena::new();
    let (i, g) = arena.insert("a");
    assert_eq!(arena.get(i, g), Some(&"a"));
}

#[test]
fn test_remove_then_stale_get_fails() {
    let mut arena: Arena<&'static str> = Arena::new();
    let (i, g) = arena.insert("a");
    assert_eq!(arena.remove(i, g), Some("a"));
    assert_eq!(arena.get(i, g), None);
}

#[test]
fn test_reused_slot_bumps_generation() {
    let mut arena: Arena<&'static str> = Arena::new();
    let (i1, g1) = arena.insert("a");
    arena.remove(i1, g1);
    let (i2, g2) = arena.insert("b");
    assert_eq!(i1, i2, "freed slot should be reused");
    assert_ne!(g1, g2, "reused slot must carry a new generation");
    assert_eq!(arena.get(i1, g1), None, "stale handle must not resolve");
    assert_eq!(arena.get(i2, g2), Some(&"b"));
}

#[test]
fn test_get_mut_respects_generation() {
    let mut arena: Arena<i32> = Arena::new();
    let (i, g) = arena.insert(10);
    *arena.get_mut(i, g).unwrap() += 1;
    assert_eq!(arena.get(i, g), Some(&11));
    assert_eq!(arena.get_mut(i, g + 1), None);
}

#[test]
fn test_handle_equality() {
    let mut arena: Arena<()> = Arena::new();
    let (i, g) = arena.insert(());
    let a = EntryId::new(i, g);
    let b = EntryId::new(i, g);
    assert_eq!(a, b);
    assert_ne!(a, EntryId::new(i, g + 1));
}
