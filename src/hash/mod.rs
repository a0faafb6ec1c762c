//! City-hash based [BuildHasher], a fast deterministic alternative to
//! [std::collections::hash_map::RandomState] for descriptors that hash a
//! byte-oriented key in a single [Hasher::write] call.

use std::hash::{BuildHasher, Hasher};

/// Wraps `cityhash-rs`'s 128-bit CityHash as a [Hasher].
///
/// Accumulates state from a single call to [Hasher::write] -- meant for
/// descriptors that hash one contiguous byte buffer per key, not
/// composite keys hashed through several `write_*` calls (use
/// [std::collections::hash_map::DefaultHasher] for those, as
/// [crate::obj::DefaultObjDescriptor] does).
#[derive(Clone, Copy, Default)]
pub struct CityHasher {
    digest: u128,
}

impl CityHasher {
    pub fn new() -> CityHasher {
        CityHasher::default()
    }
}

impl BuildHasher for CityHasher {
    type Hasher = Self;

    #[inline]
    fn build_hasher(&self) -> Self {
        self.clone()
    }
}

impl Hasher for CityHasher {
    fn finish(&self) -> u64 {
        ((self.digest >> 64) as u64) ^ ((self.digest & 0xFFFF_FFFF_FFFF_FFFF) as u64)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.digest = cityhash_rs::cityhash_110_128(bytes);
    }
}
