//! Index-type descriptor (C2): identity and optional partitioning
//! capability for one use-site of indexing within a
//! [MultiIndex](crate::index::MultiIndex).

/// Capability vtable determining *identity* (which record replaces
/// which) and, optionally, *partitioning* (which bucket a record belongs
/// to) for one index-type.
///
/// Identity equality must refine partition equality: `id_equal(a, b) =>
/// partition_equal(a, b)`. [crate::index::MultiIndex::add] checks this
/// with a `debug_assert!` -- violating it is a programming error in the
/// descriptor, not a recoverable runtime condition.
pub trait IdxTypeDescriptor<R> {
    /// Hash used to locate the member-entry slot for `obj` within a
    /// partition, keyed by identity.
    fn id_hash(&self, obj: &R) -> u64;

    /// Identity equality: id-equal records cannot coexist in the same
    /// (instance, partition) -- adding one displaces the other.
    fn id_equal(&self, a: &R, b: &R) -> bool;

    /// The partitioning capability, if this index-type partitions its
    /// members. `None` means every record added under this index-type
    /// shares a single implicit head.
    fn partition(&self) -> Option<&dyn Partitioner<R>> {
        None
    }
}

/// Partitioning capability: bucketing of records within an index-type by
/// an equivalence coarser than identity equality.
pub trait Partitioner<R> {
    /// Whether `obj` may be tracked under this index-type at all.
    /// Records for which this returns `false` are rejected by `add`.
    fn partitionable(&self, obj: &R) -> bool;

    /// Hash of the partition `obj` belongs to.
    fn partition_hash(&self, obj: &R) -> u64;

    /// Whether `a` and `b` belong to the same partition.
    fn partition_equal(&self, a: &R, b: &R) -> bool;
}

#[cfg(test)]
#[path = "idx_type_test.rs"]
mod idx_type_test;
