//! A deduplicating, multi-index container for immutable,
//! reference-counted value objects.
//!
//! The container does two things at once:
//!
//! 1. Interns objects by full structural equality, so structurally
//!    identical objects share one heap allocation ([intern]).
//! 2. Indexes those objects under one or more caller-defined index
//!    types, each of which may additionally partition its members into
//!    ordered sub-lists keyed by a caller-defined partition hash
//!    ([index], [idx_type]).
//!
//! Single-threaded by design (see [index::MultiIndex]): there is no
//! internal locking, and descriptor callbacks must not re-enter the
//! multi-index that invoked them. No record schema, wire format, or
//! on-disk layout is specified here -- plug in any record type via
//! [obj::ObjDescriptor] and [idx_type::IdxTypeDescriptor].

pub mod arena;
pub mod error;
pub mod hash;
pub mod idx_type;
pub mod index;
mod intern;
pub mod obj;

pub use crate::arena::{EntryId, HeadId, IdxTypeId};
pub use crate::error::{Error, Result};
pub use crate::idx_type::{IdxTypeDescriptor, Partitioner};
pub use crate::index::{AddHints, HeadIter, Lookup, Mode, MultiIndex};
#[cfg(feature = "debug")]
pub use crate::index::DebugStats;
pub use crate::obj::{DefaultObjDescriptor, ObjDescriptor};
