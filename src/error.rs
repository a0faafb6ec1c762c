//! Error types.
//!
//! Per the error-handling design: contract violations are
//! `debug_assert!`-checked and panic in debug builds, expected negative
//! outcomes are returned as [crate::index::Lookup], `bool`, or `Ok(0)`
//! and never reach here. This enum carries the remaining tier: a caller
//! handed back a handle or descriptor result the multi-index can still
//! reject cheaply in a release build.

use std::fmt;

/// Errors returned by [crate::index::MultiIndex] operations.
#[derive(Debug)]
pub enum Error {
    /// A record was rejected by the index-type's `partitionable`
    /// predicate.
    NotPartitionable { at: &'static str, detail: String },
    /// An [EntryId](crate::arena::EntryId) / [HeadId](crate::arena::HeadId)
    /// / [IdxTypeId](crate::arena::IdxTypeId) no longer refers to a live
    /// slot -- it was removed, or never belonged to this index.
    StaleHandle { at: &'static str, detail: String },
    /// [crate::index::MultiIndex::close_idx_type] was called on an
    /// instance that still owns live heads.
    InstanceNotEmpty { at: &'static str, detail: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotPartitionable { at, detail } => {
                write!(f, "not-partitionable at {}: {}", at, detail)
            }
            Error::StaleHandle { at, detail } => {
                write!(f, "stale-handle at {}: {}", at, detail)
            }
            Error::InstanceNotEmpty { at, detail } => {
                write!(f, "instance-not-empty at {}: {}", at, detail)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Construct an [Error] tagged with its call-site.
///
/// Two shapes, matching every call site in this crate:
///
/// ```ignore
/// err_at!(StaleHandle, msg: "entry {:?} is gone", id)
/// err_at!(StaleHandle, some_fallible_call())
/// ```
#[macro_export]
macro_rules! err_at {
    ($variant:ident, msg: $($arg:expr),+ $(,)?) => {{
        let detail = format!($($arg),+);
        let at = concat!(file!(), ":", line!());
        Err($crate::error::Error::$variant { at, detail })
    }};
    ($variant:ident, $e:expr) => {
        match $e {
            Ok(value) => Ok(value),
            Err(err) => {
                let at = concat!(file!(), ":", line!());
                Err($crate::error::Error::$variant {
                    at,
                    detail: err.to_string(),
                })
            }
        }
    };
}
