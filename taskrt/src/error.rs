//! Error and result-status types.
//!
//! The runtime distinguishes two vocabularies, matching how a caller is
//! expected to react: [`VfsStatus`] and [`crate::awaiter::AwaiterResult`]
//! are plain outcome enums a caller branches on, not `std::error::Error`
//! impls. [`RuntimeError`] covers the one class of condition this crate
//! treats as a programmer error in the embedding rather than an
//! expected-and-recoverable outcome.

/// Outcome of a virtual filesystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum VfsStatus {
    /// Operation succeeded.
    Ok,
    /// Operation's boolean question resolved to false (e.g. `exists`).
    False,
    /// Expected a directory, found something else.
    NotDirectory,
    /// Expected a file, found something else.
    NotFile,
    /// Directory was not empty.
    NotEmpty,
    /// Target (or an ancestor, or the owning mount) is read-only.
    ReadOnly,
    /// Target already exists.
    Exists,
    /// An ancestor of the target does not exist.
    ParentDoesNotExist,
    /// Target does not exist.
    DoesNotExist,
    /// Target is a mount point and cannot be operated on directly.
    IsMounted,
    /// Backend-specific failure with no closer-fitting variant.
    Unknown,
}

impl VfsStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, VfsStatus::Ok)
    }
}

/// Errors surfaced by [`crate::Runtime`] itself rather than by a VFS or
/// awaiter outcome.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// A named queue was referenced that was never created with
    /// [`crate::Runtime::queue_create`] (and is not `MAIN`).
    #[error("no such queue: {name}")]
    NoSuchQueue { name: String },

    /// A queue create was attempted for a name that already exists.
    #[error("queue already exists: {name}")]
    QueueExists { name: String },
}
