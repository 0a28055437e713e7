// Error taxonomy for case orchestration.
//
// `PlatformError` covers the primitive boundary; `CaseError` is the
// closed set of orchestration failures callers are expected to branch
// on. A missing page is not automatically an error: fetches report it
// as empty text and callers decide.

use thiserror::Error;

/// Failure of a primitive platform call.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The live revision no longer matches the caller's base revision.
    #[error("edit conflict on {title}")]
    EditConflict { title: String },

    /// The platform could not be reached or the request did not complete.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The platform answered with something the client cannot interpret,
    /// or refused the request outright.
    #[error("protocol failure: {0}")]
    Protocol(String),
}

/// Orchestration failure surfaced to the embedding layer.
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("page {0} does not exist")]
    PageNotFound(String),

    /// A guarded write lost the race; the caller's view is stale.
    #[error("edit conflict on {title} (base revision {base})")]
    EditConflict { title: String, base: u64 },

    #[error("malformed markup on {title}: {detail}")]
    MalformedMarkup { title: String, detail: String },

    /// The requested action is not offered at the current status for the
    /// operator's roles. Raised at planning time, before any write.
    #[error("action {action} is not offered at status {status:?} for these roles")]
    PermissionMismatch { action: String, status: String },

    /// Both sides of a merge already have archives; merging them is a
    /// manual operation.
    #[error("both {source_archive} and {destination_archive} carry archives; merge them manually")]
    AmbiguousMerge { source_archive: String, destination_archive: String },

    /// A page's revision failed to advance after a bounded wait.
    #[error("page {title} did not advance after {attempts} attempts")]
    StalledWrite { title: String, attempts: u32 },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}
