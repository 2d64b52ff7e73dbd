//! Recoverable error taxonomy.
//!
//! Only lookup-style failures are surfaced as errors; invariant violations
//! (duplicate registrations, unbound link releases, non-positive ticks)
//! abort the run via panics, since they indicate engine or caller bugs.

use thiserror::Error;

/// Errors reported to callers of the catalog and topology APIs.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("file `{0}` is not registered")]
    FileNotFound(String),
    #[error("site `{0}` is not registered")]
    SiteNotFound(String),
    #[error("storage element `{0}` is not registered")]
    ElementNotFound(String),
    #[error("no link selector from site `{src}` to site `{dst}`")]
    SelectorNotFound { src: String, dst: String },
    #[error("element `{element}` holds no replica of file `{file}`")]
    SourceReplicaMissing { element: String, file: String },
}
