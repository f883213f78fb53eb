//! Error types
//!
//! Three failure classes flow through a harvest pass:
//! - [`ExtractionFailure`]: a row does not have the shape the schema expects.
//!   Recovered by skipping the row.
//! - [`EnrichmentError`]: the linked page could not be opened or read.
//!   Recovered by defaulting the derived value to zero.
//! - [`SessionError`]: the session itself is unusable. Fatal for the pass.

use std::path::PathBuf;

/// Faults raised by a [`Session`](crate::session::Session) implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Element handle is stale (its page was navigated away or closed)")]
    StaleElement,

    #[error("Element belongs to a context that is not the active one")]
    ContextMismatch,

    #[error("No such browsing context: {0}")]
    NoSuchContext(String),

    #[error("No active browsing context")]
    NoActiveContext,

    #[error("Element has no link to follow")]
    NoLink,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Why a single row could not be turned into a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("field `{field}`: no element at index {index} ({found} matched {locator})")]
    MissingElement {
        field: String,
        locator: String,
        index: isize,
        found: usize,
    },

    #[error("field `{field}`: element has no `{attribute}` attribute")]
    MissingAttribute { field: String, attribute: String },

    #[error("field `{field}`: value is empty")]
    EmptyValue { field: String },

    #[error("row has {found} cells but the header has {expected}")]
    CellCountMismatch { expected: usize, found: usize },

    #[error("row precedes the header row")]
    AboveHeader,
}

/// Why a derived value could not be computed for a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentError {
    #[error("record has no link in `{0}`")]
    MissingLink(String),

    #[error("no link element at index {index} ({found} matched)")]
    MissingTarget { index: isize, found: usize },

    #[error("no text matched the count pattern")]
    NoMatch,

    #[error(transparent)]
    Target(#[from] SessionError),
}

/// Problems with a job file or schema
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Schema has no fields")]
    EmptySchema,

    #[error("Field name `{0}` is used more than once")]
    DuplicateField(String),

    #[error("Field name must not be empty")]
    EmptyFieldName,

    #[error("Invalid locator for `{field}`: {reason}")]
    InvalidLocator { field: String, reason: String },

    #[error("Enrichment field `{0}` clashes with an extracted column")]
    EnrichmentClash(String),

    #[error("Enrichment link field `{0}` is not produced by the schema")]
    UnknownLinkField(String),

    #[error("Invalid count pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Failures while writing a table
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error for running a job end to end
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Section not found: {0}")]
    SectionNotFound(String),
}
